pub mod buffer;
pub mod deferred;
pub mod framebuffer;
pub mod image;
pub mod image_view;
pub mod sampler;
