pub mod frame_resources;
pub mod retirement;
pub mod swapchain_image_resources;
