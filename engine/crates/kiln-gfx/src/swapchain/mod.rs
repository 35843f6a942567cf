pub mod render_swapchain;
pub mod selection;
pub mod surface;
