use std::ffi::c_char;
use std::rc::Rc;

use ash::vk;
use kiln_gfx::error::GfxResult;
use kiln_gfx::swapchain::surface::GfxSurface;
use kiln_render_interface::platform::PlatformAdapter;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::window::Window;

/// winit 窗口作为后端的平台层
pub struct WinitPlatform {
    window: Rc<Window>,
}

impl WinitPlatform {
    pub fn new(window: Rc<Window>) -> Self {
        Self { window }
    }
}

impl PlatformAdapter for WinitPlatform {
    fn required_instance_extensions(&self) -> GfxResult<Vec<*const c_char>> {
        let display = self.window.display_handle()?.as_raw();
        Ok(GfxSurface::required_extensions(display)?.to_vec())
    }

    fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> GfxResult<vk::SurfaceKHR> {
        let display = self.window.display_handle()?.as_raw();
        let window = self.window.window_handle()?.as_raw();
        GfxSurface::create_raw(entry, instance, display, window)
    }

    fn drawable_size(&self) -> vk::Extent2D {
        let size = self.window.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }
}
