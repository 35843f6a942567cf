use ash::vk;

use crate::error::{GfxResult, VkResultExt};
use crate::foundation::debug_messenger::DebugType;

/// 窗口的 presentation surface
///
/// Drop 时销毁，必须先于 instance
pub struct GfxSurface {
    pub(crate) handle: vk::SurfaceKHR,
    pub(crate) pf: ash::khr::surface::Instance,
}

impl GfxSurface {
    /// 接管由平台层创建的 surface
    pub fn from_handle(entry: &ash::Entry, instance: &ash::Instance, handle: vk::SurfaceKHR) -> Self {
        let pf = ash::khr::surface::Instance::new(entry, instance);
        Self { handle, pf }
    }

    /// 通过窗口句柄创建 surface，供平台层使用
    pub fn create_raw(
        entry: &ash::Entry,
        instance: &ash::Instance,
        raw_display_handle: raw_window_handle::RawDisplayHandle,
        raw_window_handle: raw_window_handle::RawWindowHandle,
    ) -> GfxResult<vk::SurfaceKHR> {
        unsafe {
            ash_window::create_surface(entry, instance, raw_display_handle, raw_window_handle, None)
                .vk_context("vkCreateSurfaceKHR")
        }
    }

    /// 创建 surface 所需的 instance extensions
    pub fn required_extensions(
        raw_display_handle: raw_window_handle::RawDisplayHandle,
    ) -> GfxResult<&'static [*const std::ffi::c_char]> {
        ash_window::enumerate_required_extensions(raw_display_handle)
            .vk_context("vkEnumerateInstanceExtensionProperties")
    }
}

// getters
impl GfxSurface {
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    #[inline]
    pub fn pf(&self) -> &ash::khr::surface::Instance {
        &self.pf
    }

    pub fn get_capabilities(&self, pdevice: vk::PhysicalDevice) -> GfxResult<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.pf
                .get_physical_device_surface_capabilities(pdevice, self.handle)
                .vk_context("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")
        }
    }

    pub fn query_support(&self, pdevice: vk::PhysicalDevice) -> GfxResult<SwapchainSupportDetails> {
        let capabilities = self.get_capabilities(pdevice)?;
        let formats = unsafe {
            self.pf
                .get_physical_device_surface_formats(pdevice, self.handle)
                .vk_context("vkGetPhysicalDeviceSurfaceFormatsKHR")?
        };
        let present_modes = unsafe {
            self.pf
                .get_physical_device_surface_present_modes(pdevice, self.handle)
                .vk_context("vkGetPhysicalDeviceSurfacePresentModesKHR")?
        };

        Ok(SwapchainSupportDetails {
            capabilities,
            formats,
            present_modes,
        })
    }
}

impl Drop for GfxSurface {
    fn drop(&mut self) {
        log::info!("destroying surface");
        unsafe { self.pf.destroy_surface(self.handle, None) }
    }
}

impl DebugType for GfxSurface {
    fn debug_type_name() -> &'static str {
        "GfxSurface"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

/// surface 在某个物理设备上的能力
#[derive(Clone, Debug, Default)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    pub fn log(&self) {
        let caps = &self.capabilities;
        log::info!(
            "surface capabilities: images [{}, {}], current extent {}x{}, min extent {}x{}, max extent {}x{}",
            caps.min_image_count,
            caps.max_image_count,
            caps.current_extent.width,
            caps.current_extent.height,
            caps.min_image_extent.width,
            caps.min_image_extent.height,
            caps.max_image_extent.width,
            caps.max_image_extent.height,
        );
        log::info!("surface formats: {:?}", self.formats);
        log::info!("surface present modes: {:?}", self.present_modes);
    }
}
