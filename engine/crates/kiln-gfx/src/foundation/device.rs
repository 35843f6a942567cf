use std::cell::Cell;
use std::ffi::{CStr, CString};
use std::ops::Deref;

use ash::vk;
use itertools::Itertools;

use crate::error::{GfxResult, VkResultExt};
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::physical_device::GfxPhysicalDevice;

/// Vulkan 逻辑设备封装
///
/// 包含核心设备 API 以及交换链、调试工具扩展的函数指针。
/// 所有持有 GPU 对象的类型都通过 `Rc<GfxDevice>` 引用它，因此这些类型都是 `!Send`。
pub struct GfxDevice {
    /// 核心 Vulkan 设备 API
    pub(crate) device: ash::Device,
    /// 交换链扩展 API
    pub(crate) swapchain: ash::khr::swapchain::Device,
    /// 调试工具扩展 API，只有开启 validation 时存在
    pub(crate) debug_utils: Option<ash::ext::debug_utils::Device>,

    destroyed: Cell<bool>,
}

// 构造与销毁
impl GfxDevice {
    pub fn new(instance: &ash::Instance, pdevice: &GfxPhysicalDevice, debug_utils: bool) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxDevice::new");

        let device_exts = Self::basic_device_exts().iter().map(|e| e.as_ptr()).collect_vec();
        log::info!(
            "device exts: {}",
            Self::basic_device_exts().iter().map(|e| e.to_string_lossy()).join(", ")
        );

        // graphics 和 present 可能是同一个 family
        let queue_priorities = [1.0_f32];
        let queue_families = [pdevice.graphics_queue_family(), pdevice.present_queue_family()]
            .into_iter()
            .unique()
            .collect_vec();
        let queue_create_infos = queue_families
            .iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::default().queue_family_index(*family).queue_priorities(&queue_priorities)
            })
            .collect_vec();

        let basic_features = Self::physical_device_basic_features(pdevice);
        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&device_exts)
            .enabled_features(&basic_features);

        let device = unsafe {
            instance.create_device(pdevice.vk_handle(), &device_create_info, None).vk_context("vkCreateDevice")?
        };

        let swapchain = ash::khr::swapchain::Device::new(instance, &device);
        let debug_utils = debug_utils.then(|| ash::ext::debug_utils::Device::new(instance, &device));

        Ok(Self {
            device,
            swapchain,
            debug_utils,
            destroyed: Cell::new(false),
        })
    }

    pub fn destroy(&self) {
        log::info!("destroying device");
        self.destroyed.set(true);
        unsafe {
            self.device.destroy_device(None);
        }
    }
}

// 创建过程的辅助函数
impl GfxDevice {
    /// 只开启设备实际支持的 feature
    fn physical_device_basic_features(pdevice: &GfxPhysicalDevice) -> vk::PhysicalDeviceFeatures {
        vk::PhysicalDeviceFeatures::default()
            .sampler_anisotropy(pdevice.features.sampler_anisotropy == vk::TRUE)
            .depth_clamp(pdevice.features.depth_clamp == vk::TRUE)
            .depth_bias_clamp(pdevice.features.depth_bias_clamp == vk::TRUE)
    }

    fn basic_device_exts() -> Vec<&'static CStr> {
        vec![ash::khr::swapchain::NAME]
    }
}

// getters
impl GfxDevice {
    #[inline]
    pub fn vk_handle(&self) -> vk::Device {
        self.device.handle()
    }

    #[inline]
    pub fn swapchain(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain
    }
}

// tools
impl GfxDevice {
    pub fn set_object_debug_name<T: vk::Handle>(&self, handle: T, name: impl AsRef<str>) {
        let Some(debug_utils) = &self.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name.as_ref()) else {
            return;
        };
        let result = unsafe {
            debug_utils.set_debug_utils_object_name(
                &vk::DebugUtilsObjectNameInfoEXT::default().object_name(name.as_c_str()).object_handle(handle),
            )
        };
        if let Err(e) = result {
            log::warn!("failed to set debug name {:?}: {:?}", name, e);
        }
    }

    pub fn set_debug_name<T: DebugType>(&self, handle: &T, name: impl AsRef<str>) {
        self.set_object_debug_name(handle.vk_handle(), format!("{}::{}", T::debug_type_name(), name.as_ref()));
    }

    #[inline]
    pub fn wait_idle(&self) -> GfxResult<()> {
        unsafe { self.device.device_wait_idle().vk_context("vkDeviceWaitIdle") }
    }
}

impl Deref for GfxDevice {
    type Target = ash::Device;
    fn deref(&self) -> &Self::Target {
        &self.device
    }
}
impl Drop for GfxDevice {
    fn drop(&mut self) {
        debug_assert!(self.destroyed.get(), "GfxDevice must be destroyed before being dropped.");
    }
}
impl DebugType for GfxDevice {
    fn debug_type_name() -> &'static str {
        "GfxDevice"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.device.handle()
    }
}
