use std::ops::Deref;

use crate::error::{GfxResult, VkResultExt};
use crate::foundation::instance::GfxInstance;
use crate::foundation::physical_device::GfxPhysicalDevice;

/// vk-mem 的 allocator
///
/// 必须在 [`GfxDevice`](crate::foundation::device::GfxDevice) 销毁之前 drop
pub struct GfxMemAllocator {
    inner: vk_mem::Allocator,
}

impl GfxMemAllocator {
    pub fn new(instance: &GfxInstance, device: &ash::Device, pdevice: &GfxPhysicalDevice) -> GfxResult<Self> {
        let create_info = vk_mem::AllocatorCreateInfo::new(instance.ash_instance(), device, pdevice.vk_handle());
        let inner = unsafe { vk_mem::Allocator::new(create_info).vk_context("vmaCreateAllocator")? };
        Ok(Self { inner })
    }
}

impl Deref for GfxMemAllocator {
    type Target = vk_mem::Allocator;
    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl Drop for GfxMemAllocator {
    fn drop(&mut self) {
        log::info!("destroying memory allocator");
    }
}
