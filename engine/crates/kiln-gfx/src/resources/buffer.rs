use std::rc::Rc;

use ash::vk;
use vk_mem::Alloc;

use crate::error::VkResultExt;
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::GfxDevice;
use crate::foundation::mem_allocator::GfxMemAllocator;

/// 长期存在的 device local buffer，数据通过 staging 上传
pub struct GfxBuffer {
    handle: vk::Buffer,
    allocation: vk_mem::Allocation,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,

    allocator: Rc<GfxMemAllocator>,
}

impl DebugType for GfxBuffer {
    fn debug_type_name() -> &'static str {
        "GfxBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

// init & destroy
impl GfxBuffer {
    /// 自动附加 `TRANSFER_DST`，以便从 staging buffer 拷贝
    pub fn new(
        device: &GfxDevice,
        allocator: Rc<GfxMemAllocator>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        debug_name: &str,
    ) -> Self {
        let usage = usage | vk::BufferUsageFlags::TRANSFER_DST;
        let buffer_ci = vk::BufferCreateInfo::default().size(size.max(1)).usage(usage);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };
        let (handle, allocation) =
            unsafe { allocator.create_buffer(&buffer_ci, &alloc_ci).or_fatal("vmaCreateBuffer") };

        let buffer = Self {
            handle,
            allocation,
            size,
            usage,
            allocator,
        };
        device.set_debug_name(&buffer, debug_name);
        buffer
    }

    pub fn destroy(mut self) {
        unsafe {
            self.allocator.destroy_buffer(self.handle, &mut self.allocation);
        }
    }
}

// getters
impl GfxBuffer {
    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }
}
