use std::rc::Rc;

use ash::vk;
use vk_mem::Alloc;

use crate::allocator::block_allocator::{BlockBufferAllocator, BlockMemoryProvider, BlockMemoryUsage};
use crate::error::{GfxResult, VkResultExt};
use crate::foundation::device::GfxDevice;
use crate::foundation::mem_allocator::GfxMemAllocator;

/// 基于 vk-mem 的 block 提供者
#[derive(Clone)]
pub struct VmaBlockProvider {
    allocator: Rc<GfxMemAllocator>,
    device: Rc<GfxDevice>,
    debug_name: String,
}

pub type GfxBlockAllocator = BlockBufferAllocator<VmaBlockProvider>;

impl VmaBlockProvider {
    pub fn new(allocator: Rc<GfxMemAllocator>, device: Rc<GfxDevice>, debug_name: impl Into<String>) -> Self {
        Self {
            allocator,
            device,
            debug_name: debug_name.into(),
        }
    }

    fn alloc_create_info(memory: BlockMemoryUsage) -> vk_mem::AllocationCreateInfo {
        match memory {
            BlockMemoryUsage::HostOnly => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferHost,
                flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
                ..Default::default()
            },
            BlockMemoryUsage::HostToDevice => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
                ..Default::default()
            },
        }
    }
}

impl BlockMemoryProvider for VmaBlockProvider {
    type Allocation = vk_mem::Allocation;

    fn create_block(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory: BlockMemoryUsage,
    ) -> GfxResult<(vk::Buffer, vk_mem::Allocation)> {
        let buffer_ci = vk::BufferCreateInfo::default().size(size).usage(usage);
        let (buffer, allocation) = unsafe {
            self.allocator
                .create_buffer(&buffer_ci, &Self::alloc_create_info(memory))
                .vk_context("vmaCreateBuffer")?
        };
        self.device.set_object_debug_name(buffer, format!("Block::{}", self.debug_name));
        Ok((buffer, allocation))
    }

    fn destroy_block(&self, buffer: vk::Buffer, allocation: &mut vk_mem::Allocation) {
        unsafe {
            self.allocator.destroy_buffer(buffer, allocation);
        }
    }

    fn map(&self, allocation: &mut vk_mem::Allocation) -> GfxResult<*mut u8> {
        unsafe { self.allocator.map_memory(allocation).vk_context("vmaMapMemory") }
    }

    fn unmap(&self, allocation: &mut vk_mem::Allocation) {
        unsafe {
            self.allocator.unmap_memory(allocation);
        }
    }

    fn flush(&self, allocation: &vk_mem::Allocation, offset: vk::DeviceSize, size: vk::DeviceSize) -> GfxResult<()> {
        self.allocator.flush_allocation(allocation, offset, size).vk_context("vmaFlushAllocation")
    }
}
