use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::commands::command_buffer::GfxCommandBuffer;
use crate::error::{GfxResult, VkResultExt};
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::GfxDevice;

pub struct GfxCommandPool {
    handle: vk::CommandPool,
    queue_family_index: u32,
    device: Rc<GfxDevice>,
}

impl DebugType for GfxCommandPool {
    fn debug_type_name() -> &'static str {
        "GfxCommandPool"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

// 创建与销毁
impl GfxCommandPool {
    pub fn new(
        device: Rc<GfxDevice>,
        queue_family_index: u32,
        flags: vk::CommandPoolCreateFlags,
        debug_name: &str,
    ) -> Self {
        let create_info = vk::CommandPoolCreateInfo::default().queue_family_index(queue_family_index).flags(flags);
        let handle = unsafe { device.create_command_pool(&create_info, None).or_fatal("vkCreateCommandPool") };

        let pool = Self {
            handle,
            queue_family_index,
            device,
        };
        pool.device.set_debug_name(&pool, debug_name);
        pool
    }

    /// 由 pool 分配出去的 command buffer 会一并释放
    pub fn destroy(self) {
        unsafe {
            self.device.destroy_command_pool(self.handle, None);
        }
    }
}

// getters
impl GfxCommandPool {
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.handle
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }
}

// tools
impl GfxCommandPool {
    pub fn allocate_command_buffers(&self, count: u32, debug_name: &str) -> Vec<GfxCommandBuffer> {
        let info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.handle)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        let handles =
            unsafe { self.device.allocate_command_buffers(&info).or_fatal("vkAllocateCommandBuffers") };

        handles
            .into_iter()
            .enumerate()
            .map(|(idx, handle)| {
                let cmd = GfxCommandBuffer::from_handle(self.device.clone(), handle);
                self.device.set_debug_name(&cmd, format!("{debug_name}-{idx}"));
                cmd
            })
            .collect_vec()
    }

    /// 所有 command buffer 回到 initial 状态
    pub fn reset(&self) -> GfxResult<()> {
        unsafe {
            self.device
                .reset_command_pool(self.handle, vk::CommandPoolResetFlags::empty())
                .vk_context("vkResetCommandPool")
        }
    }

    pub fn free_command_buffers(&self, cmds: Vec<GfxCommandBuffer>) {
        let handles = cmds.iter().map(|cmd| cmd.vk_handle()).collect_vec();
        unsafe {
            self.device.free_command_buffers(self.handle, &handles);
        }
    }
}
