use std::rc::Rc;

use ash::vk;
use itertools::Itertools;

use crate::commands::fence::GfxFence;
use crate::commands::submit_info::GfxSubmitInfo;
use crate::error::{GfxResult, VkResultExt};
use crate::foundation::device::GfxDevice;

#[derive(Clone)]
pub struct GfxCommandQueue {
    handle: vk::Queue,
    queue_family_index: u32,
    device: Rc<GfxDevice>,
}

// new & init
impl GfxCommandQueue {
    pub fn new(device: Rc<GfxDevice>, queue_family_index: u32, debug_name: &str) -> Self {
        let handle = unsafe { device.get_device_queue(queue_family_index, 0) };
        device.set_object_debug_name(handle, format!("GfxQueue::{debug_name}"));
        Self {
            handle,
            queue_family_index,
            device,
        }
    }
}

// getters
impl GfxCommandQueue {
    #[inline]
    pub fn handle(&self) -> vk::Queue {
        self.handle
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }
}

// tools
impl GfxCommandQueue {
    pub fn submit(&self, batches: &[GfxSubmitInfo], fence: Option<&GfxFence>) -> GfxResult<()> {
        let _span = tracy_client::span!("GfxCommandQueue::submit");
        let infos = batches.iter().map(|batch| batch.submit_info()).collect_vec();
        unsafe {
            self.device
                .queue_submit(self.handle, &infos, fence.map_or(vk::Fence::null(), |f| f.handle()))
                .vk_context("vkQueueSubmit")
        }
    }

    #[inline]
    pub fn wait_idle(&self) -> GfxResult<()> {
        unsafe { self.device.queue_wait_idle(self.handle).vk_context("vkQueueWaitIdle") }
    }
}
