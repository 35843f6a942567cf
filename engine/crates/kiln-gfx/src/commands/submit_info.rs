use ash::vk;
use itertools::Itertools;

use crate::commands::{command_buffer::GfxCommandBuffer, semaphore::GfxSemaphore};

/// 对 `vk::SubmitInfo` 的封装，持有所有数组，避免悬垂指针
#[derive(Default)]
pub struct GfxSubmitInfo {
    command_buffers: Vec<vk::CommandBuffer>,
    wait_semaphores: Vec<vk::Semaphore>,
    wait_stages: Vec<vk::PipelineStageFlags>,
    signal_semaphores: Vec<vk::Semaphore>,
}

impl GfxSubmitInfo {
    pub fn new(commands: &[&GfxCommandBuffer]) -> Self {
        Self {
            command_buffers: commands.iter().map(|cmd| cmd.vk_handle()).collect_vec(),
            ..Default::default()
        }
    }

    #[inline]
    pub fn submit_info(&self) -> vk::SubmitInfo<'_> {
        vk::SubmitInfo::default()
            .command_buffers(&self.command_buffers)
            .wait_semaphores(&self.wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .signal_semaphores(&self.signal_semaphores)
    }

    #[inline]
    pub fn wait(mut self, semaphore: &GfxSemaphore, stage: vk::PipelineStageFlags) -> Self {
        self.wait_semaphores.push(semaphore.handle());
        self.wait_stages.push(stage);
        self
    }

    #[inline]
    pub fn signal(mut self, semaphore: &GfxSemaphore) -> Self {
        self.signal_semaphores.push(semaphore.handle());
        self
    }

    #[inline]
    pub fn command_count(&self) -> usize {
        self.command_buffers.len()
    }
}
