use std::collections::HashMap;
use std::rc::Rc;

use ash::vk;
use kiln_gfx::allocator::block_allocator::{BlockBufferAllocator, BlockMemoryUsage};
use kiln_gfx::allocator::vma_provider::{GfxBlockAllocator, VmaBlockProvider};
use kiln_gfx::commands::command_buffer::GfxCommandBuffer;
use kiln_gfx::commands::command_pool::GfxCommandPool;
use kiln_gfx::commands::fence::GfxFence;
use kiln_gfx::descriptors::descriptor_pools::DescriptorPoolAllocator;
use kiln_gfx::error::{GfxResult, VkResultExt};
use kiln_gfx::foundation::device::GfxDevice;
use kiln_gfx::foundation::mem_allocator::GfxMemAllocator;
use kiln_render_interface::pipeline_settings::FrameResourceSettings;

use crate::buffering::FrameSlot;
use crate::frame::retirement::{Retire, RetiredObject};

/// 动态 uniform 描述符集的缓存键：(set layout, buffer, range)
type UniformSetKey = (vk::DescriptorSetLayout, vk::Buffer, vk::DeviceSize);

/// 一次 CPU 录制、GPU 执行周期的临时状态
pub struct FrameResources {
    slot: usize,

    cmd_pool: GfxCommandPool,
    /// 在 render pass 中录制绘制命令
    pub cmd_draw: GfxCommandBuffer,
    /// 录制上传命令，提交时排在 cmd_draw 之前
    pub cmd_copy: GfxCommandBuffer,
    copy_recording: bool,

    descriptor_pools: DescriptorPoolAllocator<Rc<GfxDevice>>,
    uniform_sets: HashMap<UniformSetKey, vk::DescriptorSet>,

    pub staging: GfxBlockAllocator,
    pub streamed_vertex: GfxBlockAllocator,
    pub uniforms: GfxBlockAllocator,

    /// 本槽位上一次提交的 fence，创建时为 signaled
    previous_submission: GfxFence,

    retired: Vec<RetiredObject>,

    device: Rc<GfxDevice>,
}

// new & init
impl FrameResources {
    /// 创建完成后 cmd_copy 已经处于录制状态
    pub fn new(
        device: Rc<GfxDevice>,
        allocator: Rc<GfxMemAllocator>,
        graphics_queue_family: u32,
        slot: usize,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("FrameResources::new");

        let cmd_pool = GfxCommandPool::new(
            device.clone(),
            graphics_queue_family,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            &format!("frame-{slot}"),
        );
        let cmd_draw = cmd_pool.allocate_command_buffers(1, &format!("frame-{slot}-draw")).swap_remove(0);
        let cmd_copy = cmd_pool.allocate_command_buffers(1, &format!("frame-{slot}-copy")).swap_remove(0);

        let block_provider =
            |name: &str| VmaBlockProvider::new(allocator.clone(), device.clone(), format!("frame-{slot}-{name}"));
        let staging = BlockBufferAllocator::new(
            block_provider("staging"),
            FrameResourceSettings::STAGING_BLOCK_SIZE,
            vk::BufferUsageFlags::TRANSFER_SRC,
            BlockMemoryUsage::HostOnly,
            false,
            format!("staging-{slot}"),
        );
        let streamed_vertex = BlockBufferAllocator::new(
            block_provider("streamed-vertex"),
            FrameResourceSettings::STREAMED_VERTEX_BLOCK_SIZE,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            BlockMemoryUsage::HostToDevice,
            true,
            format!("streamed-vertex-{slot}"),
        );
        let uniforms = BlockBufferAllocator::new(
            block_provider("uniform"),
            FrameResourceSettings::UNIFORM_BLOCK_SIZE,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            BlockMemoryUsage::HostToDevice,
            true,
            format!("uniform-{slot}"),
        );

        let mut frame = Self {
            slot,
            cmd_pool,
            cmd_draw,
            cmd_copy,
            copy_recording: false,
            descriptor_pools: DescriptorPoolAllocator::new(
                device.clone(),
                FrameResourceSettings::DESCRIPTOR_POOL_MAX_SETS,
                FrameResourceSettings::DESCRIPTOR_POOL_MAX_DESCRIPTORS,
            ),
            uniform_sets: HashMap::new(),
            staging,
            streamed_vertex,
            uniforms,
            previous_submission: GfxFence::new(device.clone(), true, &format!("frame-{slot}-submission")),
            retired: Vec::new(),
            device,
        };
        frame.begin_copy()?;
        Ok(frame)
    }
}

// getters
impl FrameResources {
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    #[inline]
    pub fn previous_submission(&self) -> &GfxFence {
        &self.previous_submission
    }

    #[inline]
    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }
}

// 命令录制
impl FrameResources {
    pub fn begin_copy(&mut self) -> GfxResult<()> {
        debug_assert!(!self.copy_recording, "copy command buffer is already recording");
        self.cmd_copy.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        self.copy_recording = true;
        Ok(())
    }

    /// 在 cmd_copy 末尾插入 transfer write -> index/vertex/uniform read 的屏障，然后结束录制
    pub fn end_copy(&mut self) -> GfxResult<()> {
        debug_assert!(self.copy_recording, "copy command buffer is not recording");
        let barrier = vk::MemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(
                vk::AccessFlags::INDEX_READ | vk::AccessFlags::VERTEX_ATTRIBUTE_READ | vk::AccessFlags::UNIFORM_READ,
            );
        self.cmd_copy.pipeline_barrier(
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::DRAW_INDIRECT
                | vk::PipelineStageFlags::VERTEX_INPUT
                | vk::PipelineStageFlags::VERTEX_SHADER,
            std::slice::from_ref(&barrier),
            &[],
            &[],
        );
        self.copy_recording = false;
        self.cmd_copy.end()
    }

    /// 提交前调用：flush 并 unmap 持久映射的 block，clean 时会重新映射
    pub fn finish_host_writes(&mut self) -> GfxResult<()> {
        self.uniforms.flush_automapped_memory()?;
        self.uniforms.unmap_automapped_memory();
        self.streamed_vertex.flush_automapped_memory()?;
        self.streamed_vertex.unmap_automapped_memory();
        Ok(())
    }
}

// 描述符
impl FrameResources {
    /// 为每个 layout 分配一个 set，每个 set 包含 `descriptors_per_set` 个 `ty` 类型的描述符
    pub fn allocate_descriptor_sets(
        &mut self,
        layouts: &[vk::DescriptorSetLayout],
        ty: vk::DescriptorType,
        descriptors_per_set: u32,
    ) -> GfxResult<Vec<vk::DescriptorSet>> {
        let num_sets = layouts.len() as u32;
        let pool = self.descriptor_pools.get_descriptor_pool(num_sets, ty, num_sets * descriptors_per_set)?;
        let info = vk::DescriptorSetAllocateInfo::default().descriptor_pool(pool).set_layouts(layouts);
        unsafe { self.device.allocate_descriptor_sets(&info).vk_context("vkAllocateDescriptorSets") }
    }

    /// 本帧内相同 (layout, buffer, range) 的动态 uniform 描述符集只分配一次
    pub fn dynamic_uniform_set(
        &mut self,
        layout: vk::DescriptorSetLayout,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    ) -> GfxResult<vk::DescriptorSet> {
        if let Some(set) = self.uniform_sets.get(&(layout, buffer, range)) {
            return Ok(*set);
        }

        let set = self.allocate_descriptor_sets(&[layout], vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, 1)?[0];
        self.device.write_dynamic_uniform(set, buffer, range);
        self.uniform_sets.insert((layout, buffer, range), set);
        Ok(set)
    }
}

impl FrameSlot for FrameResources {
    type Retired = RetiredObject;

    fn wait_for_previous_submission(&self) -> GfxResult<()> {
        self.previous_submission.wait()
    }

    fn reset_previous_submission(&self) -> GfxResult<()> {
        self.previous_submission.reset()
    }

    fn reset_descriptor_pools(&mut self) -> GfxResult<()> {
        self.uniform_sets.clear();
        self.descriptor_pools.reset()
    }

    fn reset_command_pool(&mut self) -> GfxResult<()> {
        self.copy_recording = false;
        self.cmd_pool.reset()
    }

    fn is_copy_recording(&self) -> bool {
        self.copy_recording
    }

    fn retire(&mut self, objects: Vec<RetiredObject>) {
        self.retired.extend(objects);
    }

    fn clean(&mut self) {
        let _span = tracy_client::span!("FrameResources::clean");

        self.staging.clean();
        self.streamed_vertex.clean();
        self.uniforms.clean();

        for object in self.retired.drain(..) {
            object.retire();
        }
        self.uniform_sets.clear();
    }

    fn destroy(mut self) {
        // 处于录制状态的 command buffer 随 pool 一起释放
        self.clean();

        let Self {
            cmd_pool,
            previous_submission,
            ..
        } = self;
        previous_submission.destroy();
        cmd_pool.destroy();
    }
}
