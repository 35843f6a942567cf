//! 面向上层的绘制接口
//!
//! 上层只通过 [`RenderBackend`] 创建 buffer、纹理、pipeline 并录制绘制命令。
//! 绘制相关的调用只在 render pass 开始之后生效，之前的调用被忽略。

use std::rc::Rc;

use ash::vk;
use kiln_gfx::error::{GfxError, GfxResult, VkResultExt};
use kiln_render_interface::config::BackendConfig;
use kiln_render_interface::pipeline_desc::{BufferUsage, GraphicsPipelineDesc, IndexType, PixelFormat};
use kiln_render_interface::pipeline_settings::FrameResourceSettings;
use kiln_render_interface::platform::PlatformAdapter;
use kiln_render_interface::shader_loader::ShaderLoader;
use kiln_render_interface::swap_interval::SwapInterval;

use crate::buffer::{BackendBuffer, UpdateFlag};
use crate::pipeline_registry::PipelineId;
use crate::swapchain_lifecycle::{FrameContext, SwapchainLifecycleManager, full_viewport};
use crate::texture::{BackendTexture, TextureRegion};

/// 单次绘制的顶点数、索引数上限
const MAX_ELEMENTS: u32 = 32_000;

/// 上层可以查询的设备能力
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextValue {
    MaxElementsVertices,
    MaxElementsIndices,
    MaxTextureSize,
    MaxSamples,
}

fn context_value_from_limits(
    value: ContextValue,
    limits: &vk::PhysicalDeviceLimits,
    max_samples: vk::SampleCountFlags,
) -> u32 {
    match value {
        ContextValue::MaxElementsVertices | ContextValue::MaxElementsIndices => MAX_ELEMENTS,
        ContextValue::MaxTextureSize => limits.max_image_dimension2_d,
        ContextValue::MaxSamples => max_samples.as_raw(),
    }
}

/// 索引 buffer 中的字节偏移换算为 `firstIndex`
fn first_index(offset: usize, index_type: IndexType) -> u32 {
    let size = index_type.size_in_bytes() as usize;
    debug_assert_eq!(offset % size, 0, "index offset {offset} is not aligned to {index_type:?}");
    (offset / size) as u32
}

pub struct RenderBackend {
    manager: SwapchainLifecycleManager,
    current_pipeline: Option<PipelineId>,
}

// new & init
impl RenderBackend {
    pub fn new(
        config: &BackendConfig,
        platform: Rc<dyn PlatformAdapter>,
        shader_loader: Box<dyn ShaderLoader>,
    ) -> GfxResult<Self> {
        Ok(Self {
            manager: SwapchainLifecycleManager::new(config, platform, shader_loader)?,
            current_pipeline: None,
        })
    }
}

// getters
impl RenderBackend {
    #[inline]
    pub fn manager(&self) -> &SwapchainLifecycleManager {
        &self.manager
    }

    #[inline]
    pub fn swap_interval(&self) -> SwapInterval {
        self.manager.swap_interval()
    }

    #[inline]
    pub fn should_draw(&self) -> bool {
        self.manager.should_draw()
    }

    pub fn context_value(&self, value: ContextValue) -> u32 {
        let pdevice = self.manager.physical_device();
        context_value_from_limits(value, pdevice.limits(), pdevice.max_usable_sample_count())
    }

    /// 交换链不可用时无法录制任何命令
    fn frame(&mut self) -> GfxResult<FrameContext<'_>> {
        self.manager.frame_context().ok_or(GfxError::OutOfDate)
    }

    /// render pass 已经开始时才返回
    fn draw_frame(&mut self) -> Option<FrameContext<'_>> {
        self.manager.frame_context().filter(|ctx| ctx.render_pass_started)
    }
}

// 资源
impl RenderBackend {
    pub fn create_buffer(&self, usage: BufferUsage, name: &str) -> BackendBuffer {
        BackendBuffer::new(
            self.manager.device().clone(),
            self.manager.allocator().clone(),
            self.manager.retirement_sender(),
            usage,
            name,
        )
    }

    /// 重新分配并上传全部数据
    pub fn upload_buffer(&mut self, buffer: &mut BackendBuffer, data: &[u8]) -> GfxResult<()> {
        let ctx = self.frame()?;
        buffer.upload(ctx.frame, ctx.frame_num, data);
        Ok(())
    }

    pub fn update_buffer(
        &mut self,
        buffer: &mut BackendBuffer,
        start: usize,
        data: &[u8],
        flag: UpdateFlag,
    ) -> GfxResult<()> {
        let ctx = self.frame()?;
        buffer.update(ctx.frame, ctx.frame_num, start, data, flag);
        Ok(())
    }

    /// `mip_levels` 至少为 1，不能超过完整 mip 链的层级数
    pub fn create_texture(
        &self,
        width: u32,
        height: u32,
        mip_levels: u32,
        format: PixelFormat,
        name: &str,
    ) -> BackendTexture {
        BackendTexture::new(
            self.manager.device().clone(),
            self.manager.allocator().clone(),
            self.manager.retirement_sender(),
            vk::Extent2D { width, height },
            mip_levels,
            format,
            name,
        )
    }

    pub fn upload_texture(
        &mut self,
        texture: &mut BackendTexture,
        region: TextureRegion,
        data: &[u8],
    ) -> GfxResult<()> {
        let ctx = self.frame()?;
        let alignment = ctx.physical_device.limits().optimal_buffer_copy_offset_alignment;
        texture.upload(ctx.frame, alignment, region, data);
        Ok(())
    }

    /// 上传层级 0 的区域，其余层级在 CPU 上生成
    pub fn upload_texture_and_generate_mipmaps(
        &mut self,
        texture: &mut BackendTexture,
        region: TextureRegion,
        data: &[u8],
    ) -> GfxResult<()> {
        let ctx = self.frame()?;
        let alignment = ctx.physical_device.limits().optimal_buffer_copy_offset_alignment;
        texture.upload_and_generate_mipmaps(ctx.frame, alignment, region, data);
        Ok(())
    }

    /// 没有可用的 render pass 时返回 `OutOfDate`
    pub fn build_pipeline(&mut self, desc: &GraphicsPipelineDesc) -> GfxResult<PipelineId> {
        self.manager.build_pipeline(desc)
    }
}

// 绑定
impl RenderBackend {
    /// 与当前 pipeline 相同时不重复绑定
    pub fn bind_pipeline(&mut self, id: PipelineId) {
        if self.current_pipeline == Some(id) {
            return;
        }
        let Some(ctx) = self.draw_frame() else {
            return;
        };
        let Some(pipeline) = ctx.pipelines.get(id) else {
            log::error!("bind of an unknown pipeline {id:?}");
            return;
        };
        ctx.frame.cmd_draw.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, pipeline.handle());
        self.current_pipeline = Some(id);
    }

    pub fn bind_index_buffer(&mut self, buffer: &BackendBuffer, index_type: IndexType) {
        assert!(buffer.usage().contains(BufferUsage::INDEX), "buffer is not an index buffer");
        if let Some(ctx) = self.draw_frame() {
            ctx.frame.cmd_draw.bind_index_buffer(buffer.vk_buffer(), 0, index_type.to_vk());
        }
    }

    pub fn bind_vertex_buffers(&mut self, first_binding: u32, buffers: &[&BackendBuffer]) {
        assert!(
            buffers.iter().all(|buffer| buffer.usage().contains(BufferUsage::VERTEX)),
            "all bound buffers must be vertex buffers"
        );
        let Some(ctx) = self.draw_frame() else {
            return;
        };
        let handles = buffers.iter().map(|buffer| buffer.vk_buffer()).collect::<Vec<_>>();
        let offsets = vec![0; handles.len()];
        ctx.frame.cmd_draw.bind_vertex_buffers(first_binding, &handles, &offsets);
    }

    /// 每帧都会变化的顶点数据，写入本帧的 streamed vertex 块
    pub fn bind_streamed_vertex_buffers(&mut self, binding: u32, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let Some(ctx) = self.draw_frame() else {
            return;
        };
        let allocation =
            ctx.frame.streamed_vertex.alloc(data.len() as vk::DeviceSize, FrameResourceSettings::STREAMED_VERTEX_ALIGN);
        ctx.frame.streamed_vertex.write_bytes(&allocation, data);
        ctx.frame.cmd_draw.bind_vertex_buffers(binding, &[allocation.buffer], &[allocation.offset]);
    }

    /// 写入本帧的 uniform 块，并以动态偏移绑定到 set 0
    pub fn set_constants(&mut self, data: &[u8]) {
        let Some(id) = self.current_pipeline else {
            log::warn!("set_constants without a bound pipeline");
            return;
        };
        let Some(ctx) = self.draw_frame() else {
            return;
        };
        let Some(pipeline) = ctx.pipelines.get(id) else {
            return;
        };

        let alignment = ctx.physical_device.limits().min_uniform_buffer_offset_alignment;
        let size = data.len() as vk::DeviceSize;
        let allocation = ctx.frame.uniforms.alloc(size, alignment);
        ctx.frame.uniforms.write_bytes(&allocation, data);

        let set = ctx
            .frame
            .dynamic_uniform_set(pipeline.uniform_layout(), allocation.buffer, size)
            .or_fatal("vkAllocateDescriptorSets");
        ctx.frame.cmd_draw.bind_descriptor_sets(
            vk::PipelineBindPoint::GRAPHICS,
            pipeline.layout(),
            0,
            &[set],
            &[allocation.offset as u32],
        );
    }

    pub fn set_constants_pod<T: bytemuck::Pod>(&mut self, constants: &T) {
        self.set_constants(bytemuck::bytes_of(constants));
    }

    /// 绑定到 set 1；`None` 以及缺省的纹理使用默认纹理
    pub fn bind_textures(&mut self, textures: &[Option<&BackendTexture>]) {
        let Some(id) = self.current_pipeline else {
            log::warn!("bind_textures without a bound pipeline");
            return;
        };
        let Some(ctx) = self.draw_frame() else {
            return;
        };
        let Some(pipeline) = ctx.pipelines.get(id) else {
            return;
        };
        let count = pipeline.texture_count();
        assert!(textures.len() <= count, "{} textures bound, pipeline has {count} inputs", textures.len());
        if count == 0 {
            return;
        }

        let set = ctx
            .frame
            .allocate_descriptor_sets(
                &[pipeline.textures_layout()],
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                count as u32,
            )
            .or_fatal("vkAllocateDescriptorSets")[0];
        let writes = (0..count)
            .map(|i| {
                let view = textures.get(i).copied().flatten().map_or(ctx.default_texture_view, BackendTexture::view);
                (view, pipeline.sampler(i))
            })
            .collect::<Vec<_>>();
        ctx.device.write_textures(set, &writes);
        ctx.frame.cmd_draw.bind_descriptor_sets(vk::PipelineBindPoint::GRAPHICS, pipeline.layout(), 1, &[set], &[]);
    }
}

// draw
impl RenderBackend {
    pub fn draw(&mut self, vertex_count: u32, first_vertex: u32) {
        self.draw_instanced(vertex_count, first_vertex, 1);
    }

    /// `offset` 为索引 buffer 中的字节偏移
    pub fn draw_indexed(&mut self, index_count: u32, offset: usize, index_type: IndexType) {
        self.draw_indexed_instanced(index_count, offset, index_type, 1);
    }

    pub fn draw_instanced(&mut self, vertex_count: u32, first_vertex: u32, instance_count: u32) {
        if let Some(ctx) = self.draw_frame() {
            ctx.frame.cmd_draw.draw(vertex_count, instance_count, first_vertex, 0);
        }
    }

    pub fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        offset: usize,
        index_type: IndexType,
        instance_count: u32,
    ) {
        if let Some(ctx) = self.draw_frame() {
            ctx.frame.cmd_draw.draw_indexed(index_count, instance_count, first_index(offset, index_type), 0, 0);
        }
    }

    /// 只对开启了 polygon offset 的 pipeline 生效
    pub fn set_polygon_offset(&mut self, offset: f32, scale: f32) {
        if let Some(ctx) = self.draw_frame() {
            ctx.frame.cmd_draw.set_depth_bias(offset, 0.0, scale);
        }
    }

    pub fn set_depth_range(&mut self, min: f32, max: f32) {
        if let Some(ctx) = self.draw_frame() {
            ctx.frame.cmd_draw.set_viewport(full_viewport(ctx.extent, min, max));
        }
    }
}

// 帧控制
impl RenderBackend {
    /// 窗口最小化时返回 false，此时本帧的绘制调用都被忽略
    pub fn begin_render_pass(&mut self) -> bool {
        self.manager.begin_render_pass()
    }

    /// 结束 render pass 并 flip
    pub fn end_render_pass(&mut self) {
        self.current_pipeline = None;
        self.manager.flip();
    }

    pub fn set_swap_interval(&mut self, interval: SwapInterval) -> bool {
        self.manager.set_swap_interval(interval)
    }

    pub fn handle_window_size_change(&self, width: u32, height: u32) {
        self.manager.handle_window_size_change(width, height);
    }
}

// destroy
impl RenderBackend {
    /// 上层的 buffer、纹理需要在此之前全部 drop
    pub fn destroy(self) {
        self.manager.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_index() {
        assert_eq!(first_index(0, IndexType::U16), 0);
        assert_eq!(first_index(12, IndexType::U16), 6);
        assert_eq!(first_index(12, IndexType::U32), 3);
    }

    #[test]
    fn test_context_value() {
        let limits = vk::PhysicalDeviceLimits {
            max_image_dimension2_d: 16384,
            ..Default::default()
        };
        let samples = vk::SampleCountFlags::TYPE_8;

        assert_eq!(context_value_from_limits(ContextValue::MaxElementsVertices, &limits, samples), 32_000);
        assert_eq!(context_value_from_limits(ContextValue::MaxElementsIndices, &limits, samples), 32_000);
        assert_eq!(context_value_from_limits(ContextValue::MaxTextureSize, &limits, samples), 16384);
        assert_eq!(context_value_from_limits(ContextValue::MaxSamples, &limits, samples), 8);
    }
}
