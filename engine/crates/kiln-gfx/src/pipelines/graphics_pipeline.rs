use std::rc::Rc;

use ash::vk;

use crate::error::{GfxResult, VkResultExt};
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::GfxDevice;
use crate::pipelines::shader::GfxShaderModule;

/// 创建 graphics pipeline 所需的固定功能状态
///
/// 只保存普通字段，具体的 `vk::*CreateInfo` 在 [`GfxGraphicsPipeline::new`] 中组装
#[derive(Clone, Debug)]
pub struct GfxGraphicsPipelineCreateInfo {
    pub descriptor_set_layouts: Vec<vk::DescriptorSetLayout>,

    pub vertex_binding_desc: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attribute_desc: Vec<vk::VertexInputAttributeDescription>,
    pub primitive_topology: vk::PrimitiveTopology,

    pub polygon_mode: vk::PolygonMode,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_bias_enable: bool,

    pub msaa_sample: vk::SampleCountFlags,

    pub color_attach_blend_state: vk::PipelineColorBlendAttachmentState,

    pub depth_test_enable: bool,
    pub depth_write_enable: bool,
    pub depth_compare_op: vk::CompareOp,
    pub stencil_test_enable: bool,
    pub stencil_front: vk::StencilOpState,
    pub stencil_back: vk::StencilOpState,

    pub dynamic_states: Vec<vk::DynamicState>,

    /// render pass 中的第几个 subpass
    pub subpass: u32,
}

impl Default for GfxGraphicsPipelineCreateInfo {
    fn default() -> Self {
        Self {
            descriptor_set_layouts: vec![],

            vertex_binding_desc: vec![],
            vertex_attribute_desc: vec![],
            primitive_topology: vk::PrimitiveTopology::TRIANGLE_LIST,

            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_bias_enable: false,

            msaa_sample: vk::SampleCountFlags::TYPE_1,

            color_attach_blend_state: vk::PipelineColorBlendAttachmentState::default()
                .blend_enable(false)
                .color_write_mask(vk::ColorComponentFlags::RGBA),

            depth_test_enable: false,
            depth_write_enable: false,
            depth_compare_op: vk::CompareOp::LESS_OR_EQUAL,
            stencil_test_enable: false,
            stencil_front: vk::StencilOpState::default(),
            stencil_back: vk::StencilOpState::default(),

            // viewport 和 scissor 总是动态的
            dynamic_states: vec![
                vk::DynamicState::VIEWPORT,
                vk::DynamicState::SCISSOR,
                vk::DynamicState::DEPTH_BIAS,
            ],

            subpass: 0,
        }
    }
}

pub struct GfxPipelineLayout {
    handle: vk::PipelineLayout,
    device: Rc<GfxDevice>,
}

impl DebugType for GfxPipelineLayout {
    fn debug_type_name() -> &'static str {
        "GfxPipelineLayout"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

impl GfxPipelineLayout {
    pub fn new(device: Rc<GfxDevice>, set_layouts: &[vk::DescriptorSetLayout], debug_name: &str) -> Self {
        let create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(set_layouts);
        let handle =
            unsafe { device.create_pipeline_layout(&create_info, None).or_fatal("vkCreatePipelineLayout") };

        let layout = Self { handle, device };
        layout.device.set_debug_name(&layout, debug_name);
        layout
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }

    pub fn destroy(self) {
        unsafe {
            self.device.destroy_pipeline_layout(self.handle, None);
        }
    }
}

/// 基于 render pass 的 graphics pipeline，拥有自己的 pipeline layout
pub struct GfxGraphicsPipeline {
    pipeline: vk::Pipeline,
    layout: GfxPipelineLayout,
    device: Rc<GfxDevice>,
}

impl DebugType for GfxGraphicsPipeline {
    fn debug_type_name() -> &'static str {
        "GfxGraphicsPipeline"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.pipeline
    }
}

// new & init
impl GfxGraphicsPipeline {
    pub fn new(
        device: Rc<GfxDevice>,
        create_info: &GfxGraphicsPipelineCreateInfo,
        vertex_shader: &GfxShaderModule,
        fragment_shader: &GfxShaderModule,
        render_pass: vk::RenderPass,
        debug_name: &str,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxGraphicsPipeline::new");

        let layout = GfxPipelineLayout::new(
            device.clone(),
            &create_info.descriptor_set_layouts,
            &format!("{debug_name}-layout"),
        );

        let shader_stages = [vertex_shader.stage_info(), fragment_shader.stage_info()];

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&create_info.vertex_binding_desc)
            .vertex_attribute_descriptions(&create_info.vertex_attribute_desc);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(create_info.primitive_topology)
            .primitive_restart_enable(false);

        // viewport 与 scissor 是动态状态，这里只需要数量
        let viewport_state = vk::PipelineViewportStateCreateInfo::default().viewport_count(1).scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(create_info.polygon_mode)
            .line_width(1.0)
            .cull_mode(create_info.cull_mode)
            .front_face(create_info.front_face)
            .depth_bias_enable(create_info.depth_bias_enable);

        let multisample_state =
            vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(create_info.msaa_sample);

        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(std::slice::from_ref(&create_info.color_attach_blend_state));

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(create_info.depth_test_enable)
            .depth_write_enable(create_info.depth_write_enable)
            .depth_compare_op(create_info.depth_compare_op)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(create_info.stencil_test_enable)
            .front(create_info.stencil_front)
            .back(create_info.stencil_back);

        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&create_info.dynamic_states);

        let pipeline_ci = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .color_blend_state(&color_blend_state)
            .depth_stencil_state(&depth_stencil_state)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .render_pass(render_pass)
            .subpass(create_info.subpass);

        let pipelines = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_ci), None)
        };
        let pipeline = match pipelines {
            Ok(pipelines) => pipelines[0],
            Err((_, result)) => {
                layout.destroy();
                return Err::<Self, _>(result).vk_context("vkCreateGraphicsPipelines");
            }
        };

        let pipeline = Self {
            pipeline,
            layout,
            device,
        };
        pipeline.device.set_debug_name(&pipeline, debug_name);
        Ok(pipeline)
    }
}

// getters
impl GfxGraphicsPipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout.handle()
    }
}

// destroy
impl GfxGraphicsPipeline {
    pub fn destroy(self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
        }
        self.layout.destroy();
    }
}
