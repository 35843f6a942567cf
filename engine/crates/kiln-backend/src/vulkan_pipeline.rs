use std::rc::Rc;

use ash::vk;
use itertools::Itertools;
use kiln_gfx::descriptors::descriptor_set_layout::GfxDescriptorSetLayout;
use kiln_gfx::error::GfxResult;
use kiln_gfx::foundation::device::GfxDevice;
use kiln_gfx::pipelines::graphics_pipeline::GfxGraphicsPipeline;
use kiln_gfx::pipelines::shader::GfxShaderModule;
use kiln_gfx::resources::sampler::GfxSampler;
use kiln_render_interface::pipeline_desc::GraphicsPipelineDesc;
use kiln_render_interface::shader_loader::ShaderLoader;

use crate::pipeline_registry::{LivePass, PipelineBuilder};

/// 一个 pipeline 以及它独占的描述符布局和采样器
///
/// - set 0：binding 0 为动态 uniform buffer
/// - set 1：纹理，使用 immutable sampler
pub struct BackendPipeline {
    pipeline: GfxGraphicsPipeline,
    uniform_layout: GfxDescriptorSetLayout,
    textures_layout: GfxDescriptorSetLayout,
    samplers: Vec<GfxSampler>,
}

// getters
impl BackendPipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline.handle()
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.pipeline.layout()
    }

    #[inline]
    pub fn uniform_layout(&self) -> vk::DescriptorSetLayout {
        self.uniform_layout.handle()
    }

    #[inline]
    pub fn textures_layout(&self) -> vk::DescriptorSetLayout {
        self.textures_layout.handle()
    }

    #[inline]
    pub fn texture_count(&self) -> usize {
        self.samplers.len()
    }

    /// 第 i 个纹理输入使用的采样器
    #[inline]
    pub fn sampler(&self, index: usize) -> vk::Sampler {
        self.samplers[index].handle()
    }
}

pub struct VulkanPipelineBuilder {
    device: Rc<GfxDevice>,
    shader_loader: Box<dyn ShaderLoader>,
    anisotropy_supported: bool,
}

impl VulkanPipelineBuilder {
    pub fn new(device: Rc<GfxDevice>, shader_loader: Box<dyn ShaderLoader>, anisotropy_supported: bool) -> Self {
        Self {
            device,
            shader_loader,
            anisotropy_supported,
        }
    }

    fn load_module(&self, name: &str, stage: vk::ShaderStageFlags) -> GfxResult<GfxShaderModule> {
        let spirv = self.shader_loader.load_spirv(name)?;
        Ok(GfxShaderModule::new(self.device.clone(), &spirv, stage, name))
    }
}

impl PipelineBuilder for VulkanPipelineBuilder {
    type Pipeline = BackendPipeline;

    fn build(&self, desc: &GraphicsPipelineDesc, live: &LivePass) -> GfxResult<BackendPipeline> {
        let name = format!("{}+{}", desc.vertex_shader, desc.fragment_shader);
        debug_assert!(
            desc.textures.iter().enumerate().all(|(i, input)| input.binding == i as u32),
            "texture bindings must be contiguous from 0: {name}"
        );

        let vertex = self.load_module(&desc.vertex_shader, vk::ShaderStageFlags::VERTEX)?;
        let fragment = match self.load_module(&desc.fragment_shader, vk::ShaderStageFlags::FRAGMENT) {
            Ok(module) => module,
            Err(e) => {
                vertex.destroy();
                return Err(e);
            }
        };

        let uniform_layout = GfxDescriptorSetLayout::new_dynamic_uniform(
            self.device.clone(),
            vk::ShaderStageFlags::ALL_GRAPHICS,
            &format!("{name}-uniform"),
        );

        let samplers = desc
            .textures
            .iter()
            .map(|input| {
                GfxSampler::new(
                    self.device.clone(),
                    &input.sampler.to_sampler_desc(self.anisotropy_supported),
                    format!("{name}-sampler-{}", input.binding),
                )
            })
            .collect_vec();
        let sampler_handles = samplers.iter().map(GfxSampler::handle).collect_vec();
        let bindings = desc
            .textures
            .iter()
            .zip(&sampler_handles)
            .map(|(input, sampler)| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(input.binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::FRAGMENT)
                    .immutable_samplers(std::slice::from_ref(sampler))
            })
            .collect_vec();
        let textures_layout = GfxDescriptorSetLayout::new(self.device.clone(), &bindings, &format!("{name}-textures"));

        let create_info = desc.to_create_info([uniform_layout.handle(), textures_layout.handle()], live.samples);
        let pipeline =
            GfxGraphicsPipeline::new(self.device.clone(), &create_info, &vertex, &fragment, live.render_pass, &name);

        // pipeline 创建完成后 shader module 不再需要
        vertex.destroy();
        fragment.destroy();

        match pipeline {
            Ok(pipeline) => Ok(BackendPipeline {
                pipeline,
                uniform_layout,
                textures_layout,
                samplers,
            }),
            Err(e) => {
                log::error!("failed to create pipeline {name}: {e}");
                uniform_layout.destroy();
                textures_layout.destroy();
                samplers.into_iter().for_each(GfxSampler::destroy);
                Err(e)
            }
        }
    }

    fn destroy(&self, pipeline: BackendPipeline) {
        pipeline.pipeline.destroy();
        pipeline.uniform_layout.destroy();
        pipeline.textures_layout.destroy();
        pipeline.samplers.into_iter().for_each(GfxSampler::destroy);
    }
}
