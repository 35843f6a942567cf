//! 上层用来描述 pipeline、buffer、纹理的抽象类型，以及到 Vulkan 的转换
//!
//! [`GraphicsPipelineDesc`] 实现了 `Hash + Eq`，作为 pipeline 缓存的键。

use ash::vk;
use bitflags::bitflags;
use kiln_gfx::pipelines::graphics_pipeline::GfxGraphicsPipelineCreateInfo;
use kiln_gfx::resources::sampler::GfxSamplerDesc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Opaque,
    Alpha,
    Additive,
    Premultiplied,
    Multiplicative,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthMode {
    /// `<=` 比较，写入
    LessEqualWrite,
    /// `<=` 比较，不写入
    LessEqualNoWrite,
    AlwaysWrite,
    /// 关闭深度测试
    #[default]
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilMode {
    #[default]
    Disabled,
    ShadowQuad,
    ShadowSilhouette,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    None,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveType {
    Lines,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttributeType {
    Float4,
    Float3,
    Float2,
    U8x4Norm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerType {
    Bilinear,
    BilinearRepeat,
    Anisotropic,
    AnisotropicRepeat,
    NearestClamped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexType {
    U16,
    U32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Rgba8Unorm,
    Bgra8Unorm,
    Rgb8UnormPacked,
    R8Unorm,
    Rg8Unorm,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BufferUsage: u32 {
        const VERTEX = 1 << 0;
        const INDEX = 1 << 1;
    }
}

/// pipeline 的固定功能状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StateDescription {
    pub blend: BlendMode,
    pub depth: DepthMode,
    /// 为 false 时不写入任何颜色通道
    pub color_write: bool,
    /// 是否开启 depth bias，数值通过 `set_polygon_offset` 动态设置
    pub polygon_offset: bool,
    pub stencil: StencilMode,
    pub cull: CullMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub ty: VertexAttributeType,
    pub offset: u32,
}

/// 一个 vertex buffer binding 的布局，binding 序号即其在数组中的位置
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexBufferLayout {
    pub stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureInput {
    pub binding: u32,
    pub sampler: SamplerType,
}

/// 创建 pipeline 的全部参数
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct GraphicsPipelineDesc {
    pub state: StateDescription,
    /// 交给 `ShaderLoader` 的逻辑名称
    pub vertex_shader: String,
    pub fragment_shader: String,
    pub primitive: PrimitiveType,
    pub textures: Vec<TextureInput>,
    pub vertex_buffers: Vec<VertexBufferLayout>,
}

// 到 Vulkan 的转换
impl BlendMode {
    pub fn to_vk(self, color_write: bool) -> vk::PipelineColorBlendAttachmentState {
        let write_mask = if color_write { vk::ColorComponentFlags::RGBA } else { vk::ColorComponentFlags::empty() };
        let blend = |src_color: vk::BlendFactor,
                     src_alpha: vk::BlendFactor,
                     dst_color: vk::BlendFactor,
                     dst_alpha: vk::BlendFactor| {
            vk::PipelineColorBlendAttachmentState::default()
                .blend_enable(true)
                .color_blend_op(vk::BlendOp::ADD)
                .alpha_blend_op(vk::BlendOp::ADD)
                .src_color_blend_factor(src_color)
                .src_alpha_blend_factor(src_alpha)
                .dst_color_blend_factor(dst_color)
                .dst_alpha_blend_factor(dst_alpha)
                .color_write_mask(write_mask)
        };

        use vk::BlendFactor as F;
        match self {
            Self::Opaque => vk::PipelineColorBlendAttachmentState::default()
                .blend_enable(false)
                .color_write_mask(write_mask),
            Self::Alpha => blend(F::SRC_ALPHA, F::SRC_ALPHA, F::ONE_MINUS_SRC_ALPHA, F::ONE_MINUS_SRC_ALPHA),
            Self::Additive => blend(F::SRC_ALPHA, F::SRC_ALPHA, F::ONE, F::ONE),
            Self::Premultiplied | Self::Text => {
                blend(F::ONE, F::ONE, F::ONE_MINUS_SRC_ALPHA, F::ONE_MINUS_SRC_ALPHA)
            }
            Self::Multiplicative => blend(F::ZERO, F::ZERO, F::SRC_COLOR, F::ONE_MINUS_SRC_ALPHA),
        }
    }
}

impl DepthMode {
    /// (test, write, compare op)
    pub fn to_vk(self) -> (bool, bool, vk::CompareOp) {
        match self {
            Self::LessEqualWrite => (true, true, vk::CompareOp::LESS_OR_EQUAL),
            Self::LessEqualNoWrite => (true, false, vk::CompareOp::LESS_OR_EQUAL),
            Self::AlwaysWrite => (true, true, vk::CompareOp::ALWAYS),
            Self::Off => (false, false, vk::CompareOp::ALWAYS),
        }
    }
}

impl StencilMode {
    /// 关闭时返回 `None`，否则返回 (front, back)
    pub fn to_vk(self) -> Option<(vk::StencilOpState, vk::StencilOpState)> {
        let op = |pass_op: vk::StencilOp, compare_op: vk::CompareOp| vk::StencilOpState {
            fail_op: vk::StencilOp::KEEP,
            pass_op,
            depth_fail_op: vk::StencilOp::KEEP,
            compare_op,
            compare_mask: !0,
            write_mask: !0,
            reference: 0,
        };
        match self {
            Self::Disabled => None,
            Self::ShadowQuad => {
                let quad = op(vk::StencilOp::KEEP, vk::CompareOp::LESS);
                Some((quad, quad))
            }
            Self::ShadowSilhouette => Some((
                op(vk::StencilOp::INCREMENT_AND_WRAP, vk::CompareOp::ALWAYS),
                op(vk::StencilOp::DECREMENT_AND_WRAP, vk::CompareOp::ALWAYS),
            )),
        }
    }
}

impl CullMode {
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            Self::None => vk::CullModeFlags::NONE,
            Self::Back => vk::CullModeFlags::BACK,
        }
    }
}

impl PrimitiveType {
    pub fn to_vk(self) -> vk::PrimitiveTopology {
        match self {
            Self::Lines => vk::PrimitiveTopology::LINE_LIST,
            Self::LineStrip => vk::PrimitiveTopology::LINE_STRIP,
            Self::Triangles => vk::PrimitiveTopology::TRIANGLE_LIST,
            Self::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        }
    }
}

impl VertexAttributeType {
    pub fn to_vk(self) -> vk::Format {
        match self {
            Self::Float4 => vk::Format::R32G32B32A32_SFLOAT,
            Self::Float3 => vk::Format::R32G32B32_SFLOAT,
            Self::Float2 => vk::Format::R32G32_SFLOAT,
            Self::U8x4Norm => vk::Format::R8G8B8A8_UNORM,
        }
    }
}

impl SamplerType {
    /// 设备不支持各向异性过滤时退化为三线性过滤
    pub fn to_sampler_desc(self, anisotropy_supported: bool) -> GfxSamplerDesc {
        let (filter, mipmap_mode, address_mode, anisotropic) = match self {
            Self::Bilinear => {
                (vk::Filter::LINEAR, vk::SamplerMipmapMode::NEAREST, vk::SamplerAddressMode::CLAMP_TO_EDGE, false)
            }
            Self::BilinearRepeat => {
                (vk::Filter::LINEAR, vk::SamplerMipmapMode::NEAREST, vk::SamplerAddressMode::REPEAT, false)
            }
            Self::Anisotropic => {
                (vk::Filter::LINEAR, vk::SamplerMipmapMode::LINEAR, vk::SamplerAddressMode::CLAMP_TO_EDGE, true)
            }
            Self::AnisotropicRepeat => {
                (vk::Filter::LINEAR, vk::SamplerMipmapMode::LINEAR, vk::SamplerAddressMode::REPEAT, true)
            }
            Self::NearestClamped => {
                (vk::Filter::NEAREST, vk::SamplerMipmapMode::NEAREST, vk::SamplerAddressMode::CLAMP_TO_EDGE, false)
            }
        };
        GfxSamplerDesc {
            mag_filter: filter,
            min_filter: filter,
            address_mode,
            max_anisotropy: if anisotropic && anisotropy_supported { 16 } else { 0 },
            mipmap_mode,
            max_lod: Some(if anisotropic { 10 } else { 0 }),
        }
    }
}

impl IndexType {
    pub fn to_vk(self) -> vk::IndexType {
        match self {
            Self::U16 => vk::IndexType::UINT16,
            Self::U32 => vk::IndexType::UINT32,
        }
    }

    pub fn size_in_bytes(self) -> u32 {
        match self {
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

impl PixelFormat {
    pub fn to_vk(self) -> vk::Format {
        match self {
            Self::Rgba8Unorm => vk::Format::R8G8B8A8_UNORM,
            Self::Bgra8Unorm => vk::Format::B8G8R8A8_UNORM,
            Self::Rgb8UnormPacked => vk::Format::A8B8G8R8_UNORM_PACK32,
            Self::R8Unorm => vk::Format::R8_UNORM,
            Self::Rg8Unorm => vk::Format::R8G8_UNORM,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgba8Unorm | Self::Bgra8Unorm | Self::Rgb8UnormPacked => 4,
            Self::R8Unorm => 1,
            Self::Rg8Unorm => 2,
        }
    }
}

impl BufferUsage {
    pub fn to_vk(self) -> vk::BufferUsageFlags {
        let mut flags = vk::BufferUsageFlags::empty();
        if self.contains(Self::VERTEX) {
            flags |= vk::BufferUsageFlags::VERTEX_BUFFER;
        }
        if self.contains(Self::INDEX) {
            flags |= vk::BufferUsageFlags::INDEX_BUFFER;
        }
        flags
    }
}

impl GraphicsPipelineDesc {
    /// binding 序号为 vertex buffer 的下标，input rate 都是逐顶点
    pub fn vertex_input(&self) -> (Vec<vk::VertexInputBindingDescription>, Vec<vk::VertexInputAttributeDescription>) {
        let bindings = self
            .vertex_buffers
            .iter()
            .enumerate()
            .map(|(binding, buffer)| vk::VertexInputBindingDescription {
                binding: binding as u32,
                stride: buffer.stride,
                input_rate: vk::VertexInputRate::VERTEX,
            })
            .collect();
        let attributes = self
            .vertex_buffers
            .iter()
            .enumerate()
            .flat_map(|(binding, buffer)| {
                buffer.attributes.iter().map(move |attr| vk::VertexInputAttributeDescription {
                    location: attr.location,
                    binding: binding as u32,
                    format: attr.ty.to_vk(),
                    offset: attr.offset,
                })
            })
            .collect();
        (bindings, attributes)
    }

    /// 组装 GFX 层的创建参数
    ///
    /// set 0 为动态 uniform buffer，set 1 为纹理
    pub fn to_create_info(
        &self,
        set_layouts: [vk::DescriptorSetLayout; 2],
        samples: vk::SampleCountFlags,
    ) -> GfxGraphicsPipelineCreateInfo {
        let (vertex_binding_desc, vertex_attribute_desc) = self.vertex_input();
        let (depth_test_enable, depth_write_enable, depth_compare_op) = self.state.depth.to_vk();
        let stencil = self.state.stencil.to_vk();

        GfxGraphicsPipelineCreateInfo {
            descriptor_set_layouts: set_layouts.to_vec(),
            vertex_binding_desc,
            vertex_attribute_desc,
            primitive_topology: self.primitive.to_vk(),
            cull_mode: self.state.cull.to_vk(),
            front_face: vk::FrontFace::CLOCKWISE,
            depth_bias_enable: self.state.polygon_offset,
            msaa_sample: samples,
            color_attach_blend_state: self.state.blend.to_vk(self.state.color_write),
            depth_test_enable,
            depth_write_enable,
            depth_compare_op,
            stencil_test_enable: stencil.is_some(),
            stencil_front: stencil.map(|(front, _)| front).unwrap_or_default(),
            stencil_back: stencil.map(|(_, back)| back).unwrap_or_default(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn textured_desc() -> GraphicsPipelineDesc {
        GraphicsPipelineDesc {
            state: StateDescription {
                blend: BlendMode::Alpha,
                depth: DepthMode::LessEqualWrite,
                color_write: true,
                ..Default::default()
            },
            vertex_shader: "textured.vert".to_string(),
            fragment_shader: "textured.frag".to_string(),
            primitive: PrimitiveType::TriangleStrip,
            textures: vec![TextureInput {
                binding: 0,
                sampler: SamplerType::Bilinear,
            }],
            vertex_buffers: vec![
                VertexBufferLayout {
                    stride: 12,
                    attributes: vec![VertexAttribute {
                        location: 0,
                        ty: VertexAttributeType::Float3,
                        offset: 0,
                    }],
                },
                VertexBufferLayout {
                    stride: 8,
                    attributes: vec![VertexAttribute {
                        location: 1,
                        ty: VertexAttributeType::Float2,
                        offset: 0,
                    }],
                },
            ],
        }
    }

    #[test]
    fn test_desc_as_cache_key() {
        let mut set = HashSet::new();
        assert!(set.insert(textured_desc()));
        assert!(!set.insert(textured_desc()));

        let mut other = textured_desc();
        other.state.cull = CullMode::Back;
        assert!(set.insert(other));
    }

    #[test]
    fn test_vertex_input() {
        let (bindings, attributes) = textured_desc().vertex_input();
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[1].stride, 8);
        assert_eq!(attributes[1].binding, 1);
        assert_eq!(attributes[1].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn test_color_write_mask() {
        assert_eq!(BlendMode::Opaque.to_vk(false).color_write_mask, vk::ColorComponentFlags::empty());
        let alpha = BlendMode::Alpha.to_vk(true);
        assert_eq!(alpha.blend_enable, vk::TRUE);
        assert_eq!(alpha.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
    }

    #[test]
    fn test_stencil_silhouette_is_two_sided() {
        let (front, back) = StencilMode::ShadowSilhouette.to_vk().unwrap();
        assert_eq!(front.pass_op, vk::StencilOp::INCREMENT_AND_WRAP);
        assert_eq!(back.pass_op, vk::StencilOp::DECREMENT_AND_WRAP);
        assert!(StencilMode::Disabled.to_vk().is_none());
    }

    #[test]
    fn test_to_create_info() {
        let info = textured_desc().to_create_info(
            [vk::DescriptorSetLayout::null(), vk::DescriptorSetLayout::null()],
            vk::SampleCountFlags::TYPE_4,
        );
        assert_eq!(info.descriptor_set_layouts.len(), 2);
        assert_eq!(info.primitive_topology, vk::PrimitiveTopology::TRIANGLE_STRIP);
        assert_eq!(info.msaa_sample, vk::SampleCountFlags::TYPE_4);
        assert!(info.depth_test_enable && info.depth_write_enable);
        assert!(!info.stencil_test_enable);
        assert!(info.dynamic_states.contains(&vk::DynamicState::DEPTH_BIAS));
    }

    #[test]
    fn test_anisotropy_fallback() {
        assert_eq!(SamplerType::Anisotropic.to_sampler_desc(true).max_anisotropy, 16);
        assert_eq!(SamplerType::Anisotropic.to_sampler_desc(false).max_anisotropy, 0);
        assert_eq!(SamplerType::Bilinear.to_sampler_desc(true).max_lod, Some(0));
    }

    #[test]
    fn test_buffer_usage() {
        assert_eq!(
            (BufferUsage::VERTEX | BufferUsage::INDEX).to_vk(),
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::INDEX_BUFFER
        );
    }
}
