use ash::vk;

use crate::render_pass::compat::RenderPassCompat;

/// 单个 graphics subpass 的 render pass 描述，持有所有数组
#[derive(Debug, Clone, Default)]
pub struct RenderPassDescription {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub color_refs: Vec<vk::AttachmentReference>,
    pub depth_ref: Option<vk::AttachmentReference>,
    pub resolve_refs: Vec<vk::AttachmentReference>,
    pub dependencies: Vec<vk::SubpassDependency>,
}

impl RenderPassDescription {
    /// 临时构造 create info 并交给 `f`
    pub fn with_create_info<R>(&self, f: impl FnOnce(&vk::RenderPassCreateInfo<'_>) -> R) -> R {
        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&self.color_refs);
        if !self.resolve_refs.is_empty() {
            debug_assert_eq!(self.resolve_refs.len(), self.color_refs.len());
            subpass = subpass.resolve_attachments(&self.resolve_refs);
        }
        if let Some(depth_ref) = self.depth_ref.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth_ref);
        }

        let info = vk::RenderPassCreateInfo::default()
            .attachments(&self.attachments)
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(&self.dependencies);
        f(&info)
    }

    pub fn compat(&self) -> RenderPassCompat {
        // create info 由 builder 方法构造，指针都有效
        self.with_create_info(|info| unsafe { RenderPassCompat::from_create_info(info) })
    }
}

/// 主 render pass
///
/// - attachment 0：color；没有 MSAA 时直接是交换链图像
/// - attachment 1：depth-stencil
/// - attachment 2：MSAA 时的单采样 resolve 目标（交换链图像）
pub fn default_render_pass(
    color_format: vk::Format,
    depth_format: vk::Format,
    samples: vk::SampleCountFlags,
) -> RenderPassDescription {
    let msaa = samples != vk::SampleCountFlags::TYPE_1;

    let color = vk::AttachmentDescription::default()
        .format(color_format)
        .samples(samples)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(if msaa {
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        } else {
            vk::ImageLayout::PRESENT_SRC_KHR
        });

    let depth = vk::AttachmentDescription::default()
        .format(depth_format)
        .samples(samples)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::CLEAR)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

    let mut attachments = vec![color, depth];
    let mut resolve_refs = vec![];
    if msaa {
        attachments.push(
            vk::AttachmentDescription::default()
                .format(color_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::DONT_CARE)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
        );
        resolve_refs.push(
            vk::AttachmentReference::default().attachment(2).layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
        );
    }

    let dependency = vk::SubpassDependency::default()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE);

    RenderPassDescription {
        attachments,
        color_refs: vec![
            vk::AttachmentReference::default().attachment(0).layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
        ],
        depth_ref: Some(
            vk::AttachmentReference::default()
                .attachment(1)
                .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        ),
        resolve_refs,
        dependencies: vec![dependency],
    }
}

/// framebuffer 的 attachment 顺序与 [`default_render_pass`] 对应
pub fn default_framebuffer_attachments(
    swapchain_view: vk::ImageView,
    depth_view: vk::ImageView,
    msaa_color_view: Option<vk::ImageView>,
) -> Vec<vk::ImageView> {
    match msaa_color_view {
        Some(color_view) => vec![color_view, depth_view, swapchain_view],
        None => vec![swapchain_view, depth_view],
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    #[test]
    fn test_default_render_pass_without_msaa() {
        let desc = default_render_pass(vk::Format::B8G8R8A8_UNORM, vk::Format::D32_SFLOAT_S8_UINT, vk::SampleCountFlags::TYPE_1);
        assert_eq!(desc.attachments.len(), 2);
        assert_eq!(desc.attachments[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(desc.attachments[1].initial_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        assert!(desc.resolve_refs.is_empty());
        assert_eq!(desc.dependencies[0].src_subpass, vk::SUBPASS_EXTERNAL);
    }

    #[test]
    fn test_default_render_pass_with_msaa() {
        let desc = default_render_pass(vk::Format::B8G8R8A8_UNORM, vk::Format::D32_SFLOAT_S8_UINT, vk::SampleCountFlags::TYPE_4);
        assert_eq!(desc.attachments.len(), 3);
        assert_eq!(desc.attachments[0].samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(desc.attachments[0].final_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(desc.attachments[2].samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(desc.attachments[2].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(desc.resolve_refs[0].attachment, 2);
    }

    #[test]
    fn test_msaa_change_breaks_compatibility() {
        let formats = (vk::Format::B8G8R8A8_UNORM, vk::Format::D24_UNORM_S8_UINT);
        let single = default_render_pass(formats.0, formats.1, vk::SampleCountFlags::TYPE_1).compat();
        let single_again = default_render_pass(formats.0, formats.1, vk::SampleCountFlags::TYPE_1).compat();
        let msaa = default_render_pass(formats.0, formats.1, vk::SampleCountFlags::TYPE_4).compat();

        assert!(single.is_compatible_with(&single_again));
        assert!(!single.is_compatible_with(&msaa));
        assert!(msaa.is_compatible_with(&msaa));
    }

    #[test]
    fn test_framebuffer_attachment_order() {
        let swap = vk::ImageView::from_raw(1);
        let depth = vk::ImageView::from_raw(2);
        let color = vk::ImageView::from_raw(3);
        assert_eq!(default_framebuffer_attachments(swap, depth, None), vec![swap, depth]);
        assert_eq!(default_framebuffer_attachments(swap, depth, Some(color)), vec![color, depth, swap]);
    }
}
