//! Render pass 兼容性
//!
//! 创建 render pass 时保存一份扁平化的深拷贝（[`RenderPassCompat`]），之后可以与其他
//! render pass 的拷贝比较，决定缓存的 pipeline 能否继续使用。
//!
//! 兼容的条件：
//! - 两者都没有 pNext 链（任意一方有 pNext 都视为不兼容，即使和自己比较）
//! - flags 相同
//! - subpass 数量相同且逐个兼容
//! - dependency 数量相同且逐个相等
//!
//! 两个 attachment reference 兼容：都是 unused，或者指向的 attachment 的 format 和 sample count 相同。
//! layout、load/store op 不参与比较。
//!
//! 只有一个 subpass 时 resolve attachment 可以放宽比较，这里没有处理，结果会比实际更严格。

use ash::vk;

/// arena 中的一段
#[derive(Debug, Clone, Copy, Default)]
struct Span {
    start: usize,
    len: usize,
}

impl Span {
    #[inline]
    fn of<'a, T>(&self, arena: &'a [T]) -> &'a [T] {
        &arena[self.start..self.start + self.len]
    }
}

#[derive(Debug, Clone, Copy)]
struct SubpassSnapshot {
    flags: vk::SubpassDescriptionFlags,
    bind_point: vk::PipelineBindPoint,
    inputs: Span,
    colors: Span,
    resolves: Span,
    depth_stencil: Option<usize>,
    preserves: Span,
}

/// render pass 描述的快照
///
/// 所有 subpass 的 attachment reference 存放在同一个 arena 中，subpass 只记录区间
#[derive(Debug)]
pub struct RenderPassCompat {
    has_next: bool,
    flags: vk::RenderPassCreateFlags,

    attachments: Vec<vk::AttachmentDescription>,
    references: Vec<vk::AttachmentReference>,
    preserves: Vec<u32>,
    subpasses: Vec<SubpassSnapshot>,
    dependencies: Vec<vk::SubpassDependency>,
}

/// # Safety
/// `ptr` 为 null 时 `count` 被忽略；否则必须指向 `count` 个有效元素
unsafe fn raw_slice<'a, T>(ptr: *const T, count: u32) -> &'a [T] {
    if ptr.is_null() || count == 0 { &[] } else { unsafe { std::slice::from_raw_parts(ptr, count as usize) } }
}

// new & init
impl RenderPassCompat {
    /// # Safety
    /// `info` 中所有的指针与数量必须有效，通过 ash 的 builder 方法构造的 create info 满足这一点
    pub unsafe fn from_create_info(info: &vk::RenderPassCreateInfo<'_>) -> Self {
        let attachments = unsafe { raw_slice(info.p_attachments, info.attachment_count) }.to_vec();
        let dependencies = unsafe { raw_slice(info.p_dependencies, info.dependency_count) }.to_vec();
        let subpass_descs = unsafe { raw_slice(info.p_subpasses, info.subpass_count) };

        let mut references = Vec::new();
        let mut preserves = Vec::new();
        let mut push_refs = |refs: &[vk::AttachmentReference]| {
            let span = Span {
                start: references.len(),
                len: refs.len(),
            };
            references.extend_from_slice(refs);
            span
        };

        let mut subpasses = Vec::with_capacity(subpass_descs.len());
        for desc in subpass_descs {
            let inputs = push_refs(unsafe { raw_slice(desc.p_input_attachments, desc.input_attachment_count) });
            let colors = push_refs(unsafe { raw_slice(desc.p_color_attachments, desc.color_attachment_count) });
            // resolve 数组存在时长度与 color 数组相同
            let resolves = push_refs(unsafe { raw_slice(desc.p_resolve_attachments, desc.color_attachment_count) });
            let depth_stencil = if desc.p_depth_stencil_attachment.is_null() {
                None
            } else {
                let span = push_refs(unsafe { std::slice::from_ref(&*desc.p_depth_stencil_attachment) });
                Some(span.start)
            };

            let preserve_span = Span {
                start: preserves.len(),
                len: desc.preserve_attachment_count as usize,
            };
            preserves.extend_from_slice(unsafe {
                raw_slice(desc.p_preserve_attachments, desc.preserve_attachment_count)
            });

            subpasses.push(SubpassSnapshot {
                flags: desc.flags,
                bind_point: desc.pipeline_bind_point,
                inputs,
                colors,
                resolves,
                depth_stencil,
                preserves: preserve_span,
            });
        }

        Self {
            has_next: !info.p_next.is_null(),
            flags: info.flags,
            attachments,
            references,
            preserves,
            subpasses,
            dependencies,
        }
    }
}

// getters
impl RenderPassCompat {
    #[inline]
    pub fn attachment_count(&self) -> usize {
        self.attachments.len()
    }

    #[inline]
    pub fn subpass_count(&self) -> usize {
        self.subpasses.len()
    }

    #[inline]
    pub fn attachments(&self) -> &[vk::AttachmentDescription] {
        &self.attachments
    }
}

// 兼容性判断
impl RenderPassCompat {
    pub fn is_compatible_with(&self, other: &RenderPassCompat) -> bool {
        if self.has_next || other.has_next {
            return false;
        }
        if self.flags != other.flags {
            return false;
        }
        if self.subpasses.len() != other.subpasses.len() {
            return false;
        }
        if !self.subpasses.iter().zip(&other.subpasses).all(|(a, b)| self.subpass_compatible(a, other, b)) {
            return false;
        }

        self.dependencies.len() == other.dependencies.len()
            && self.dependencies.iter().zip(&other.dependencies).all(|(a, b)| dependency_eq(a, b))
    }

    fn subpass_compatible(&self, a: &SubpassSnapshot, other: &RenderPassCompat, b: &SubpassSnapshot) -> bool {
        if a.bind_point != b.bind_point || a.flags != b.flags {
            return false;
        }

        let refs_ok = |span_a: Span, span_b: Span| {
            self.references_compatible(span_a.of(&self.references), other, span_b.of(&other.references))
        };
        if !refs_ok(a.inputs, b.inputs) || !refs_ok(a.colors, b.colors) || !refs_ok(a.resolves, b.resolves) {
            return false;
        }

        let depth_a = a.depth_stencil.map(|idx| &self.references[idx]);
        let depth_b = b.depth_stencil.map(|idx| &other.references[idx]);
        if !self.reference_compatible(depth_a, other, depth_b) {
            return false;
        }

        a.preserves.of(&self.preserves) == b.preserves.of(&other.preserves)
    }

    /// 按位置比较，较短的一方缺少的部分视为 unused
    fn references_compatible(
        &self,
        a: &[vk::AttachmentReference],
        other: &RenderPassCompat,
        b: &[vk::AttachmentReference],
    ) -> bool {
        (0..a.len().max(b.len())).all(|i| self.reference_compatible(a.get(i), other, b.get(i)))
    }

    fn reference_compatible(
        &self,
        a: Option<&vk::AttachmentReference>,
        other: &RenderPassCompat,
        b: Option<&vk::AttachmentReference>,
    ) -> bool {
        match (self.resolve(a), other.resolve(b)) {
            (None, None) => true,
            (Some(a), Some(b)) => a.format == b.format && a.samples == b.samples,
            _ => false,
        }
    }

    /// reference 指向的 attachment；unused 返回 None
    fn resolve(&self, reference: Option<&vk::AttachmentReference>) -> Option<&vk::AttachmentDescription> {
        let reference = reference?;
        if reference.attachment == vk::ATTACHMENT_UNUSED {
            return None;
        }
        let idx = reference.attachment as usize;
        assert!(
            idx < self.attachments.len(),
            "attachment reference {} out of bounds ({} attachments)",
            idx,
            self.attachments.len()
        );
        Some(&self.attachments[idx])
    }
}

fn dependency_eq(a: &vk::SubpassDependency, b: &vk::SubpassDependency) -> bool {
    a.src_subpass == b.src_subpass
        && a.dst_subpass == b.dst_subpass
        && a.src_stage_mask == b.src_stage_mask
        && a.dst_stage_mask == b.dst_stage_mask
        && a.src_access_mask == b.src_access_mask
        && a.dst_access_mask == b.dst_access_mask
        && a.dependency_flags == b.dependency_flags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(format: vk::Format, samples: vk::SampleCountFlags) -> vk::AttachmentDescription {
        vk::AttachmentDescription::default()
            .format(format)
            .samples(samples)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
    }

    fn color_ref(idx: u32) -> vk::AttachmentReference {
        vk::AttachmentReference::default().attachment(idx).layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
    }

    fn depth_ref(idx: u32) -> vk::AttachmentReference {
        vk::AttachmentReference::default().attachment(idx).layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
    }

    fn external_dependency() -> vk::SubpassDependency {
        vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
    }

    /// 单 subpass：color + depth
    fn snapshot(
        attachments: &[vk::AttachmentDescription],
        colors: &[vk::AttachmentReference],
        depth: Option<vk::AttachmentReference>,
        preserves: &[u32],
    ) -> RenderPassCompat {
        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(colors)
            .preserve_attachments(preserves);
        if let Some(depth) = depth.as_ref() {
            subpass = subpass.depth_stencil_attachment(depth);
        }
        let dependencies = [external_dependency()];
        let info = vk::RenderPassCreateInfo::default()
            .attachments(attachments)
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(&dependencies);
        unsafe { RenderPassCompat::from_create_info(&info) }
    }

    fn scenario(samples: vk::SampleCountFlags, load_op: vk::AttachmentLoadOp) -> RenderPassCompat {
        let mut color = attachment(vk::Format::B8G8R8A8_UNORM, samples);
        color.load_op = load_op;
        let depth = attachment(vk::Format::D32_SFLOAT_S8_UINT, samples);
        snapshot(&[color, depth], &[color_ref(0)], Some(depth_ref(1)), &[])
    }

    #[test]
    fn test_reflexive() {
        let a = scenario(vk::SampleCountFlags::TYPE_1, vk::AttachmentLoadOp::CLEAR);
        assert!(a.is_compatible_with(&a));
        assert_eq!(a.subpass_count(), 1);
        assert_eq!(a.attachment_count(), 2);
    }

    #[test]
    fn test_scenario_load_op_and_samples() {
        let a = scenario(vk::SampleCountFlags::TYPE_1, vk::AttachmentLoadOp::CLEAR);
        let b = scenario(vk::SampleCountFlags::TYPE_1, vk::AttachmentLoadOp::DONT_CARE);
        let c = scenario(vk::SampleCountFlags::TYPE_4, vk::AttachmentLoadOp::CLEAR);

        assert!(a.is_compatible_with(&b));
        assert!(b.is_compatible_with(&a));
        assert!(!a.is_compatible_with(&c));
        assert!(!c.is_compatible_with(&b));
    }

    #[test]
    fn test_layouts_ignored() {
        let color = attachment(vk::Format::R8G8B8A8_UNORM, vk::SampleCountFlags::TYPE_1);
        let mut other_color = color;
        other_color.final_layout = vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
        other_color.store_op = vk::AttachmentStoreOp::DONT_CARE;
        let general_ref = vk::AttachmentReference::default().attachment(0).layout(vk::ImageLayout::GENERAL);

        let a = snapshot(&[color], &[color_ref(0)], None, &[]);
        let b = snapshot(&[other_color], &[general_ref], None, &[]);
        assert!(a.is_compatible_with(&b));
    }

    #[test]
    fn test_all_layouts_and_ops_ignored_together() {
        let color = attachment(vk::Format::B8G8R8A8_UNORM, vk::SampleCountFlags::TYPE_1);
        let mut other_color = color;
        other_color.initial_layout = vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL;
        other_color.final_layout = vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL;
        other_color.load_op = vk::AttachmentLoadOp::LOAD;
        other_color.store_op = vk::AttachmentStoreOp::DONT_CARE;
        other_color.stencil_load_op = vk::AttachmentLoadOp::CLEAR;
        other_color.stencil_store_op = vk::AttachmentStoreOp::STORE;

        let a = snapshot(&[color], &[color_ref(0)], None, &[]);
        let b = snapshot(&[other_color], &[color_ref(0)], None, &[]);
        assert!(a.is_compatible_with(&b));
        assert!(b.is_compatible_with(&a));
    }

    #[test]
    fn test_format_mismatch() {
        let a = snapshot(&[attachment(vk::Format::R8G8B8A8_UNORM, vk::SampleCountFlags::TYPE_1)], &[color_ref(0)], None, &[]);
        let b = snapshot(&[attachment(vk::Format::B8G8R8A8_UNORM, vk::SampleCountFlags::TYPE_1)], &[color_ref(0)], None, &[]);
        assert!(!a.is_compatible_with(&b));
    }

    #[test]
    fn test_trailing_unused_references() {
        let color = attachment(vk::Format::R8G8B8A8_UNORM, vk::SampleCountFlags::TYPE_1);
        let a = snapshot(&[color], &[color_ref(0)], None, &[]);
        let b = snapshot(&[color], &[color_ref(0), color_ref(vk::ATTACHMENT_UNUSED)], None, &[]);
        let c = snapshot(&[color, color], &[color_ref(0), color_ref(1)], None, &[]);

        assert!(a.is_compatible_with(&b));
        assert!(b.is_compatible_with(&a));
        assert!(!a.is_compatible_with(&c));
    }

    #[test]
    fn test_missing_depth() {
        let color = attachment(vk::Format::R8G8B8A8_UNORM, vk::SampleCountFlags::TYPE_1);
        let depth = attachment(vk::Format::D24_UNORM_S8_UINT, vk::SampleCountFlags::TYPE_1);
        let a = snapshot(&[color, depth], &[color_ref(0)], Some(depth_ref(1)), &[]);
        let b = snapshot(&[color, depth], &[color_ref(0)], None, &[]);
        let c = snapshot(&[color, depth], &[color_ref(0)], Some(depth_ref(vk::ATTACHMENT_UNUSED)), &[]);

        assert!(!a.is_compatible_with(&b));
        assert!(b.is_compatible_with(&c));
    }

    #[test]
    fn test_preserve_must_match() {
        let color = attachment(vk::Format::R8G8B8A8_UNORM, vk::SampleCountFlags::TYPE_1);
        let a = snapshot(&[color, color], &[color_ref(0)], None, &[1]);
        let b = snapshot(&[color, color], &[color_ref(0)], None, &[]);
        assert!(a.is_compatible_with(&a));
        assert!(!a.is_compatible_with(&b));
    }

    #[test]
    fn test_dependency_must_match() {
        let color = attachment(vk::Format::R8G8B8A8_UNORM, vk::SampleCountFlags::TYPE_1);
        let refs = [color_ref(0)];
        let subpass =
            vk::SubpassDescription::default().pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS).color_attachments(&refs);
        let dependencies = [external_dependency().dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_READ)];
        let info = vk::RenderPassCreateInfo::default()
            .attachments(std::slice::from_ref(&color))
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(&dependencies);
        let a = unsafe { RenderPassCompat::from_create_info(&info) };
        let b = snapshot(&[color], &refs, None, &[]);

        assert!(!a.is_compatible_with(&b));
    }

    #[test]
    fn test_p_next_is_never_compatible() {
        let color = attachment(vk::Format::R8G8B8A8_UNORM, vk::SampleCountFlags::TYPE_1);
        let refs = [color_ref(0)];
        let subpass =
            vk::SubpassDescription::default().pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS).color_attachments(&refs);
        let view_masks = [0b1_u32];
        let mut multiview = vk::RenderPassMultiviewCreateInfo::default().view_masks(&view_masks);
        let info = vk::RenderPassCreateInfo::default()
            .attachments(std::slice::from_ref(&color))
            .subpasses(std::slice::from_ref(&subpass))
            .push_next(&mut multiview);
        let a = unsafe { RenderPassCompat::from_create_info(&info) };

        assert!(!a.is_compatible_with(&a));
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_out_of_bounds_reference() {
        let color = attachment(vk::Format::R8G8B8A8_UNORM, vk::SampleCountFlags::TYPE_1);
        let a = snapshot(&[color], &[color_ref(3)], None, &[]);
        a.is_compatible_with(&a);
    }
}
