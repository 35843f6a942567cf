use std::rc::Rc;

use ash::vk;
use vk_mem::Alloc;

use crate::error::VkResultExt;
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::GfxDevice;
use crate::foundation::mem_allocator::GfxMemAllocator;
use crate::resources::image_view::GfxImageView;

/// Vulkan 格式相关的工具
pub struct VulkanFormatUtils;
impl VulkanFormatUtils {
    /// 纹理上传支持的格式每个像素的字节数
    pub fn pixel_size_in_bytes(format: vk::Format) -> Option<usize> {
        match format {
            vk::Format::R8_UNORM => Some(1),
            vk::Format::R8G8_UNORM => Some(2),
            vk::Format::R8G8B8A8_UNORM
            | vk::Format::R8G8B8A8_SRGB
            | vk::Format::B8G8R8A8_UNORM
            | vk::Format::B8G8R8A8_SRGB => Some(4),
            vk::Format::R16G16B16A16_SFLOAT => Some(8),
            vk::Format::R32G32B32A32_SFLOAT => Some(16),
            _ => None,
        }
    }

    pub fn is_depth_stencil(format: vk::Format) -> bool {
        matches!(
            format,
            vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D16_UNORM_S8_UINT
        )
    }

    pub fn aspect_flags(format: vk::Format) -> vk::ImageAspectFlags {
        match format {
            vk::Format::D32_SFLOAT | vk::Format::D16_UNORM => vk::ImageAspectFlags::DEPTH,
            f if Self::is_depth_stencil(f) => vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL,
            _ => vk::ImageAspectFlags::COLOR,
        }
    }
}

/// 完整 mip 链的层级数：`floor(log2(max(w, h))) + 1`
pub fn max_mip_levels(extent: vk::Extent2D) -> u32 {
    32 - extent.width.max(extent.height).max(1).leading_zeros()
}

pub fn mip_extent(extent: vk::Extent2D, level: u32) -> vk::Extent2D {
    vk::Extent2D {
        width: (extent.width >> level).max(1),
        height: (extent.height >> level).max(1),
    }
}

/// 由 vk-mem 分配的 2D image，以及它的 view
pub struct GfxImage {
    handle: vk::Image,
    allocation: vk_mem::Allocation,
    view: Option<GfxImageView>,

    extent: vk::Extent2D,
    format: vk::Format,
    samples: vk::SampleCountFlags,
    mip_levels: u32,

    device: Rc<GfxDevice>,
    allocator: Rc<GfxMemAllocator>,
}

impl DebugType for GfxImage {
    fn debug_type_name() -> &'static str {
        "GfxImage2D"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

// new & init
impl GfxImage {
    pub fn new(
        device: Rc<GfxDevice>,
        allocator: Rc<GfxMemAllocator>,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        samples: vk::SampleCountFlags,
        mip_levels: u32,
        debug_name: &str,
    ) -> Self {
        debug_assert!(mip_levels >= 1 && mip_levels <= max_mip_levels(extent), "invalid mip level count {mip_levels}");
        let image_ci = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(mip_levels)
            .array_layers(1)
            .samples(samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };
        let (handle, allocation) =
            unsafe { allocator.create_image(&image_ci, &alloc_ci).or_fatal("vmaCreateImage") };

        let view = GfxImageView::new_2d(
            device.clone(),
            handle,
            format,
            VulkanFormatUtils::aspect_flags(format),
            mip_levels,
            debug_name,
        );

        let image = Self {
            handle,
            allocation,
            view: Some(view),
            extent,
            format,
            samples,
            mip_levels,
            device,
            allocator,
        };
        image.device.set_debug_name(&image, debug_name);
        image
    }

    /// depth-stencil 或者 MSAA color 等 render target
    pub fn new_attachment(
        device: Rc<GfxDevice>,
        allocator: Rc<GfxMemAllocator>,
        extent: vk::Extent2D,
        format: vk::Format,
        samples: vk::SampleCountFlags,
        debug_name: &str,
    ) -> Self {
        let usage = if VulkanFormatUtils::is_depth_stencil(format) {
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
        } else {
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT
        };
        Self::new(device, allocator, extent, format, usage, samples, 1, debug_name)
    }

    /// 可采样、可由 buffer 上传的纹理
    pub fn new_texture(
        device: Rc<GfxDevice>,
        allocator: Rc<GfxMemAllocator>,
        extent: vk::Extent2D,
        format: vk::Format,
        mip_levels: u32,
        debug_name: &str,
    ) -> Self {
        Self::new(
            device,
            allocator,
            extent,
            format,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            vk::SampleCountFlags::TYPE_1,
            mip_levels,
            debug_name,
        )
    }
}

// getters
impl GfxImage {
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view.as_ref().map_or(vk::ImageView::null(), |v| v.handle())
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// `level` 层级的尺寸，每个维度至少为 1
    #[inline]
    pub fn level_extent(&self, level: u32) -> vk::Extent2D {
        mip_extent(self.extent, level)
    }

    #[inline]
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        VulkanFormatUtils::aspect_flags(self.format)
    }
}

// destroy
impl GfxImage {
    pub fn destroy(mut self) {
        if let Some(view) = self.view.take() {
            view.destroy();
        }
        unsafe {
            self.allocator.destroy_image(self.handle, &mut self.allocation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_flags() {
        assert_eq!(
            VulkanFormatUtils::aspect_flags(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(VulkanFormatUtils::aspect_flags(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(VulkanFormatUtils::aspect_flags(vk::Format::B8G8R8A8_UNORM), vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn test_mip_levels() {
        assert_eq!(max_mip_levels(vk::Extent2D { width: 1, height: 1 }), 1);
        assert_eq!(max_mip_levels(vk::Extent2D { width: 256, height: 256 }), 9);
        assert_eq!(max_mip_levels(vk::Extent2D { width: 300, height: 17 }), 9);

        let extent = vk::Extent2D { width: 64, height: 16 };
        assert_eq!(mip_extent(extent, 0), extent);
        assert_eq!(mip_extent(extent, 3), vk::Extent2D { width: 8, height: 2 });
        assert_eq!(mip_extent(extent, 6), vk::Extent2D { width: 1, height: 1 });
    }

    #[test]
    fn test_pixel_size() {
        assert_eq!(VulkanFormatUtils::pixel_size_in_bytes(vk::Format::R8G8B8A8_UNORM), Some(4));
        assert_eq!(VulkanFormatUtils::pixel_size_in_bytes(vk::Format::BC1_RGB_UNORM_BLOCK), None);
    }
}
