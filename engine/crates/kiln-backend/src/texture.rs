use std::rc::Rc;

use ash::vk;
use crossbeam_channel::Sender;
use itertools::Itertools;
use kiln_gfx::foundation::device::GfxDevice;
use kiln_gfx::foundation::mem_allocator::GfxMemAllocator;
use kiln_gfx::resources::deferred::Deferred;
use kiln_gfx::resources::image::{GfxImage, max_mip_levels, mip_extent};
use kiln_render_interface::pipeline_desc::PixelFormat;

use crate::frame::frame_resources::FrameResources;
use crate::frame::retirement::{DeferredImage, RetiredObject};

/// staging 中纹理数据的对齐：至少 4 个像素，并满足设备的 buffer-image 拷贝对齐
fn staging_alignment(bytes_per_pixel: usize, optimal_copy_alignment: vk::DeviceSize) -> vk::DeviceSize {
    (4 * bytes_per_pixel as vk::DeviceSize).max(optimal_copy_alignment)
}

/// 一次上传写入的区域：某个 mip 层级中的一个矩形
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRegion {
    pub level: u32,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl TextureRegion {
    pub fn whole_level(extent: vk::Extent2D, level: u32) -> Self {
        let extent = mip_extent(extent, level);
        Self {
            level,
            x: 0,
            y: 0,
            width: extent.width,
            height: extent.height,
        }
    }

    /// 下一个 mip 层级中对应的区域
    fn next_level(&self) -> Self {
        Self {
            level: self.level + 1,
            x: self.x >> 1,
            y: self.y >> 1,
            width: (self.width >> 1).max(1),
            height: (self.height >> 1).max(1),
        }
    }

    fn fits_in(&self, level_extent: vk::Extent2D) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.checked_add(self.width).is_some_and(|right| right <= level_extent.width)
            && self.y.checked_add(self.height).is_some_and(|bottom| bottom <= level_extent.height)
    }
}

/// 已经写入过的层级需要保留原有内容，从 `SHADER_READ_ONLY_OPTIMAL` 转换
fn upload_old_layout(level_initialized: bool) -> vk::ImageLayout {
    if level_initialized {
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    } else {
        vk::ImageLayout::UNDEFINED
    }
}

/// 2x2 box filter 生成下一个 mip 层级，奇数尺寸时边缘像素重复使用
///
/// 所有支持的格式每个通道都是 8 bit，按字节平均即可
pub fn downsample(pixels: &[u8], width: u32, height: u32, bytes_per_pixel: usize) -> Vec<u8> {
    assert_eq!(pixels.len(), width as usize * height as usize * bytes_per_pixel, "pixel data size mismatch");

    let out_width = (width >> 1).max(1);
    let out_height = (height >> 1).max(1);
    let texel = |x: u32, y: u32, c: usize| -> u32 {
        let x = x.min(width - 1) as usize;
        let y = y.min(height - 1) as usize;
        pixels[(y * width as usize + x) * bytes_per_pixel + c] as u32
    };

    (0..out_height)
        .cartesian_product(0..out_width)
        .flat_map(|(y, x)| {
            (0..bytes_per_pixel).map(move |c| {
                let sum = texel(2 * x, 2 * y, c)
                    + texel(2 * x + 1, 2 * y, c)
                    + texel(2 * x, 2 * y + 1, c)
                    + texel(2 * x + 1, 2 * y + 1, c);
                ((sum + 2) / 4) as u8
            })
        })
        .collect()
}

/// 2D 纹理，可以有多个 mip 层级
pub struct BackendTexture {
    image: DeferredImage,
    format: PixelFormat,
    /// 每个层级是否已经上传过数据
    initialized_levels: Vec<bool>,
}

// new & init
impl BackendTexture {
    pub fn new(
        device: Rc<GfxDevice>,
        allocator: Rc<GfxMemAllocator>,
        retired: Sender<RetiredObject>,
        extent: vk::Extent2D,
        mip_levels: u32,
        format: PixelFormat,
        name: &str,
    ) -> Self {
        assert!(extent.width > 0 && extent.height > 0, "0 width/height textures are unsupported");
        let max_levels = max_mip_levels(extent);
        assert!(
            (1..=max_levels).contains(&mip_levels),
            "{mip_levels} mip levels requested, {}x{} supports at most {max_levels}",
            extent.width,
            extent.height
        );

        let image = GfxImage::new_texture(device, allocator, extent, format.to_vk(), mip_levels, name);
        Self {
            image: Deferred::new(image, retired),
            format,
            initialized_levels: vec![false; mip_levels as usize],
        }
    }
}

// getters
impl BackendTexture {
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.image.view()
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.image.extent()
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.image.mip_levels()
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        self.format
    }
}

// update
impl BackendTexture {
    /// 在当前帧的 copy 命令中上传一个区域，完成后该层级处于 `SHADER_READ_ONLY_OPTIMAL`
    pub fn upload(
        &mut self,
        frame: &mut FrameResources,
        optimal_copy_alignment: vk::DeviceSize,
        region: TextureRegion,
        data: &[u8],
    ) {
        assert!(region.level < self.mip_levels(), "mip level {} out of range", region.level);
        assert!(region.fits_in(self.image.level_extent(region.level)), "upload region {region:?} out of bounds");

        let initialized = &mut self.initialized_levels[region.level as usize];
        let old_layout = upload_old_layout(*initialized);
        *initialized = true;

        record_image_upload(
            frame,
            &self.image,
            self.format.bytes_per_pixel(),
            optimal_copy_alignment,
            region,
            old_layout,
            data,
        );
    }

    /// 上传层级 0 的区域，并在 CPU 上逐级缩小生成其余层级
    pub fn upload_and_generate_mipmaps(
        &mut self,
        frame: &mut FrameResources,
        optimal_copy_alignment: vk::DeviceSize,
        region: TextureRegion,
        data: &[u8],
    ) {
        assert_eq!(region.level, 0, "mipmaps are generated from level 0");
        let _span = tracy_client::span!("BackendTexture::upload_and_generate_mipmaps");
        self.upload(frame, optimal_copy_alignment, region, data);

        let bytes_per_pixel = self.format.bytes_per_pixel();
        let mut region = region;
        let mut pixels = data.to_vec();
        for _ in 1..self.mip_levels() {
            pixels = downsample(&pixels, region.width, region.height, bytes_per_pixel);
            region = region.next_level();
            self.upload(frame, optimal_copy_alignment, region, &pixels);
        }
    }
}

/// 录制 `old_layout` -> TRANSFER_DST -> 拷贝 -> SHADER_READ_ONLY 的完整上传过程，只涉及 `region` 所在的层级
pub(crate) fn record_image_upload(
    frame: &mut FrameResources,
    image: &GfxImage,
    bytes_per_pixel: usize,
    optimal_copy_alignment: vk::DeviceSize,
    region: TextureRegion,
    old_layout: vk::ImageLayout,
    data: &[u8],
) {
    let expected = region.width as usize * region.height as usize * bytes_per_pixel;
    assert_eq!(data.len(), expected, "texture data size does not match {}x{}", region.width, region.height);

    let align = staging_alignment(bytes_per_pixel, optimal_copy_alignment);
    let staging = frame.staging.alloc(data.len() as vk::DeviceSize, align);
    frame.staging.write_bytes(&staging, data);

    let range = vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(region.level)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1);

    let (src_stage, src_access) = match old_layout {
        vk::ImageLayout::UNDEFINED => (vk::PipelineStageFlags::TOP_OF_PIPE, vk::AccessFlags::empty()),
        _ => (vk::PipelineStageFlags::FRAGMENT_SHADER, vk::AccessFlags::SHADER_READ),
    };
    let to_transfer = vk::ImageMemoryBarrier::default()
        .src_access_mask(src_access)
        .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .old_layout(old_layout)
        .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image.handle())
        .subresource_range(range);
    frame.cmd_copy.pipeline_barrier(
        src_stage,
        vk::PipelineStageFlags::TRANSFER,
        &[],
        &[],
        std::slice::from_ref(&to_transfer),
    );

    let copy = vk::BufferImageCopy::default()
        .buffer_offset(staging.offset)
        .buffer_row_length(region.width)
        .buffer_image_height(region.height)
        .image_subresource(
            vk::ImageSubresourceLayers::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .mip_level(region.level)
                .base_array_layer(0)
                .layer_count(1),
        )
        .image_offset(vk::Offset3D {
            x: region.x as i32,
            y: region.y as i32,
            z: 0,
        })
        .image_extent(vk::Extent3D {
            width: region.width,
            height: region.height,
            depth: 1,
        });
    frame.cmd_copy.copy_buffer_to_image(
        staging.buffer,
        image.handle(),
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        std::slice::from_ref(&copy),
    );

    let to_shader_read = vk::ImageMemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .dst_access_mask(vk::AccessFlags::SHADER_READ)
        .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image.handle())
        .subresource_range(range);
    frame.cmd_copy.pipeline_barrier(
        vk::PipelineStageFlags::TRANSFER,
        vk::PipelineStageFlags::FRAGMENT_SHADER,
        &[],
        &[],
        std::slice::from_ref(&to_shader_read),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_alignment() {
        // 4 个 RGBA8 像素
        assert_eq!(staging_alignment(4, 1), 16);
        assert_eq!(staging_alignment(1, 1), 4);
        // 设备要求更严格时使用设备的对齐
        assert_eq!(staging_alignment(4, 64), 64);
    }

    #[test]
    fn test_whole_level_region() {
        let extent = vk::Extent2D { width: 100, height: 30 };
        let region = TextureRegion::whole_level(extent, 2);
        assert_eq!((region.x, region.y, region.width, region.height), (0, 0, 25, 7));
        assert!(region.fits_in(mip_extent(extent, 2)));
    }

    #[test]
    fn test_sub_region_bounds() {
        let level = vk::Extent2D { width: 64, height: 64 };
        let inside = TextureRegion {
            level: 0,
            x: 32,
            y: 48,
            width: 32,
            height: 16,
        };
        assert!(inside.fits_in(level));
        assert!(!TextureRegion { x: 33, ..inside }.fits_in(level));
        assert!(!TextureRegion { height: 0, ..inside }.fits_in(level));
        assert!(!TextureRegion { x: u32::MAX, ..inside }.fits_in(level));
    }

    #[test]
    fn test_next_level_region() {
        let region = TextureRegion {
            level: 0,
            x: 16,
            y: 8,
            width: 3,
            height: 1,
        };
        let next = region.next_level();
        assert_eq!(next, TextureRegion { level: 1, x: 8, y: 4, width: 1, height: 1 });
    }

    #[test]
    fn test_sub_upload_keeps_previous_contents() {
        assert_eq!(upload_old_layout(false), vk::ImageLayout::UNDEFINED);
        assert_eq!(upload_old_layout(true), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_downsample_box_filter() {
        // 2x2 单通道 -> 1x1
        assert_eq!(downsample(&[0, 100, 200, 255], 2, 2, 1), vec![139]);

        // 4x2 RG8 -> 2x1，通道分别平均
        let pixels = [
            10, 0, 20, 0, 30, 200, 50, 200, //
            10, 0, 20, 0, 30, 100, 50, 100,
        ];
        assert_eq!(downsample(&pixels, 4, 2, 2), vec![15, 0, 40, 150]);
    }

    #[test]
    fn test_downsample_odd_size_clamps_edges() {
        // 3x1 -> 1x1，只使用前 2x2 窗口，超出的行重复最后一行
        assert_eq!(downsample(&[40, 80, 255], 3, 1, 1), vec![60]);
        // 1x1 保持 1x1
        assert_eq!(downsample(&[7, 8, 9, 10], 1, 1, 4), vec![7, 8, 9, 10]);
    }

    #[test]
    fn test_mip_chain_sizes() {
        let extent = vk::Extent2D { width: 8, height: 2 };
        let levels = max_mip_levels(extent);
        assert_eq!(levels, 4);

        let mut region = TextureRegion::whole_level(extent, 0);
        let mut pixels = vec![255u8; 8 * 2 * 4];
        for level in 1..levels {
            pixels = downsample(&pixels, region.width, region.height, 4);
            region = region.next_level();
            assert_eq!(region, TextureRegion::whole_level(extent, level));
            assert_eq!(pixels.len(), (region.width * region.height * 4) as usize);
            assert!(pixels.iter().all(|&p| p == 255));
        }
    }
}
