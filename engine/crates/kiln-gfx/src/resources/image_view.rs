use std::rc::Rc;

use ash::vk;

use crate::error::VkResultExt;
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::GfxDevice;

pub struct GfxImageView {
    handle: vk::ImageView,
    device: Rc<GfxDevice>,
}

impl DebugType for GfxImageView {
    fn debug_type_name() -> &'static str {
        "GfxImageView"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

// 创建与销毁
impl GfxImageView {
    pub fn new_2d(
        device: Rc<GfxDevice>,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
        mip_levels: u32,
        debug_name: &str,
    ) -> Self {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .base_mip_level(0)
                    .level_count(mip_levels)
                    .base_array_layer(0)
                    .layer_count(1),
            );
        let handle = unsafe { device.create_image_view(&create_info, None).or_fatal("vkCreateImageView") };

        let view = Self { handle, device };
        view.device.set_debug_name(&view, debug_name);
        view
    }

    pub fn destroy(self) {
        unsafe {
            self.device.destroy_image_view(self.handle, None);
        }
    }
}

// getters
impl GfxImageView {
    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.handle
    }
}
