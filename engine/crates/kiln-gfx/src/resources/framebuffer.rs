use std::rc::Rc;

use ash::vk;

use crate::error::VkResultExt;
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::GfxDevice;

pub struct GfxFramebuffer {
    handle: vk::Framebuffer,
    device: Rc<GfxDevice>,
}

impl DebugType for GfxFramebuffer {
    fn debug_type_name() -> &'static str {
        "GfxFramebuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

// 创建与销毁
impl GfxFramebuffer {
    pub fn new(
        device: Rc<GfxDevice>,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
        debug_name: &str,
    ) -> Self {
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        let handle = unsafe { device.create_framebuffer(&create_info, None).or_fatal("vkCreateFramebuffer") };

        let framebuffer = Self { handle, device };
        framebuffer.device.set_debug_name(&framebuffer, debug_name);
        framebuffer
    }

    pub fn destroy(self) {
        unsafe {
            self.device.destroy_framebuffer(self.handle, None);
        }
    }
}

// getters
impl GfxFramebuffer {
    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.handle
    }
}
