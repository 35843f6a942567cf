use std::rc::Rc;

use ash::vk;

use crate::error::VkResultExt;
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::GfxDevice;
use crate::render_pass::compat::RenderPassCompat;
use crate::render_pass::description::RenderPassDescription;

/// render pass 以及创建时记录的兼容性快照
pub struct GfxRenderPass {
    handle: vk::RenderPass,
    compat: Rc<RenderPassCompat>,
    device: Rc<GfxDevice>,
}

impl DebugType for GfxRenderPass {
    fn debug_type_name() -> &'static str {
        "GfxRenderPass"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

// 创建与销毁
impl GfxRenderPass {
    pub fn new(device: Rc<GfxDevice>, desc: &RenderPassDescription, debug_name: &str) -> Self {
        let (handle, compat) = desc.with_create_info(|info| {
            let handle = unsafe { device.create_render_pass(info, None).or_fatal("vkCreateRenderPass") };
            (handle, unsafe { RenderPassCompat::from_create_info(info) })
        });

        let render_pass = Self {
            handle,
            compat: Rc::new(compat),
            device,
        };
        render_pass.device.set_debug_name(&render_pass, debug_name);
        render_pass
    }

    pub fn destroy(self) {
        unsafe {
            self.device.destroy_render_pass(self.handle, None);
        }
    }
}

// getters
impl GfxRenderPass {
    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.handle
    }

    /// 快照可以被 pipeline 缓存共享
    #[inline]
    pub fn compat(&self) -> &Rc<RenderPassCompat> {
        &self.compat
    }
}
