use std::ffi::CStr;
use std::rc::Rc;

use ash::vk;

use crate::error::VkResultExt;
use crate::foundation::debug_messenger::DebugType;
use crate::foundation::device::GfxDevice;

/// 由 SPIR-V 创建的 shader module，入口固定为 `main`
pub struct GfxShaderModule {
    handle: vk::ShaderModule,
    stage: vk::ShaderStageFlags,
    device: Rc<GfxDevice>,
}

impl DebugType for GfxShaderModule {
    fn debug_type_name() -> &'static str {
        "GfxShaderModule"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

impl GfxShaderModule {
    pub const ENTRY_POINT: &'static CStr = c"main";

    pub fn new(device: Rc<GfxDevice>, spirv: &[u32], stage: vk::ShaderStageFlags, debug_name: &str) -> Self {
        let create_info = vk::ShaderModuleCreateInfo::default().code(spirv);
        let handle = unsafe { device.create_shader_module(&create_info, None).or_fatal("vkCreateShaderModule") };

        let module = Self { handle, stage, device };
        module.device.set_debug_name(&module, debug_name);
        module
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }

    #[inline]
    pub fn stage_info(&self) -> vk::PipelineShaderStageCreateInfo<'static> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage)
            .module(self.handle)
            .name(Self::ENTRY_POINT)
    }

    pub fn destroy(self) {
        unsafe {
            self.device.destroy_shader_module(self.handle, None);
        }
    }
}
