use std::hash::Hash;
use std::rc::Rc;

use ash::vk;

use crate::error::VkResultExt;
use crate::foundation::device::GfxDevice;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct GfxSamplerDesc {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub address_mode: vk::SamplerAddressMode,
    pub max_anisotropy: u32,
    pub mipmap_mode: vk::SamplerMipmapMode,
    /// 整数的 max lod，`None` 表示不限制
    pub max_lod: Option<u32>,
}
impl Default for GfxSamplerDesc {
    fn default() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            address_mode: vk::SamplerAddressMode::REPEAT,
            max_anisotropy: 0,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            max_lod: None,
        }
    }
}

pub struct GfxSampler {
    handle: vk::Sampler,
    device: Rc<GfxDevice>,
}
// new & init
impl GfxSampler {
    pub fn new(device: Rc<GfxDevice>, desc: &GfxSamplerDesc, name: impl AsRef<str>) -> Self {
        let mut create_info = vk::SamplerCreateInfo::default()
            .mag_filter(desc.mag_filter)
            .min_filter(desc.min_filter)
            .address_mode_u(desc.address_mode)
            .address_mode_v(desc.address_mode)
            .address_mode_w(desc.address_mode)
            .mipmap_mode(desc.mipmap_mode)
            .min_lod(0.0)
            .max_lod(desc.max_lod.map_or(vk::LOD_CLAMP_NONE, |lod| lod as f32))
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK);

        create_info = if desc.max_anisotropy > 0 {
            create_info.anisotropy_enable(true).max_anisotropy(desc.max_anisotropy as f32)
        } else {
            create_info.anisotropy_enable(false)
        };

        let handle = unsafe { device.create_sampler(&create_info, None).or_fatal("vkCreateSampler") };
        device.set_object_debug_name(handle, name.as_ref());

        Self { handle, device }
    }

    pub fn destroy(self) {
        unsafe {
            self.device.destroy_sampler(self.handle, None);
        }
    }
}
// getters
impl GfxSampler {
    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.handle
    }
}
