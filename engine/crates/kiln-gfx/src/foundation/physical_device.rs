use ash::vk;

use crate::error::{GfxError, GfxResult, VkResultExt};

/// 选中的物理设备，以及 graphics / present 所使用的 queue family
pub struct GfxPhysicalDevice {
    pub(crate) handle: vk::PhysicalDevice,
    pub(crate) properties: vk::PhysicalDeviceProperties,
    pub(crate) features: vk::PhysicalDeviceFeatures,

    graphics_queue_family: u32,
    present_queue_family: u32,
}

// new & init
impl GfxPhysicalDevice {
    /// 选择第一个同时支持 graphics 以及在 `surface` 上 present 的设备，优先独显
    pub fn select(
        instance: &ash::Instance,
        surface_pf: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> GfxResult<Self> {
        let pdevices = unsafe { instance.enumerate_physical_devices().vk_context("vkEnumeratePhysicalDevices")? };

        let mut candidates = pdevices
            .into_iter()
            .filter_map(|pdevice| {
                let (graphics, present) = Self::find_queue_families(instance, surface_pf, surface, pdevice)?;
                let properties = unsafe { instance.get_physical_device_properties(pdevice) };
                Some((pdevice, properties, graphics, present))
            })
            .collect::<Vec<_>>();
        candidates.sort_by_key(|(_, props, _, _)| props.device_type != vk::PhysicalDeviceType::DISCRETE_GPU);

        let (handle, properties, graphics_queue_family, present_queue_family) =
            candidates.into_iter().next().ok_or(GfxError::NoSuitablePhysicalDevice)?;
        let features = unsafe { instance.get_physical_device_features(handle) };

        let pdevice = Self {
            handle,
            properties,
            features,
            graphics_queue_family,
            present_queue_family,
        };
        log::info!(
            "physical device: {:?} ({:?}), api {}.{}.{}, graphics family {}, present family {}",
            pdevice.device_name(),
            properties.device_type,
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version),
            graphics_queue_family,
            present_queue_family,
        );
        Ok(pdevice)
    }

    /// graphics 优先与 present 使用同一个 family
    pub fn find_queue_families(
        instance: &ash::Instance,
        surface_pf: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        pdevice: vk::PhysicalDevice,
    ) -> Option<(u32, u32)> {
        let families = unsafe { instance.get_physical_device_queue_family_properties(pdevice) };
        let supports_present = |idx: u32| unsafe {
            surface_pf.get_physical_device_surface_support(pdevice, idx, surface).unwrap_or(false)
        };

        let graphics_families = families
            .iter()
            .enumerate()
            .filter(|(_, props)| props.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|(idx, _)| idx as u32)
            .collect::<Vec<_>>();

        if let Some(both) = graphics_families.iter().copied().find(|idx| supports_present(*idx)) {
            return Some((both, both));
        }
        let graphics = graphics_families.first().copied()?;
        let present = (0..families.len() as u32).find(|idx| supports_present(*idx))?;
        Some((graphics, present))
    }
}

// getters
impl GfxPhysicalDevice {
    #[inline]
    pub fn vk_handle(&self) -> vk::PhysicalDevice {
        self.handle
    }

    #[inline]
    pub fn graphics_queue_family(&self) -> u32 {
        self.graphics_queue_family
    }

    #[inline]
    pub fn present_queue_family(&self) -> u32 {
        self.present_queue_family
    }

    #[inline]
    pub fn features(&self) -> &vk::PhysicalDeviceFeatures {
        &self.features
    }

    #[inline]
    pub fn limits(&self) -> &vk::PhysicalDeviceLimits {
        &self.properties.limits
    }

    pub fn device_name(&self) -> String {
        self.properties.device_name_as_c_str().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default()
    }

    /// color 和 depth 同时支持的最大采样数
    pub fn max_usable_sample_count(&self) -> vk::SampleCountFlags {
        max_sample_count(
            self.limits().framebuffer_color_sample_counts & self.limits().framebuffer_depth_sample_counts,
        )
    }
}

/// 将请求的采样数限制在设备支持的范围内（只会向下取）
pub fn clamp_sample_count(requested: u32, supported: vk::SampleCountFlags) -> vk::SampleCountFlags {
    const ORDER: [vk::SampleCountFlags; 7] = [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
        vk::SampleCountFlags::TYPE_1,
    ];
    ORDER
        .into_iter()
        .find(|count| count.as_raw() <= requested.max(1) && supported.contains(*count))
        .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

fn max_sample_count(supported: vk::SampleCountFlags) -> vk::SampleCountFlags {
    clamp_sample_count(u32::MAX, supported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_sample_count() {
        let supported = vk::SampleCountFlags::TYPE_1 | vk::SampleCountFlags::TYPE_2 | vk::SampleCountFlags::TYPE_4;
        assert_eq!(clamp_sample_count(8, supported), vk::SampleCountFlags::TYPE_4);
        assert_eq!(clamp_sample_count(4, supported), vk::SampleCountFlags::TYPE_4);
        assert_eq!(clamp_sample_count(3, supported), vk::SampleCountFlags::TYPE_2);
        assert_eq!(clamp_sample_count(0, supported), vk::SampleCountFlags::TYPE_1);
        assert_eq!(max_sample_count(supported), vk::SampleCountFlags::TYPE_4);
    }
}
