use ash::vk;

use crate::error::{GfxError, GfxResult};

/// 按顺序挑选第一个在 `tiling` 下支持 `features` 的格式
///
/// `properties_of` 负责查询格式属性，便于脱离设备测试
pub fn pick_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    properties_of: impl Fn(vk::Format) -> vk::FormatProperties,
) -> Option<vk::Format> {
    candidates.iter().copied().find(|format| {
        let props = properties_of(*format);
        match tiling {
            vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
            vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
            _ => false,
        }
    })
}

pub fn find_supported_format(
    instance: &ash::Instance,
    pdevice: vk::PhysicalDevice,
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
) -> Option<vk::Format> {
    pick_format(candidates, tiling, features, |format| unsafe {
        instance.get_physical_device_format_properties(pdevice, format)
    })
}

/// 找不到可用的 depth-stencil 格式时返回错误，由调用方视为致命错误
pub fn find_depth_format(
    instance: &ash::Instance,
    pdevice: vk::PhysicalDevice,
    candidates: &[vk::Format],
) -> GfxResult<vk::Format> {
    find_supported_format(
        instance,
        pdevice,
        candidates,
        vk::ImageTiling::OPTIMAL,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
    )
    .ok_or_else(|| GfxError::NoSupportedDepthFormat(candidates.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_properties(format: vk::Format) -> vk::FormatProperties {
        match format {
            vk::Format::D24_UNORM_S8_UINT => vk::FormatProperties {
                optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            },
            vk::Format::D32_SFLOAT_S8_UINT => vk::FormatProperties {
                linear_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            },
            _ => vk::FormatProperties::default(),
        }
    }

    #[test]
    fn test_pick_first_supported() {
        let candidates = [vk::Format::D32_SFLOAT_S8_UINT, vk::Format::D24_UNORM_S8_UINT];
        let picked = pick_format(
            &candidates,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            fake_properties,
        );
        assert_eq!(picked, Some(vk::Format::D24_UNORM_S8_UINT));

        let picked = pick_format(
            &candidates,
            vk::ImageTiling::LINEAR,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            fake_properties,
        );
        assert_eq!(picked, Some(vk::Format::D32_SFLOAT_S8_UINT));
    }

    #[test]
    fn test_pick_none() {
        let picked = pick_format(
            &[vk::Format::D16_UNORM],
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            fake_properties,
        );
        assert_eq!(picked, None);
    }
}
