//! 交换链参数的选择：surface format、present mode、extent、image count
//!
//! 都是纯函数，输入为 surface 报告的能力

use ash::vk;

/// 按优先级选择 surface format
///
/// 1. 只有一个 `UNDEFINED`：表示没有偏好，使用优先级列表的第一个
/// 2. format 和 color space 都匹配
/// 3. 只有 format 匹配
/// 4. surface 报告的第一个
pub fn choose_surface_format(
    available: &[vk::SurfaceFormatKHR],
    desired: &[vk::SurfaceFormatKHR],
) -> Option<vk::SurfaceFormatKHR> {
    if available.len() == 1 && available[0].format == vk::Format::UNDEFINED {
        return desired.first().copied();
    }

    desired
        .iter()
        .find_map(|want| {
            available.iter().find(|have| have.format == want.format && have.color_space == want.color_space)
        })
        .or_else(|| {
            desired.iter().find_map(|want| {
                let found = available.iter().find(|have| have.format == want.format)?;
                log::info!(
                    "desired format {:?} + {:?} is not supported, use color space {:?}",
                    want.format,
                    want.color_space,
                    found.color_space
                );
                Some(found)
            })
        })
        .or_else(|| {
            let first = available.first()?;
            log::info!("desired formats are not supported, use {:?} - {:?}", first.format, first.color_space);
            Some(first)
        })
        .copied()
}

/// 第一个 surface 支持的候选 present mode
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    candidates: &[vk::PresentModeKHR],
) -> Option<vk::PresentModeKHR> {
    candidates.iter().copied().find(|mode| available.contains(mode))
}

/// 将窗口的 drawable 尺寸限制在 `[min_image_extent, max_image_extent]` 中
///
/// 部分驱动在窗口最小化时会报告 0 的 min/max extent，此时使用 `max(drawable, 1)`
pub fn calculate_extent(caps: &vk::SurfaceCapabilitiesKHR, drawable: vk::Extent2D) -> vk::Extent2D {
    let clamp = |value: u32, min: u32, max: u32| value.max(min).min(max);

    let mut extent = vk::Extent2D {
        width: clamp(drawable.width, caps.min_image_extent.width, caps.max_image_extent.width),
        height: clamp(drawable.height, caps.min_image_extent.height, caps.max_image_extent.height),
    };
    if extent.width == 0 {
        extent.width = drawable.width.max(1);
    }
    if extent.height == 0 {
        extent.height = drawable.height.max(1);
    }
    extent
}

/// `min_image_count + 1`，`max_image_count` 为 0 表示不限制
pub fn desired_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = caps.min_image_count + 1;
    if caps.max_image_count > 0 { count.min(caps.max_image_count) } else { count }
}

#[cfg(test)]
mod tests {
    use super::*;

    const B8G8R8A8: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_UNORM,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };
    const R8G8B8A8: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
        format: vk::Format::R8G8B8A8_UNORM,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };
    const DESIRED: [vk::SurfaceFormatKHR; 2] = [B8G8R8A8, R8G8B8A8];

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    #[test]
    fn test_undefined_means_anything() {
        let available = [format(vk::Format::UNDEFINED, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        assert_eq!(choose_surface_format(&available, &DESIRED).unwrap().format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn test_format_priority() {
        let available = [format(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::SRGB_NONLINEAR), R8G8B8A8, B8G8R8A8];
        assert_eq!(choose_surface_format(&available, &DESIRED).unwrap().format, vk::Format::B8G8R8A8_UNORM);

        let available = [format(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::SRGB_NONLINEAR), R8G8B8A8];
        assert_eq!(choose_surface_format(&available, &DESIRED).unwrap().format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_format_with_other_color_space() {
        let hdr = format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT);
        let available = [format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::SRGB_NONLINEAR), hdr];
        let chosen = choose_surface_format(&available, &DESIRED).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT);
    }

    #[test]
    fn test_format_fallback_to_first() {
        let first = format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::SRGB_NONLINEAR);
        assert_eq!(choose_surface_format(&[first], &DESIRED).unwrap().format, first.format);
        assert!(choose_surface_format(&[], &DESIRED).is_none());
    }

    #[test]
    fn test_present_mode_candidates() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&available, &[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX]),
            Some(vk::PresentModeKHR::MAILBOX)
        );
        assert_eq!(choose_present_mode(&available, &[vk::PresentModeKHR::FIFO_RELAXED]), None);
    }

    #[test]
    fn test_extent_clamp() {
        let caps = vk::SurfaceCapabilitiesKHR {
            min_image_extent: vk::Extent2D { width: 16, height: 16 },
            max_image_extent: vk::Extent2D { width: 1920, height: 1080 },
            ..Default::default()
        };
        let extent = calculate_extent(&caps, vk::Extent2D { width: 4000, height: 8 });
        assert_eq!((extent.width, extent.height), (1920, 16));
    }

    #[test]
    fn test_extent_zero_caps() {
        // 最小化时部分驱动报告 0
        let caps = vk::SurfaceCapabilitiesKHR::default();
        let extent = calculate_extent(&caps, vk::Extent2D { width: 800, height: 0 });
        assert_eq!((extent.width, extent.height), (800, 1));
    }

    #[test]
    fn test_image_count() {
        let mut caps = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(desired_image_count(&caps), 3);
        caps.max_image_count = 2;
        assert_eq!(desired_image_count(&caps), 2);
        caps.max_image_count = 8;
        assert_eq!(desired_image_count(&caps), 3);
    }
}
