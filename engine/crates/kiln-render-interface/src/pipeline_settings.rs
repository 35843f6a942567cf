use ash::vk;

/// 同时处于 GPU 执行中的帧数上限
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// 交换链重建过程中允许嵌套的错误处理层数
pub const MAX_ERROR_HANDLING_DEPTH: usize = 10;

/// 渲染器默认配置
pub struct DefaultRendererSettings;
impl DefaultRendererSettings {
    /// 按优先级排列的 surface format
    pub const SURFACE_FORMAT_CANDIDATES: &'static [vk::SurfaceFormatKHR] = &[
        vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        },
        vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        },
    ];

    pub const DEPTH_FORMAT_CANDIDATES: &'static [vk::Format] =
        &[vk::Format::D32_SFLOAT_S8_UINT, vk::Format::D24_UNORM_S8_UINT];

    /// 每帧开始时的清屏颜色
    pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 0.0];
}

/// 每帧的块分配器、描述符池的默认大小
pub struct FrameResourceSettings;
impl FrameResourceSettings {
    pub const STAGING_BLOCK_SIZE: vk::DeviceSize = 1024 * 1024;
    pub const STREAMED_VERTEX_BLOCK_SIZE: vk::DeviceSize = 128 * 1024;
    pub const UNIFORM_BLOCK_SIZE: vk::DeviceSize = 1024 * 1024;

    /// 流式顶点数据的对齐
    pub const STREAMED_VERTEX_ALIGN: vk::DeviceSize = 16;
    /// staging 数据的对齐
    pub const STAGING_ALIGN: vk::DeviceSize = 2;

    pub const DESCRIPTOR_POOL_MAX_SETS: u32 = 10_000;
    pub const DESCRIPTOR_POOL_MAX_DESCRIPTORS: u32 = 10_000;
}

/// 交换链尺寸与窗口不一致时，跳帧循环的最高频率
pub const SKIP_FRAME_RATE_CAP_HZ: u32 = 120;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_sizes() {
        assert_eq!(FrameResourceSettings::STAGING_BLOCK_SIZE, 1 << 20);
        assert_eq!(FrameResourceSettings::STREAMED_VERTEX_BLOCK_SIZE, 1 << 17);
        assert_eq!(DefaultRendererSettings::SURFACE_FORMAT_CANDIDATES[0].format, vk::Format::B8G8R8A8_UNORM);
    }
}
