use std::ffi::c_char;

use ash::vk;
use kiln_gfx::error::{GfxError, GfxResult};

/// 后端所依赖的窗口系统
///
/// 由宿主程序实现：提供 Vulkan 的加载、surface 的创建以及当前 drawable 的尺寸。
/// surface lost 之后后端会再次调用 [`PlatformAdapter::create_surface`]。
pub trait PlatformAdapter {
    /// 加载 Vulkan loader；默认从系统动态库中加载
    fn load_entry(&self) -> GfxResult<ash::Entry> {
        unsafe { ash::Entry::load() }.map_err(|e| GfxError::EntryLoad(e.to_string()))
    }

    /// 创建 surface 所需的 instance extensions
    fn required_instance_extensions(&self) -> GfxResult<Vec<*const c_char>>;

    fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> GfxResult<vk::SurfaceKHR>;

    /// 窗口当前可绘制区域的像素尺寸，最小化时可能为 0
    fn drawable_size(&self) -> vk::Extent2D;
}
