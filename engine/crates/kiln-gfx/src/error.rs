//! GFX 层的错误类型
//!
//! - [`GfxError`]：可以返回给调用者的错误
//! - [`classify`]：将 `vk::Result` 分为可恢复（交换链重建）、致命以及其他三类
//! - [`VkResultExt`]：为 `VkResult` 附加调用上下文，或者直接交给致命错误处理

use ash::vk;
use thiserror::Error;

use crate::fatal::{FatalError, handle_unrecoverable_error};

#[derive(Error, Debug)]
pub enum GfxError {
    /// Vulkan 调用失败
    #[error("{call} failed: {result:?}")]
    Vk { call: &'static str, result: vk::Result },

    #[error("presentation surface lost")]
    SurfaceLost,

    #[error("swapchain is out of date")]
    OutOfDate,

    #[error("failed to load vulkan entry: {0}")]
    EntryLoad(String),

    #[error("no physical device supports graphics + present on this surface")]
    NoSuitablePhysicalDevice,

    #[error("none of the depth-stencil formats is supported: {0:?}")]
    NoSupportedDepthFormat(Vec<vk::Format>),

    #[error("surface does not report FIFO present mode")]
    FifoUnsupported,

    #[error("queue families changed after surface recreation: graphics {old_graphics} -> {new_graphics}, present {old_present} -> {new_present}")]
    QueueFamilyMismatch {
        old_graphics: u32,
        new_graphics: u32,
        old_present: u32,
        new_present: u32,
    },

    #[error("failed to load shader `{name}`: {reason}")]
    ShaderLoad { name: String, reason: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),

    /// 窗口系统无法提供句柄
    #[error("window handle unavailable: {0}")]
    WindowHandle(#[from] raw_window_handle::HandleError),
}

pub type GfxResult<T> = Result<T, GfxError>;

impl GfxError {
    /// 如果是 Vulkan 调用失败，返回对应的 `vk::Result`
    pub fn vk_result(&self) -> Option<vk::Result> {
        match self {
            GfxError::Vk { result, .. } => Some(*result),
            GfxError::SurfaceLost => Some(vk::Result::ERROR_SURFACE_LOST_KHR),
            GfxError::OutOfDate => Some(vk::Result::ERROR_OUT_OF_DATE_KHR),
            _ => None,
        }
    }

    /// 资源耗尽或者设备丢失，无法通过重建交换链恢复
    pub fn is_fatal(&self) -> bool {
        self.vk_result().map(classify) == Some(VkErrorClass::Fatal)
    }
}

/// `vk::Result` 的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VkErrorClass {
    /// 交换链需要重建
    OutOfDate,
    /// surface 和交换链都需要重建
    SurfaceLost,
    /// 仍然可以使用，但是下一次自然的重建时机会重建
    Suboptimal,
    /// 资源耗尽或者设备丢失，无法继续
    Fatal,
    /// 其他错误，交给调用者处理
    Other,
}

pub fn classify(result: vk::Result) -> VkErrorClass {
    match result {
        vk::Result::ERROR_OUT_OF_DATE_KHR => VkErrorClass::OutOfDate,
        vk::Result::ERROR_SURFACE_LOST_KHR => VkErrorClass::SurfaceLost,
        vk::Result::SUBOPTIMAL_KHR => VkErrorClass::Suboptimal,
        vk::Result::ERROR_OUT_OF_HOST_MEMORY
        | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
        | vk::Result::ERROR_DEVICE_LOST => VkErrorClass::Fatal,
        _ => VkErrorClass::Other,
    }
}

pub trait VkResultExt<T> {
    /// 附加调用名称，转换为 [`GfxError`]
    fn vk_context(self, call: &'static str) -> GfxResult<T>;

    /// 创建 GPU 对象时使用：失败即为不可恢复的错误，不会返回
    fn or_fatal(self, call: &'static str) -> T;
}

impl<T> VkResultExt<T> for ash::prelude::VkResult<T> {
    #[inline]
    fn vk_context(self, call: &'static str) -> GfxResult<T> {
        self.map_err(|result| match result {
            vk::Result::ERROR_SURFACE_LOST_KHR => GfxError::SurfaceLost,
            vk::Result::ERROR_OUT_OF_DATE_KHR => GfxError::OutOfDate,
            result => GfxError::Vk { call, result },
        })
    }

    #[inline]
    fn or_fatal(self, call: &'static str) -> T {
        match self {
            Ok(value) => value,
            Err(result) => handle_unrecoverable_error(FatalError::from_vk(call, result)),
        }
    }
}

impl<T> VkResultExt<T> for GfxResult<T> {
    #[inline]
    fn vk_context(self, _call: &'static str) -> GfxResult<T> {
        self
    }

    #[inline]
    fn or_fatal(self, call: &'static str) -> T {
        match self {
            Ok(value) => value,
            Err(err) => handle_unrecoverable_error(FatalError::from_gfx(call, err)),
        }
    }
}
