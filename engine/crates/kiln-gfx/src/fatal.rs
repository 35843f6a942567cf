//! 不可恢复错误的唯一出口
//!
//! 资源耗尽、设备丢失、恢复深度超限等情况都会走到 [`handle_unrecoverable_error`]，
//! 输出日志、调用宿主安装的 hook（例如记录“下次启动换一个渲染后端”），然后终止进程。

use std::fmt::{Display, Formatter};
use std::sync::OnceLock;

use ash::vk;

use crate::error::GfxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalKind {
    OutOfHostMemory,
    OutOfDeviceMemory,
    DeviceLost,
    /// 交换链恢复过程嵌套过深
    RecoveryDepthExceeded,
    /// 设备或 surface 缺少必要的能力
    Unsupported,
    /// surface 丢失后无法重新创建
    SurfaceCreation,
    Other,
}

#[derive(Debug, Clone)]
pub struct FatalError {
    pub kind: FatalKind,
    pub context: String,
    pub result: Option<vk::Result>,
}

impl FatalError {
    pub fn new(kind: FatalKind, context: impl Into<String>) -> Self {
        Self {
            kind,
            context: context.into(),
            result: None,
        }
    }

    pub fn from_vk(call: &str, result: vk::Result) -> Self {
        let kind = match result {
            vk::Result::ERROR_OUT_OF_HOST_MEMORY => FatalKind::OutOfHostMemory,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => FatalKind::OutOfDeviceMemory,
            vk::Result::ERROR_DEVICE_LOST => FatalKind::DeviceLost,
            _ => FatalKind::Other,
        };
        Self {
            kind,
            context: call.to_string(),
            result: Some(result),
        }
    }

    pub fn from_gfx(call: &str, err: GfxError) -> Self {
        match err.vk_result() {
            Some(result) => Self {
                context: format!("{call}: {err}"),
                ..Self::from_vk(call, result)
            },
            None => {
                let kind = match err {
                    GfxError::NoSuitablePhysicalDevice
                    | GfxError::NoSupportedDepthFormat(_)
                    | GfxError::FifoUnsupported
                    | GfxError::QueueFamilyMismatch { .. } => FatalKind::Unsupported,
                    _ => FatalKind::Other,
                };
                Self::new(kind, format!("{call}: {err}"))
            }
        }
    }
}

impl FatalError {
    /// 资源耗尽、设备丢失保留原来的分类，其余的归为 [`FatalKind::SurfaceCreation`]
    pub fn surface_creation(err: GfxError) -> Self {
        let fatal = Self::from_gfx("vkCreateSurfaceKHR", err);
        match fatal.kind {
            FatalKind::OutOfHostMemory | FatalKind::OutOfDeviceMemory | FatalKind::DeviceLost => fatal,
            _ => Self {
                kind: FatalKind::SurfaceCreation,
                ..fatal
            },
        }
    }
}

impl Display for FatalError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.context)?;
        if let Some(result) = self.result {
            write!(f, " ({result:?})")?;
        }
        if self.kind == FatalKind::DeviceLost {
            write!(f, "; the GPU device was lost, this is usually a driver crash or a GPU hang")?;
        }
        Ok(())
    }
}

type FatalHook = Box<dyn Fn(&FatalError) + Send + Sync>;

static FATAL_HOOK: OnceLock<FatalHook> = OnceLock::new();

/// 安装 hook，只有第一次安装有效
///
/// # return
/// 是否安装成功
pub fn set_fatal_hook(hook: impl Fn(&FatalError) + Send + Sync + 'static) -> bool {
    FATAL_HOOK.set(Box::new(hook)).is_ok()
}

/// 用户可读的提示信息
pub fn fatal_message(err: &FatalError) -> String {
    format!(
        "The Vulkan rendering backend encountered an unrecoverable error:\n\n{err}\n\n\
         Please try a different rendering backend the next time the application is launched."
    )
}

pub fn handle_unrecoverable_error(err: FatalError) -> ! {
    log::error!("{}", fatal_message(&err));
    if let Some(hook) = FATAL_HOOK.get() {
        hook(&err);
    }
    log::logger().flush();
    std::process::abort()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vk_kind() {
        assert_eq!(
            FatalError::from_vk("vkAllocateMemory", vk::Result::ERROR_OUT_OF_DEVICE_MEMORY).kind,
            FatalKind::OutOfDeviceMemory
        );
        assert_eq!(FatalError::from_vk("vkQueueSubmit", vk::Result::ERROR_DEVICE_LOST).kind, FatalKind::DeviceLost);
        assert_eq!(
            FatalError::from_vk("vkCreateImage", vk::Result::ERROR_FORMAT_NOT_SUPPORTED).kind,
            FatalKind::Other
        );
    }

    #[test]
    fn test_from_gfx() {
        let err = FatalError::from_gfx("create_swapchain", GfxError::FifoUnsupported);
        assert_eq!(err.kind, FatalKind::Unsupported);
        assert!(err.result.is_none());

        let err = FatalError::from_gfx(
            "create_buffer",
            GfxError::Vk {
                call: "vmaCreateBuffer",
                result: vk::Result::ERROR_OUT_OF_HOST_MEMORY,
            },
        );
        assert_eq!(err.kind, FatalKind::OutOfHostMemory);
        assert_eq!(err.result, Some(vk::Result::ERROR_OUT_OF_HOST_MEMORY));
    }

    #[test]
    fn test_surface_creation() {
        let err = FatalError::surface_creation(GfxError::Vk {
            call: "vkCreateWin32SurfaceKHR",
            result: vk::Result::ERROR_INITIALIZATION_FAILED,
        });
        assert_eq!(err.kind, FatalKind::SurfaceCreation);
        assert_eq!(err.result, Some(vk::Result::ERROR_INITIALIZATION_FAILED));

        let err = FatalError::surface_creation(GfxError::Vk {
            call: "vkCreateWin32SurfaceKHR",
            result: vk::Result::ERROR_OUT_OF_HOST_MEMORY,
        });
        assert_eq!(err.kind, FatalKind::OutOfHostMemory);

        let err = FatalError::surface_creation(GfxError::Config("no window".to_string()));
        assert_eq!(err.kind, FatalKind::SurfaceCreation);
        assert!(err.context.contains("no window"));
    }

    #[test]
    fn test_device_lost_message() {
        let msg = fatal_message(&FatalError::from_vk("vkQueueSubmit", vk::Result::ERROR_DEVICE_LOST));
        assert!(msg.contains("device was lost"));
        assert!(msg.contains("different rendering backend"));
    }
}
