//! 交换链恢复的嵌套深度控制
//!
//! 重建过程本身也可能再次遇到 out-of-date 或者 surface lost，从而递归地进入恢复流程。
//! [`RecoveryGuard`] 记录当前正在处理的原因链，超过上限时转为不可恢复的错误。

use std::fmt::{Display, Formatter};

use itertools::Itertools;
use kiln_gfx::fatal::{FatalError, FatalKind};
use kiln_render_interface::pipeline_settings::MAX_ERROR_HANDLING_DEPTH;

/// 触发交换链重建的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryReason {
    OutOfDate,
    Suboptimal,
    SurfaceLost,
    /// 窗口尺寸与交换链尺寸不一致
    SizeMismatch,
    SwapIntervalChanged,
    /// 帧循环状态异常，例如 copy 命令没有在录制
    InvalidFrameState,
}

impl Display for RecoveryReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::OutOfDate => "out of date",
            Self::Suboptimal => "suboptimal",
            Self::SurfaceLost => "surface lost",
            Self::SizeMismatch => "size mismatch",
            Self::SwapIntervalChanged => "swap interval changed",
            Self::InvalidFrameState => "invalid frame state",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    Active,
    Recreating { reason: RecoveryReason, depth: usize },
}

pub struct RecoveryGuard {
    stack: Vec<RecoveryReason>,
    max_depth: usize,
}

impl Default for RecoveryGuard {
    fn default() -> Self {
        Self::new(MAX_ERROR_HANDLING_DEPTH)
    }
}

// new & init
impl RecoveryGuard {
    pub fn new(max_depth: usize) -> Self {
        Self {
            stack: Vec::with_capacity(max_depth),
            max_depth,
        }
    }
}

// getters
impl RecoveryGuard {
    #[inline]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn state(&self) -> RecoveryState {
        match self.stack.last() {
            None => RecoveryState::Active,
            Some(reason) => RecoveryState::Recreating {
                reason: *reason,
                depth: self.stack.len(),
            },
        }
    }

    /// 由外到内的原因链，例如 `out of date -> surface lost`
    pub fn chain(&self) -> String {
        self.stack.iter().join(" -> ")
    }
}

// update
impl RecoveryGuard {
    /// 进入一层恢复流程；已经达到上限时返回致命错误，不修改状态
    pub fn enter(&mut self, reason: RecoveryReason) -> Result<(), FatalError> {
        if self.stack.len() >= self.max_depth {
            let chain = self.stack.iter().chain(std::iter::once(&reason)).join(" -> ");
            return Err(FatalError::new(
                FatalKind::RecoveryDepthExceeded,
                format!("swapchain recovery nested more than {} levels: {chain}", self.max_depth),
            ));
        }

        self.stack.push(reason);
        log::info!("swapchain recovery ({}), depth {}", reason, self.stack.len());
        Ok(())
    }

    pub fn leave(&mut self) {
        let reason = self.stack.pop();
        debug_assert!(reason.is_some(), "leave without matching enter");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_leave() {
        let mut guard = RecoveryGuard::default();
        assert_eq!(guard.state(), RecoveryState::Active);

        guard.enter(RecoveryReason::OutOfDate).unwrap();
        guard.enter(RecoveryReason::SurfaceLost).unwrap();
        assert_eq!(
            guard.state(),
            RecoveryState::Recreating {
                reason: RecoveryReason::SurfaceLost,
                depth: 2
            }
        );
        assert_eq!(guard.chain(), "out of date -> surface lost");

        guard.leave();
        guard.leave();
        assert_eq!(guard.state(), RecoveryState::Active);
        assert_eq!(guard.depth(), 0);
    }

    #[test]
    fn test_depth_exceeded() {
        let mut guard = RecoveryGuard::new(2);
        guard.enter(RecoveryReason::OutOfDate).unwrap();
        guard.enter(RecoveryReason::Suboptimal).unwrap();

        let err = guard.enter(RecoveryReason::SizeMismatch).unwrap_err();
        assert_eq!(err.kind, FatalKind::RecoveryDepthExceeded);
        assert!(err.context.contains("out of date -> suboptimal -> size mismatch"));
        assert_eq!(guard.depth(), 2);
    }

    #[test]
    fn test_default_limit() {
        let mut guard = RecoveryGuard::default();
        for _ in 0..MAX_ERROR_HANDLING_DEPTH {
            guard.enter(RecoveryReason::OutOfDate).unwrap();
        }
        assert!(guard.enter(RecoveryReason::OutOfDate).is_err());
    }
}
