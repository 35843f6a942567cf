use std::fmt::Display;

use ash::vk;
use serde::{Deserialize, Serialize};

/// 上层请求的垂直同步方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapInterval {
    /// 不等待垂直同步
    Immediate,
    #[default]
    Vsync,
    /// 错过垂直同步时立即显示
    AdaptiveVsync,
}

impl SwapInterval {
    pub const ALL: [SwapInterval; 3] = [Self::Immediate, Self::Vsync, Self::AdaptiveVsync];

    /// 按优先级排列的 present mode
    pub fn present_mode_candidates(self) -> &'static [vk::PresentModeKHR] {
        match self {
            Self::Immediate => &[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::MAILBOX],
            Self::Vsync => &[vk::PresentModeKHR::FIFO],
            Self::AdaptiveVsync => &[vk::PresentModeKHR::FIFO_RELAXED],
        }
    }

    /// 根据实际使用的 present mode 推导出的 interval
    pub fn from_present_mode(mode: vk::PresentModeKHR) -> Self {
        match mode {
            vk::PresentModeKHR::IMMEDIATE | vk::PresentModeKHR::MAILBOX => Self::Immediate,
            vk::PresentModeKHR::FIFO => Self::Vsync,
            vk::PresentModeKHR::FIFO_RELAXED => Self::AdaptiveVsync,
            other => {
                log::error!("unhandled present mode: {:?}", other);
                Self::Vsync
            }
        }
    }

    /// 循环切换到下一个模式
    pub fn next(self) -> Self {
        match self {
            Self::Immediate => Self::Vsync,
            Self::Vsync => Self::AdaptiveVsync,
            Self::AdaptiveVsync => Self::Immediate,
        }
    }
}

impl Display for SwapInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Immediate => write!(f, "immediate"),
            Self::Vsync => write!(f, "vsync"),
            Self::AdaptiveVsync => write!(f, "adaptive vsync"),
        }
    }
}
