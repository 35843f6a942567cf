use std::time::{Duration, Instant};

use kiln_render_interface::pipeline_settings::SKIP_FRAME_RATE_CAP_HZ;

/// 窗口尺寸与交换链不一致或者窗口最小化时，跳过的帧不做任何 GPU 工作，
/// 需要限制帧循环的频率，避免占满 CPU
pub struct SkipFrameThrottle {
    min_interval: Duration,
    last: Option<Instant>,
}

impl Default for SkipFrameThrottle {
    fn default() -> Self {
        Self::new(SKIP_FRAME_RATE_CAP_HZ)
    }
}

impl SkipFrameThrottle {
    pub fn new(rate_cap_hz: u32) -> Self {
        Self {
            min_interval: Duration::from_secs(1) / rate_cap_hz.max(1),
            last: None,
        }
    }

    #[inline]
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// 在 `now` 时刻还需要等待多久
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last {
            None => Duration::ZERO,
            Some(last) => self.min_interval.saturating_sub(now.saturating_duration_since(last)),
        }
    }

    pub fn wait(&mut self) {
        let remaining = self.remaining(Instant::now());
        if !remaining.is_zero() {
            let _span = tracy_client::span!("SkipFrameThrottle::wait");
            std::thread::sleep(remaining);
        }
        self.last = Some(Instant::now());
    }

    /// 恢复正常渲染后调用，下一次跳帧不需要等待
    pub fn reset(&mut self) {
        self.last = None;
    }
}
