use crate::pipeline_settings::MAX_FRAMES_IN_FLIGHT;

pub struct FrameCounter {
    /// 每次 flip 累加，回绕时跳过 0
    frame_num: u64,
}
// new & init
impl Default for FrameCounter {
    fn default() -> Self {
        Self::new(0)
    }
}
impl FrameCounter {
    pub fn new(init_frame_num: u64) -> Self {
        Self {
            frame_num: init_frame_num,
        }
    }
}
// update
impl FrameCounter {
    /// `frame_num = max(frame_num + 1, 1)`
    #[inline]
    pub fn next_frame(&mut self) {
        self.frame_num = self.frame_num.wrapping_add(1).max(1);
    }
}
// getters
impl FrameCounter {
    #[inline]
    pub fn frame_num(&self) -> u64 {
        self.frame_num
    }
    #[inline]
    pub const fn fif_count() -> usize {
        MAX_FRAMES_IN_FLIGHT
    }
    #[inline]
    pub fn frame_name(&self) -> String {
        format!("[F{}]", self.frame_num)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_frame() {
        let mut counter = FrameCounter::default();
        counter.next_frame();
        assert_eq!(counter.frame_num(), 1);
        counter.next_frame();
        assert_eq!(counter.frame_num(), 2);
    }

    #[test]
    fn test_wrap_skips_zero() {
        let mut counter = FrameCounter::new(u64::MAX);
        counter.next_frame();
        assert_eq!(counter.frame_num(), 1);
    }
}
