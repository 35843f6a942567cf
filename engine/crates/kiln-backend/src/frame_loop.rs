//! 帧循环的控制流：flip、acquire 以及交换链重建时的恢复路径
//!
//! [`PresentTarget`] 负责实际的提交、present、acquire 以及交换链的创建和销毁，这里只决定调用顺序，
//! 以及出错时进入哪一条恢复路径。

use ash::vk;
use kiln_gfx::error::{VkErrorClass, classify};
use kiln_gfx::fatal::{FatalError, handle_unrecoverable_error};
use kiln_gfx::swapchain::render_swapchain::SwapchainStatus;

use crate::recovery::{RecoveryGuard, RecoveryReason};

/// acquire 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    Success,
    /// 交换链已经重建，并且重建过程中已经 acquire 了新的图像
    RecoveredFromError,
    UnhandledFailure,
}

/// 帧循环依赖的交换链操作
pub trait PresentTarget {
    fn drawable_size(&self) -> vk::Extent2D;

    /// 交换链以及帧资源都存在时返回交换链的尺寸
    fn swapchain_extent(&self) -> Option<vk::Extent2D>;

    fn is_copy_recording(&self) -> bool;

    /// 结束本帧的录制；`render_pass_started` 时同时结束 render pass 以及 draw 命令
    fn end_recording(&mut self, render_pass_started: bool);

    /// 只提交 copy 命令；`consume_acquired` 时等待 acquire 的信号量，让它回到未 signal 的状态
    fn submit_copy(&mut self, consume_acquired: bool);

    /// 提交 copy 以及 draw 命令，然后 present 当前图像
    fn submit_and_present(&mut self) -> SwapchainStatus;

    fn acquire_image(&mut self) -> SwapchainStatus;

    /// 进入下一个帧槽位；新槽位的 copy 命令不在录制状态
    fn advance_frame(&mut self, skip_acquire_new_image: bool);

    fn begin_copy(&mut self);

    fn recovery_guard(&mut self) -> &mut RecoveryGuard;

    /// 保留 surface，销毁并重新创建交换链及其派生对象，其中包括第一次 acquire
    fn rebuild_swapchain(&mut self) -> bool;

    /// surface 也一起销毁并重新创建
    fn rebuild_surface(&mut self) -> bool;

    fn throttle_wait(&mut self);

    fn throttle_reset(&mut self);

    fn unrecoverable(&self, err: FatalError) -> ! {
        handle_unrecoverable_error(err)
    }
}

fn enter_recovery<T: PresentTarget + ?Sized>(target: &mut T, reason: RecoveryReason) {
    let entered = target.recovery_guard().enter(reason);
    if let Err(fatal) = entered {
        target.unrecoverable(fatal);
    }
}

/// 重建交换链；嵌套过深时不会返回
pub fn recreate<T: PresentTarget + ?Sized>(target: &mut T, reason: RecoveryReason) -> bool {
    enter_recovery(target, reason);
    let ok = target.rebuild_swapchain();
    target.recovery_guard().leave();
    ok
}

pub fn handle_surface_lost<T: PresentTarget + ?Sized>(target: &mut T) -> bool {
    enter_recovery(target, RecoveryReason::SurfaceLost);
    log::warn!("surface lost, recreating surface and swapchain");
    let ok = target.rebuild_surface();
    target.recovery_guard().leave();
    ok
}

/// suboptimal 的图像仍然可以使用，重建推迟到 present 时
pub fn acquire<T: PresentTarget + ?Sized>(target: &mut T) -> AcquireResult {
    if target.swapchain_extent().is_none() {
        return AcquireResult::UnhandledFailure;
    }

    let recovered = |ok: bool| if ok { AcquireResult::RecoveredFromError } else { AcquireResult::UnhandledFailure };
    match target.acquire_image() {
        SwapchainStatus::Ok | SwapchainStatus::Suboptimal => AcquireResult::Success,
        SwapchainStatus::OutOfDate => recovered(recreate(target, RecoveryReason::OutOfDate)),
        SwapchainStatus::SurfaceLost => recovered(handle_surface_lost(target)),
        SwapchainStatus::Failed(result) => {
            if classify(result) == VkErrorClass::Fatal {
                target.unrecoverable(FatalError::from_vk("vkAcquireNextImageKHR", result));
            }
            log::error!("vkAcquireNextImageKHR: unhandled error {result:?}");
            AcquireResult::UnhandledFailure
        }
    }
}

/// 结束本帧：提交、present、进入下一个帧槽位并 acquire 下一张图像
///
/// acquire 失败时新槽位的 copy 命令保持未录制，下一次 flip 以 `InvalidFrameState` 重建
pub fn flip<T: PresentTarget + ?Sized>(target: &mut T, render_pass_started: bool) {
    let Some(extent) = target.swapchain_extent() else {
        log::warn!("flip without a usable swapchain, recreating");
        if !recreate(target, RecoveryReason::InvalidFrameState) {
            target.throttle_wait();
        }
        return;
    };
    if !target.is_copy_recording() {
        log::error!("copy command buffer is not recording at flip, recreating swapchain");
        if !recreate(target, RecoveryReason::InvalidFrameState) {
            target.throttle_wait();
        }
        return;
    }

    target.end_recording(render_pass_started);

    // 没有开始 render pass：只提交 copy，已经 acquire 的图像留给下一帧
    if !render_pass_started {
        target.submit_copy(false);
        target.advance_frame(true);
        target.begin_copy();
        if target.drawable_size() != extent {
            target.throttle_wait();
        }
        return;
    }

    // 尺寸不一致时丢弃绘制命令，copy 命令仍然提交
    let drawable = target.drawable_size();
    if drawable != extent {
        log::debug!(
            "drawable size {}x{} does not match swapchain extent {}x{}, recreating",
            drawable.width,
            drawable.height,
            extent.width,
            extent.height
        );
        target.submit_copy(true);
        recreate(target, RecoveryReason::SizeMismatch);
        if target.swapchain_extent() != Some(target.drawable_size()) {
            target.throttle_wait();
        }
        return;
    }

    match target.submit_and_present() {
        SwapchainStatus::Ok => {}
        // 与 acquire 不同，present 之后立即重建
        SwapchainStatus::Suboptimal => {
            recreate(target, RecoveryReason::Suboptimal);
            return;
        }
        SwapchainStatus::OutOfDate => {
            recreate(target, RecoveryReason::OutOfDate);
            return;
        }
        SwapchainStatus::SurfaceLost => {
            handle_surface_lost(target);
            return;
        }
        SwapchainStatus::Failed(result) => {
            if classify(result) == VkErrorClass::Fatal {
                target.unrecoverable(FatalError::from_vk("vkQueuePresentKHR", result));
            }
            log::error!("vkQueuePresentKHR: unhandled error {result:?}");
        }
    }
    target.throttle_reset();

    target.advance_frame(false);
    if acquire(target) != AcquireResult::Success {
        return;
    }
    if target.swapchain_extent() != Some(target.drawable_size()) {
        recreate(target, RecoveryReason::SizeMismatch);
        return;
    }
    target.begin_copy();
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        EndRecording(bool),
        SubmitCopy(bool),
        SubmitAndPresent,
        Acquire,
        Advance(bool),
        BeginCopy,
        /// 重建时的原因链
        Rebuild(String),
        RebuildSurface(String),
        ThrottleWait,
        ThrottleReset,
    }

    const SIZE: vk::Extent2D = vk::Extent2D { width: 800, height: 600 };

    struct MockTarget {
        drawable: vk::Extent2D,
        extent: Option<vk::Extent2D>,
        copy_recording: bool,

        present_results: VecDeque<SwapchainStatus>,
        acquire_results: VecDeque<SwapchainStatus>,
        /// 队列为空时 acquire 的结果
        acquire_default: SwapchainStatus,

        /// 重建后交换链的尺寸，`None` 时使用窗口尺寸
        rebuilt_extent: Option<vk::Extent2D>,
        rebuild_fails: bool,

        guard: RecoveryGuard,
        calls: Vec<Call>,
    }

    impl MockTarget {
        fn new() -> Self {
            Self {
                drawable: SIZE,
                extent: Some(SIZE),
                copy_recording: true,
                present_results: VecDeque::new(),
                acquire_results: VecDeque::new(),
                acquire_default: SwapchainStatus::Ok,
                rebuilt_extent: None,
                rebuild_fails: false,
                guard: RecoveryGuard::default(),
                calls: vec![],
            }
        }

        /// 与真实的交换链创建一致：新的帧资源处于录制状态，最后 acquire 第一张图像
        fn rebuild(&mut self) -> bool {
            if self.rebuild_fails {
                self.extent = None;
                return false;
            }
            self.extent = Some(self.rebuilt_extent.unwrap_or(self.drawable));
            self.copy_recording = true;
            acquire(self) != AcquireResult::UnhandledFailure
        }
    }

    impl PresentTarget for MockTarget {
        fn drawable_size(&self) -> vk::Extent2D {
            self.drawable
        }

        fn swapchain_extent(&self) -> Option<vk::Extent2D> {
            self.extent
        }

        fn is_copy_recording(&self) -> bool {
            self.copy_recording
        }

        fn end_recording(&mut self, render_pass_started: bool) {
            self.copy_recording = false;
            self.calls.push(Call::EndRecording(render_pass_started));
        }

        fn submit_copy(&mut self, consume_acquired: bool) {
            self.calls.push(Call::SubmitCopy(consume_acquired));
        }

        fn submit_and_present(&mut self) -> SwapchainStatus {
            self.calls.push(Call::SubmitAndPresent);
            self.present_results.pop_front().unwrap_or(SwapchainStatus::Ok)
        }

        fn acquire_image(&mut self) -> SwapchainStatus {
            self.calls.push(Call::Acquire);
            self.acquire_results.pop_front().unwrap_or(self.acquire_default)
        }

        fn advance_frame(&mut self, skip_acquire_new_image: bool) {
            self.copy_recording = false;
            self.calls.push(Call::Advance(skip_acquire_new_image));
        }

        fn begin_copy(&mut self) {
            assert!(!self.copy_recording, "copy command buffer began twice");
            self.copy_recording = true;
            self.calls.push(Call::BeginCopy);
        }

        fn recovery_guard(&mut self) -> &mut RecoveryGuard {
            &mut self.guard
        }

        fn rebuild_swapchain(&mut self) -> bool {
            self.calls.push(Call::Rebuild(self.guard.chain()));
            self.rebuild()
        }

        fn rebuild_surface(&mut self) -> bool {
            self.calls.push(Call::RebuildSurface(self.guard.chain()));
            self.rebuild()
        }

        fn throttle_wait(&mut self) {
            self.calls.push(Call::ThrottleWait);
        }

        fn throttle_reset(&mut self) {
            self.calls.push(Call::ThrottleReset);
        }

        fn unrecoverable(&self, err: FatalError) -> ! {
            panic!("unrecoverable: {err}")
        }
    }

    #[test]
    fn test_flip_presents_and_acquires_next_image() {
        let mut target = MockTarget::new();
        flip(&mut target, true);

        assert_eq!(
            target.calls,
            vec![
                Call::EndRecording(true),
                Call::SubmitAndPresent,
                Call::ThrottleReset,
                Call::Advance(false),
                Call::Acquire,
                Call::BeginCopy,
            ]
        );
        assert!(target.copy_recording);
        assert_eq!(target.guard.depth(), 0);
    }

    #[test]
    fn test_flip_without_render_pass_submits_copy_only() {
        let mut target = MockTarget::new();
        flip(&mut target, false);

        // 不 acquire 新图像，也不需要限制帧率
        assert_eq!(
            target.calls,
            vec![Call::EndRecording(false), Call::SubmitCopy(false), Call::Advance(true), Call::BeginCopy]
        );
        assert!(target.copy_recording);
    }

    #[test]
    fn test_minimized_flip_is_throttled() {
        let mut target = MockTarget::new();
        target.drawable = vk::Extent2D { width: 0, height: 0 };
        flip(&mut target, false);

        assert_eq!(target.calls.last(), Some(&Call::ThrottleWait));
        assert!(!target.calls.contains(&Call::SubmitAndPresent));
        assert!(target.copy_recording);
    }

    #[test]
    fn test_size_mismatch_submits_copy_and_recreates() {
        let mut target = MockTarget::new();
        target.drawable = vk::Extent2D { width: 1024, height: 768 };
        flip(&mut target, true);

        assert_eq!(
            target.calls,
            vec![
                Call::EndRecording(true),
                Call::SubmitCopy(true),
                Call::Rebuild("size mismatch".to_string()),
                Call::Acquire,
            ]
        );
        assert_eq!(target.extent, Some(target.drawable));
        assert!(target.copy_recording);
        assert_eq!(target.guard.depth(), 0);
    }

    #[test]
    fn test_persistent_size_mismatch_is_throttled() {
        let mut target = MockTarget::new();
        target.drawable = vk::Extent2D { width: 1024, height: 768 };
        target.rebuilt_extent = Some(SIZE);

        flip(&mut target, true);
        assert_eq!(target.calls.last(), Some(&Call::ThrottleWait));

        // 成功 present 之后重置
        target.drawable = SIZE;
        target.calls.clear();
        flip(&mut target, true);
        assert!(target.calls.contains(&Call::ThrottleReset));
        assert!(!target.calls.contains(&Call::ThrottleWait));
    }

    #[test]
    fn test_present_out_of_date_recreates() {
        let mut target = MockTarget::new();
        target.present_results.push_back(SwapchainStatus::OutOfDate);
        flip(&mut target, true);

        assert_eq!(
            target.calls,
            vec![
                Call::EndRecording(true),
                Call::SubmitAndPresent,
                Call::Rebuild("out of date".to_string()),
                Call::Acquire,
            ]
        );
        assert!(target.copy_recording);
    }

    #[test]
    fn test_present_suboptimal_recreates() {
        let mut target = MockTarget::new();
        target.present_results.push_back(SwapchainStatus::Suboptimal);
        flip(&mut target, true);

        assert!(target.calls.contains(&Call::Rebuild("suboptimal".to_string())));
        assert!(!target.calls.contains(&Call::Advance(false)));
    }

    #[test]
    fn test_present_surface_lost_rebuilds_surface() {
        let mut target = MockTarget::new();
        target.present_results.push_back(SwapchainStatus::SurfaceLost);
        flip(&mut target, true);

        assert!(target.calls.contains(&Call::RebuildSurface("surface lost".to_string())));
        assert!(target.copy_recording);
        assert_eq!(target.guard.depth(), 0);
    }

    #[test]
    fn test_acquire_suboptimal_counts_as_success() {
        let mut target = MockTarget::new();
        target.acquire_results.push_back(SwapchainStatus::Suboptimal);
        flip(&mut target, true);

        assert_eq!(target.calls.last(), Some(&Call::BeginCopy));
        assert!(!target.calls.iter().any(|call| matches!(call, Call::Rebuild(_))));
    }

    #[test]
    fn test_failed_acquire_leaves_copy_stopped_until_next_flip() {
        let mut target = MockTarget::new();
        target.acquire_results.push_back(SwapchainStatus::Failed(vk::Result::TIMEOUT));
        flip(&mut target, true);

        assert_eq!(target.calls.last(), Some(&Call::Acquire));
        assert!(!target.copy_recording);

        // 下一帧不录制也不提交任何命令，直接重建
        target.calls.clear();
        flip(&mut target, false);
        assert_eq!(target.calls, vec![Call::Rebuild("invalid frame state".to_string()), Call::Acquire]);
        assert!(target.copy_recording);
    }

    #[test]
    fn test_flip_without_swapchain() {
        let mut target = MockTarget::new();
        target.extent = None;
        target.rebuild_fails = true;
        flip(&mut target, false);

        assert_eq!(target.calls, vec![Call::Rebuild("invalid frame state".to_string()), Call::ThrottleWait]);
        assert_eq!(acquire(&mut target), AcquireResult::UnhandledFailure);
    }

    #[test]
    fn test_nested_recovery_chain() {
        let mut target = MockTarget::new();
        target.present_results.push_back(SwapchainStatus::OutOfDate);
        // 重建过程中的 acquire 又遇到 surface lost
        target.acquire_results.push_back(SwapchainStatus::SurfaceLost);
        flip(&mut target, true);

        assert!(target.calls.contains(&Call::Rebuild("out of date".to_string())));
        assert!(target.calls.contains(&Call::RebuildSurface("out of date -> surface lost".to_string())));
        assert_eq!(target.guard.depth(), 0);
    }

    #[test]
    fn test_recovered_acquire() {
        let mut target = MockTarget::new();
        target.acquire_results.push_back(SwapchainStatus::OutOfDate);
        assert_eq!(acquire(&mut target), AcquireResult::RecoveredFromError);

        target.acquire_results.push_back(SwapchainStatus::OutOfDate);
        target.rebuild_fails = true;
        assert_eq!(acquire(&mut target), AcquireResult::UnhandledFailure);
    }

    #[test]
    #[should_panic(expected = "RecoveryDepthExceeded")]
    fn test_endless_out_of_date_hits_depth_limit() {
        let mut target = MockTarget::new();
        target.acquire_default = SwapchainStatus::OutOfDate;
        recreate(&mut target, RecoveryReason::OutOfDate);
    }

    #[test]
    #[should_panic(expected = "DeviceLost")]
    fn test_device_lost_on_present_is_fatal() {
        let mut target = MockTarget::new();
        target.present_results.push_back(SwapchainStatus::Failed(vk::Result::ERROR_DEVICE_LOST));
        flip(&mut target, true);
    }

    #[test]
    fn test_non_fatal_present_error_keeps_going() {
        let mut target = MockTarget::new();
        target.present_results.push_back(SwapchainStatus::Failed(vk::Result::TIMEOUT));
        flip(&mut target, true);

        assert_eq!(target.calls.last(), Some(&Call::BeginCopy));
    }
}
