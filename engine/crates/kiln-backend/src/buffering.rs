//! 帧资源环
//!
//! CPU 录制第 K+1 帧时 GPU 仍可能在执行第 K 帧。[`BufferingMechanism::swap`] 中对 fence 的等待
//! 是整个后端唯一的阻塞点，也是 frames in flight 上限的唯一保证。

use crossbeam_channel::Receiver;
use itertools::Itertools;
use kiln_gfx::error::GfxResult;

/// 帧环中的一个槽位
pub trait FrameSlot {
    /// 延迟销毁的对象
    type Retired;

    /// 阻塞等待该槽位上一次提交完成，不设超时
    fn wait_for_previous_submission(&self) -> GfxResult<()>;

    fn reset_previous_submission(&self) -> GfxResult<()>;

    fn reset_descriptor_pools(&mut self) -> GfxResult<()>;

    /// 之后 copy 命令不再处于录制状态
    fn reset_command_pool(&mut self) -> GfxResult<()>;

    fn is_copy_recording(&self) -> bool;

    /// 这些对象最后一次被使用是在本槽位当前的提交中
    fn retire(&mut self, objects: Vec<Self::Retired>);

    /// 回收块分配器，并销毁之前交给本槽位的对象
    fn clean(&mut self);

    /// 调用者保证 GPU 已经空闲
    fn destroy(self);
}

/// 帧资源环以及交换链图像的信号量环
///
/// 由 [`Self::init`] 构造，由 [`Self::destroy`] 消耗，因此不存在未初始化或者已销毁的状态
pub struct BufferingMechanism<F: FrameSlot, S> {
    frames: Vec<F>,
    image_slots: Vec<S>,

    current_frame: usize,
    current_image_slot: usize,

    retired: Receiver<F::Retired>,
}

// new & init
impl<F: FrameSlot, S> BufferingMechanism<F, S> {
    /// 所有 fence 创建时都是 signaled，第一帧直接使用 0 号槽位，因此需要先 reset
    pub fn init(frames: Vec<F>, image_slots: Vec<S>, retired: Receiver<F::Retired>) -> GfxResult<Self> {
        assert!(!frames.is_empty(), "frame ring must not be empty");
        assert!(!image_slots.is_empty(), "swapchain image ring must not be empty");

        frames[0].reset_previous_submission()?;
        log::debug!("buffering initialized: {} frames, {} swapchain image slots", frames.len(), image_slots.len());

        Ok(Self {
            frames,
            image_slots,
            current_frame: 0,
            current_image_slot: 0,
            retired,
        })
    }
}

// getters
impl<F: FrameSlot, S> BufferingMechanism<F, S> {
    #[inline]
    pub fn current_frame_index(&self) -> usize {
        self.current_frame
    }

    #[inline]
    pub fn current_image_slot_index(&self) -> usize {
        self.current_image_slot
    }

    #[inline]
    pub fn current_frame(&self) -> &F {
        &self.frames[self.current_frame]
    }

    #[inline]
    pub fn current_frame_mut(&mut self) -> &mut F {
        &mut self.frames[self.current_frame]
    }

    /// copy 命令不在录制状态时返回 None，此时不能录制任何上传
    #[inline]
    pub fn recording_frame_mut(&mut self) -> Option<&mut F> {
        let frame = &mut self.frames[self.current_frame];
        frame.is_copy_recording().then_some(frame)
    }

    #[inline]
    pub fn current_image_slot(&self) -> &S {
        &self.image_slots[self.current_image_slot]
    }

    /// 提交时需要同时访问帧槽位和图像槽位
    #[inline]
    pub fn current_slots_mut(&mut self) -> (&mut F, &S) {
        (&mut self.frames[self.current_frame], &self.image_slots[self.current_image_slot])
    }

    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn image_slot_count(&self) -> usize {
        self.image_slots.len()
    }
}

// update
impl<F: FrameSlot, S> BufferingMechanism<F, S> {
    /// 切换到下一个帧槽位
    ///
    /// 1. 本帧期间被丢弃的对象归入刚提交的槽位
    /// 2. 前进帧环；只有会 acquire 新图像时才前进图像环
    /// 3. 等待新槽位的 fence 并 reset，reset 描述符池以及 command pool，最后 clean
    pub fn swap(&mut self, skip_acquire_new_image: bool) -> GfxResult<()> {
        let _span = tracy_client::span!("BufferingMechanism::swap");

        let retired = self.retired.try_iter().collect_vec();
        if !retired.is_empty() {
            log::trace!("{} objects retired in frame slot {}", retired.len(), self.current_frame);
            self.frames[self.current_frame].retire(retired);
        }

        self.current_frame = (self.current_frame + 1) % self.frames.len();
        if !skip_acquire_new_image {
            self.current_image_slot = (self.current_image_slot + 1) % self.image_slots.len();
        }

        let frame = &mut self.frames[self.current_frame];
        {
            let _span = tracy_client::span!("wait previous submission");
            frame.wait_for_previous_submission()?;
        }
        frame.reset_previous_submission()?;
        frame.reset_descriptor_pools()?;
        frame.reset_command_pool()?;
        frame.clean();
        Ok(())
    }
}

// destroy
impl<F: FrameSlot, S> BufferingMechanism<F, S> {
    /// 调用者保证 GPU 已经空闲；通道中剩余的对象随当前槽位一起销毁
    pub fn destroy(mut self, destroy_image_slot: impl FnMut(S)) {
        let retired = self.retired.try_iter().collect_vec();
        if !retired.is_empty() {
            self.frames[self.current_frame].retire(retired);
        }

        for frame in self.frames {
            frame.destroy();
        }
        self.image_slots.into_iter().for_each(destroy_image_slot);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use kiln_render_interface::pipeline_settings::MAX_FRAMES_IN_FLIGHT;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Wait(usize),
        ResetFence(usize),
        ResetPools(usize),
        ResetCmdPool(usize),
        Clean(usize),
        Destroyed(u32),
        SlotDestroyed(usize),
    }

    type Log = Rc<RefCell<Vec<Event>>>;

    struct MockFrame {
        slot: usize,
        copy_recording: bool,
        retired: Vec<u32>,
        log: Log,
    }

    impl FrameSlot for MockFrame {
        type Retired = u32;

        fn wait_for_previous_submission(&self) -> GfxResult<()> {
            self.log.borrow_mut().push(Event::Wait(self.slot));
            Ok(())
        }

        fn reset_previous_submission(&self) -> GfxResult<()> {
            self.log.borrow_mut().push(Event::ResetFence(self.slot));
            Ok(())
        }

        fn reset_descriptor_pools(&mut self) -> GfxResult<()> {
            self.log.borrow_mut().push(Event::ResetPools(self.slot));
            Ok(())
        }

        fn reset_command_pool(&mut self) -> GfxResult<()> {
            self.copy_recording = false;
            self.log.borrow_mut().push(Event::ResetCmdPool(self.slot));
            Ok(())
        }

        fn is_copy_recording(&self) -> bool {
            self.copy_recording
        }

        fn retire(&mut self, objects: Vec<u32>) {
            self.retired.extend(objects);
        }

        fn clean(&mut self) {
            self.log.borrow_mut().push(Event::Clean(self.slot));
            for object in self.retired.drain(..) {
                self.log.borrow_mut().push(Event::Destroyed(object));
            }
        }

        fn destroy(mut self) {
            self.clean();
        }
    }

    fn make_ring(image_count: usize) -> (BufferingMechanism<MockFrame, usize>, Log, crossbeam_channel::Sender<u32>) {
        let log = Log::default();
        let frames = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|slot| MockFrame {
                slot,
                copy_recording: true,
                retired: vec![],
                log: log.clone(),
            })
            .collect_vec();
        let (sender, receiver) = crossbeam_channel::unbounded();
        let ring = BufferingMechanism::init(frames, (0..image_count).collect_vec(), receiver).unwrap();
        (ring, log, sender)
    }

    #[test]
    fn test_init_resets_first_fence_only() {
        let (ring, log, _sender) = make_ring(3);
        assert_eq!(*log.borrow(), vec![Event::ResetFence(0)]);
        assert_eq!(ring.current_frame_index(), 0);
        assert_eq!(ring.current_image_slot_index(), 0);
    }

    #[test]
    fn test_ring_round_trip() {
        tracy_client::Client::start();
        let (mut ring, _log, _sender) = make_ring(3);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            ring.swap(false).unwrap();
        }
        assert_eq!(ring.current_frame_index(), 0);
        assert_eq!(ring.current_image_slot_index(), MAX_FRAMES_IN_FLIGHT % 3);
    }

    #[test]
    fn test_swap_order() {
        tracy_client::Client::start();
        let (mut ring, log, _sender) = make_ring(3);
        log.borrow_mut().clear();

        ring.swap(false).unwrap();
        assert_eq!(
            *log.borrow(),
            vec![Event::Wait(1), Event::ResetFence(1), Event::ResetPools(1), Event::ResetCmdPool(1), Event::Clean(1)]
        );
    }

    #[test]
    fn test_skip_acquire_keeps_image_slot() {
        tracy_client::Client::start();
        let (mut ring, _log, _sender) = make_ring(3);
        ring.swap(true).unwrap();
        assert_eq!(ring.current_frame_index(), 1);
        assert_eq!(ring.current_image_slot_index(), 0);
        assert_eq!(*ring.current_image_slot(), 0);

        ring.swap(false).unwrap();
        assert_eq!(ring.current_image_slot_index(), 1);
    }

    #[test]
    fn test_no_recording_frame_until_copy_begins() {
        tracy_client::Client::start();
        let (mut ring, _log, _sender) = make_ring(3);
        assert!(ring.recording_frame_mut().is_some());

        // command pool reset 之后，新槽位在 begin copy 之前不能录制上传
        ring.swap(false).unwrap();
        assert!(ring.recording_frame_mut().is_none());

        ring.current_frame_mut().copy_recording = true;
        assert_eq!(ring.recording_frame_mut().map(|frame| frame.slot), Some(1));
    }

    #[test]
    fn test_retired_object_destroyed_when_slot_reused() {
        tracy_client::Client::start();
        let (mut ring, log, sender) = make_ring(3);
        sender.send(42).unwrap();

        // 帧 0 提交后，42 归入槽位 0
        ring.swap(false).unwrap();
        assert!(!log.borrow().contains(&Event::Destroyed(42)));

        // 回到槽位 0，等待 fence 之后才销毁
        ring.swap(false).unwrap();
        let log = log.borrow();
        let wait = log.iter().rposition(|e| *e == Event::Wait(0)).unwrap();
        let destroyed = log.iter().position(|e| *e == Event::Destroyed(42)).unwrap();
        assert!(wait < destroyed);
    }

    #[test]
    fn test_destroy_releases_everything() {
        let (ring, log, sender) = make_ring(2);
        sender.send(7).unwrap();

        let destroyed_slots = Rc::new(RefCell::new(vec![]));
        let slots = destroyed_slots.clone();
        ring.destroy(move |slot| slots.borrow_mut().push(Event::SlotDestroyed(slot)));

        assert!(log.borrow().contains(&Event::Destroyed(7)));
        assert_eq!(*destroyed_slots.borrow(), vec![Event::SlotDestroyed(0), Event::SlotDestroyed(1)]);
    }
}
