//! 被上层丢弃、但 GPU 可能仍在使用的对象
//!
//! 对象通过 [`Deferred`](kiln_gfx::resources::deferred::Deferred) 的 drop 进入通道，
//! 每帧 swap 时归入刚提交的帧槽位，等到该槽位的 fence 再次完成时销毁。

use crossbeam_channel::{Receiver, Sender};
use kiln_gfx::resources::buffer::GfxBuffer;
use kiln_gfx::resources::deferred::Deferred;
use kiln_gfx::resources::image::GfxImage;

pub enum RetiredObject {
    Buffer(GfxBuffer),
    Image(GfxImage),
}

impl From<GfxBuffer> for RetiredObject {
    fn from(value: GfxBuffer) -> Self {
        Self::Buffer(value)
    }
}

impl From<GfxImage> for RetiredObject {
    fn from(value: GfxImage) -> Self {
        Self::Image(value)
    }
}

/// 可以被帧槽位延迟销毁的对象
pub trait Retire {
    fn retire(self);
}

impl Retire for RetiredObject {
    fn retire(self) {
        match self {
            Self::Buffer(buffer) => buffer.destroy(),
            Self::Image(image) => image.destroy(),
        }
    }
}

pub type DeferredBuffer = Deferred<GfxBuffer, RetiredObject>;
pub type DeferredImage = Deferred<GfxImage, RetiredObject>;

/// 回收通道，生命周期与后端相同，跨越交换链的重建
pub struct RetirementQueue<T> {
    sender: Sender<T>,
    receiver: Receiver<T>,
}

impl<T> Default for RetirementQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RetirementQueue<T> {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }

    #[inline]
    pub fn sender(&self) -> Sender<T> {
        self.sender.clone()
    }

    #[inline]
    pub fn receiver(&self) -> Receiver<T> {
        self.receiver.clone()
    }

    /// 取出目前为止进入通道的所有对象
    pub fn drain(&self) -> Vec<T> {
        self.receiver.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_collects_in_order() {
        let queue = RetirementQueue::<u32>::new();
        let sender = queue.sender();
        sender.send(1).unwrap();
        sender.send(2).unwrap();
        assert_eq!(queue.drain(), vec![1, 2]);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn test_deferred_goes_through_queue() {
        #[derive(Debug, PartialEq)]
        struct Retired(u32);
        impl From<u32> for Retired {
            fn from(value: u32) -> Self {
                Retired(value)
            }
        }

        let queue = RetirementQueue::<Retired>::new();
        drop(Deferred::new(5_u32, queue.sender()));
        assert_eq!(queue.drain(), vec![Retired(5)]);
    }
}
