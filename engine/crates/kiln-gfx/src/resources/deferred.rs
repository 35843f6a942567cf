//! 延迟销毁
//!
//! GPU 可能仍在使用被丢弃的对象，因此 [`Deferred`] 在 drop 时不直接销毁，
//! 而是把对象送进回收通道，由帧循环在对应的 fence 完成后销毁。

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use crossbeam_channel::Sender;

/// 持有 `T`，drop 时将其转换为 `R` 并发送到回收通道
pub struct Deferred<T: Into<R>, R> {
    value: Option<T>,
    sender: Sender<R>,
    _marker: PhantomData<R>,
}

impl<T: Into<R>, R> Deferred<T, R> {
    pub fn new(value: T, sender: Sender<R>) -> Self {
        Self {
            value: Some(value),
            sender,
            _marker: PhantomData,
        }
    }

    /// 取回对象，不再进入回收通道
    pub fn into_inner(mut self) -> T {
        match self.value.take() {
            Some(value) => value,
            None => unreachable!("Deferred value is only taken once"),
        }
    }
}

impl<T: Into<R>, R> Deref for Deferred<T, R> {
    type Target = T;
    fn deref(&self) -> &T {
        match &self.value {
            Some(value) => value,
            None => unreachable!("Deferred value is only taken on drop"),
        }
    }
}

impl<T: Into<R>, R> DerefMut for Deferred<T, R> {
    fn deref_mut(&mut self) -> &mut T {
        match &mut self.value {
            Some(value) => value,
            None => unreachable!("Deferred value is only taken on drop"),
        }
    }
}

impl<T: Into<R>, R> Drop for Deferred<T, R> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            if self.sender.send(value.into()).is_err() {
                // 接收端已经关闭，只能在这里直接丢弃
                log::warn!("retirement channel closed, object dropped without deferred destruction");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Retired {
        Number(u32),
    }

    impl From<u32> for Retired {
        fn from(value: u32) -> Self {
            Retired::Number(value)
        }
    }

    #[test]
    fn test_drop_sends_to_channel() {
        let (sender, receiver) = crossbeam_channel::unbounded::<Retired>();
        {
            let mut deferred = Deferred::new(7_u32, sender.clone());
            *deferred += 1;
            assert_eq!(*deferred, 8);
            assert!(receiver.try_recv().is_err());
        }
        assert_eq!(receiver.try_recv(), Ok(Retired::Number(8)));
    }

    #[test]
    fn test_into_inner_skips_channel() {
        let (sender, receiver) = crossbeam_channel::unbounded::<Retired>();
        let deferred = Deferred::new(3_u32, sender);
        assert_eq!(deferred.into_inner(), 3);
        assert!(receiver.try_recv().is_err());
    }
}
