//! 别名之间共享的存储槽位。
//!
//! # 设计初衷（Why）
//! - `duplicate()` 产生的别名可以被移交到其它线程，而任一别名都可能调整容量或释放存储；
//!   读路径必须保证在一次访问期间底层内存不会被回收；
//! - 读多写少，因此复用 [`arc-swap`](https://crates.io/crates/arc-swap) 的锁自由快照，而不是给每次读写加锁。
//!
//! # 逻辑解析（How）
//! - 槽位保存 `Option<Arc<S>>`：`None` 表示存储已经释放；
//! - 读写原语在 `load()` 得到的快照上执行，快照存活期间旧存储不会被回收；
//! - 容量调整以 CAS 提交新存储，与并发的调整或释放竞争失败时基于最新快照重试；
//! - 跨缓冲搬运通过 [`PinnedRegion`] 持有对端存储的一份 `Arc`。

use std::sync::Arc;

use arc_swap::ArcSwapOption;

use crate::{
    byte_buf::{PinnedRegion, RawRegion},
    error::{BufferError, Result},
};

/// 可以放入槽位的连续存储。
pub(crate) trait Storage: Send + Sync + 'static {
    fn raw(&self) -> RawRegion;

    fn len(&self) -> usize;
}

pub(crate) struct StorageSlot<S> {
    current: ArcSwapOption<S>,
}

impl<S: Storage> StorageSlot<S> {
    pub(crate) fn new(storage: S) -> Self {
        Self {
            current: ArcSwapOption::from_pointee(storage),
        }
    }

    /// 在当前快照上执行 `f`；存储已释放时返回 `None`。
    pub(crate) fn inspect<R>(&self, f: impl FnOnce(&S) -> R) -> Option<R> {
        let guard = self.current.load();
        guard.as_deref().map(f)
    }

    /// 在当前快照的原始区域上执行 `f`，快照在 `f` 返回前保持存活。
    pub(crate) fn with_raw<R>(&self, f: impl FnOnce(RawRegion) -> Result<R>) -> Result<R> {
        self.inspect(|storage| f(storage.raw()))
            .unwrap_or(Err(BufferError::Released))
    }

    pub(crate) fn capacity(&self) -> usize {
        self.inspect(S::len).unwrap_or(0)
    }

    pub(crate) fn pin(&self) -> Result<PinnedRegion> {
        self.current
            .load_full()
            .map(PinnedRegion::new)
            .ok_or(BufferError::Released)
    }

    /// 以 `build` 基于当前存储构造替代品并提交，返回被替换的存储。
    ///
    /// 提交期间槽位被其它别名改动时，基于最新快照重新构造；槽位已被释放时返回
    /// [`BufferError::Released`]。
    pub(crate) fn replace_with(&self, mut build: impl FnMut(&S) -> Result<S>) -> Result<Arc<S>> {
        loop {
            let current = self.current.load_full().ok_or(BufferError::Released)?;
            let fresh = Arc::new(build(&current)?);
            let expected = Some(Arc::clone(&current));
            let previous = self.current.compare_and_swap(&expected, Some(fresh));
            if matches!(&*previous, Some(prev) if Arc::ptr_eq(prev, &current)) {
                return Ok(current);
            }
        }
    }

    /// 清空槽位；仍在进行中的访问持有的快照在其结束后才回收存储。
    pub(crate) fn take(&self) -> Option<Arc<S>> {
        self.current.swap(None)
    }
}

#[cfg(all(test, not(all(feature = "loom-model", any(loom, spark_loom)))))]
mod tests {
    use super::*;

    struct Fixed(Box<[u8; 4]>);

    impl Storage for Fixed {
        fn raw(&self) -> RawRegion {
            // SAFETY: 测试只读取这块内存。
            unsafe { RawRegion::new(self.0.as_ptr().cast_mut(), self.0.len()) }
        }

        fn len(&self) -> usize {
            self.0.len()
        }
    }

    #[test]
    fn snapshot_outlives_take() {
        let slot = StorageSlot::new(Fixed(Box::new([1, 2, 3, 4])));
        let pinned = slot.pin().expect("槽位有存储");
        assert!(slot.take().is_some());
        assert_eq!(slot.capacity(), 0);
        assert!(matches!(slot.with_raw(|_| Ok(())), Err(BufferError::Released)));

        let mut out = [0u8; 4];
        pinned.raw().read(0, &mut out).expect("钉住的存储仍然有效");
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn replace_with_fails_after_take() {
        let slot = StorageSlot::new(Fixed(Box::new([0; 4])));
        let previous = slot
            .replace_with(|_| Ok(Fixed(Box::new([9; 4]))))
            .expect("替换");
        assert_eq!(previous.0[0], 0);
        slot.take();
        assert!(matches!(
            slot.replace_with(|_| Ok(Fixed(Box::new([7; 4])))),
            Err(BufferError::Released)
        ));
    }
}
