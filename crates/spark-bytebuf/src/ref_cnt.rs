//! 缓冲存储共享的原子引用计数。
//!
//! # 设计背景（Why）
//! - 同一块存储会被 `duplicate()` 产生的多个视图别名，所有别名必须就“何时销毁”达成一致，
//!   引用计数是唯一的裁决机制；
//! - 缓冲可能跨越异步边界交接给其他线程，普通整型的读-改-写会丢失更新，因此计数一律使用原子类型。
//!
//! # 逻辑解析（How）
//! - `retain`/`release` 都以 CAS 循环实现：先读取当前值，若已 `<= 0` 则立即失败，
//!   否则尝试写入新值，竞争失败时以最新观测值重试；
//! - `release` 返回 `true` 表示本次调用把计数降到 0，调用方需且仅需在此时释放存储。
//!
//! 在 `loom-model` 特性与 `cfg(spark_loom)` 同时开启时改用 loom 原子类型，供模型检查穷举交错。

#[cfg(all(feature = "loom-model", any(loom, spark_loom)))]
use loom::sync::atomic::{AtomicIsize, Ordering};
#[cfg(not(all(feature = "loom-model", any(loom, spark_loom))))]
use std::sync::atomic::{AtomicIsize, Ordering};

use crate::error::{BufferError, Result};

pub(crate) struct RefCnt {
    count: AtomicIsize,
}

impl RefCnt {
    /// 创建计数为 1 的计数器，代表创建者自身。
    pub(crate) fn new() -> Self {
        Self {
            count: AtomicIsize::new(1),
        }
    }

    pub(crate) fn get(&self) -> isize {
        self.count.load(Ordering::Acquire)
    }

    /// 计数加一，返回新值。
    pub(crate) fn retain(&self) -> Result<isize> {
        let mut current = self.count.load(Ordering::Acquire);
        loop {
            if current <= 0 {
                return Err(BufferError::IllegalRefCount { ref_cnt: current });
            }
            let next = current
                .checked_add(1)
                .ok_or(BufferError::IllegalRefCount { ref_cnt: current })?;
            match self.count.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(next),
                Err(observed) => current = observed,
            }
        }
    }

    /// 计数减一；降到 0 时返回 `true`。
    pub(crate) fn release(&self) -> Result<bool> {
        let mut current = self.count.load(Ordering::Acquire);
        loop {
            if current <= 0 {
                return Err(BufferError::IllegalRefCount { ref_cnt: current });
            }
            match self.count.compare_exchange_weak(
                current,
                current - 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(current == 1),
                Err(observed) => current = observed,
            }
        }
    }
}

impl core::fmt::Debug for RefCnt {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_tuple("RefCnt").field(&self.get()).finish()
    }
}
