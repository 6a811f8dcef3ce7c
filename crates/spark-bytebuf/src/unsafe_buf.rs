//! 传输层专用的低层访问能力。
//!
//! # 使用约定（What）
//! - 本模块不在 crate 根部导出；只有显式 `use spark_bytebuf::unsafe_buf::UnsafeByteBuf` 的传输组件
//!   才能调用引用计数与原始视图；
//! - 能力随类型传递：[`BufferConfig::allocate`](crate::BufferConfig::allocate) 与
//!   [`UnsafeByteBuf::new_buffer`] 返回 `Box<dyn UnsafeByteBuf>`，由传输层持有；交给协议代码的是
//!   `&mut dyn ByteBuf`，后者没有任何途径升级回本能力。
//!
//! ```compile_fail
//! use spark_bytebuf::ByteBuf;
//!
//! fn decode(buf: &mut dyn ByteBuf) {
//!     // 协议代码看不到引用计数。
//!     let _ = buf.release();
//! }
//! ```
//!
//! ```
//! use spark_bytebuf::{BufferConfig, ByteBuf, unsafe_buf::UnsafeByteBuf};
//!
//! fn decode(buf: &mut dyn ByteBuf) -> spark_bytebuf::Result<i16> {
//!     buf.read_i16()
//! }
//!
//! let mut buf = BufferConfig::direct().with_capacity(8, 8).allocate()?;
//! buf.write_i16(7)?;
//! assert_eq!(decode(&mut *buf)?, 7);
//! assert!(buf.release()?);
//! # Ok::<(), spark_bytebuf::BufferError>(())
//! ```

use std::io::IoSlice;

use crate::{byte_buf::ByteBuf, error::Result};

/// `UnsafeByteBuf` 是仅面向传输层的低层访问能力。
///
/// # 设计背景（Why）
/// - 协议与业务代码只需要 [`ByteBuf`] 契约；引用计数、原始视图与“同类缓冲工厂”只对负责搬运字节的
///   传输层有意义，单独成 trait 可避免这些能力渗入公共契约；
/// - 持有 `Box<dyn UnsafeByteBuf>` 的组件即拥有此能力，其余组件只拿到 `&mut dyn ByteBuf`。
///
/// # 契约说明（What）
/// - `acquire`/`release` 在计数 `<= 0` 时返回 [`BufferError::IllegalRefCount`](crate::BufferError::IllegalRefCount)；
/// - `release` 返回 `true` 表示本次调用把计数降到 0 并释放了存储，所有别名随后访问都会失败；
/// - 视图均为瞬时切片，仅在下一次容量调整或释放之前有效。
pub trait UnsafeByteBuf: ByteBuf {
    /// 当前引用计数。
    fn ref_cnt(&self) -> isize;

    /// 计数加一，使缓冲在创建者用完之后继续存活。
    fn acquire(&self) -> Result<()>;

    /// 计数减一；降到 0 时释放存储并返回 `true`。外部区域只失效，不回收。
    fn release(&mut self) -> Result<bool>;

    /// 在 `[index, index + length)` 上合成只读视图，供写出到传输。
    ///
    /// # Safety
    /// 视图存活期间，调用方不得通过本缓冲或其任何别名写入、调整容量或释放存储。
    unsafe fn read_view(&self, index: usize, length: usize) -> Result<&[u8]>;

    /// 在 `[index, index + length)` 上合成可写视图，供从传输读入。
    ///
    /// # Safety
    /// 视图存活期间，调用方不得通过任何别名访问同一存储。
    unsafe fn write_view(&mut self, index: usize, length: usize) -> Result<&mut [u8]>;

    /// 按段枚举 `[index, index + length)` 的只读视图，便于直接交给向量化写。
    ///
    /// 连续存储只产生一个段。
    ///
    /// # Safety
    /// 与 [`read_view`](Self::read_view) 相同。
    unsafe fn read_views(&self, index: usize, length: usize) -> Result<Vec<IoSlice<'_>>> {
        // SAFETY: 约束由调用方继承。
        let view = unsafe { self.read_view(index, length)? };
        Ok(vec![IoSlice::new(view)])
    }

    /// 创建同一存储类型与字节序的新缓冲，容量上限取 `max(initial_capacity, max_capacity())`。
    fn new_buffer(&self, initial_capacity: usize) -> Result<Box<dyn UnsafeByteBuf>>;

    /// 按摊还策略丢弃已消费区：全部读尽时总是压缩；否则只有已消费区至少占容量一半时才压缩。
    fn discard_some_read_bytes(&mut self) -> Result<()>;
}

impl std::fmt::Debug for dyn UnsafeByteBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        crate::byte_buf::describe("UnsafeByteBuf", self, f)
    }
}
