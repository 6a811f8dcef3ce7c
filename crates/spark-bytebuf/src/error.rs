//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 为缓冲层对外暴露的全部失败语义提供集中定义：越界、构造参数非法、生命周期误用、
//!   存储类型不支持、容量上限不足以及底层传输 I/O 失败；
//! - 缓冲层内部不做任何吞错或重试，所有违约都以 [`BufferError`] 同步返回给直接调用方。
//!
//! ## 设计要求（What）
//! - 错误枚举派生 `thiserror::Error`，与 `std::error::Error` 生态兼容；
//! - 每个变体映射到稳定错误码（[`codes`]，遵循 `<领域>.<语义>` 约定）与粗粒度分类
//!   [`BufferErrorKind`]，方便上层传输/协议层据此决定关闭连接还是上抛；
//! - 传输“短读/流结束”不是错误，由 [`Transfer`](crate::Transfer) 表达，不会出现在这里。

use std::io;

use thiserror::Error;

/// 缓冲层统一的 `Result` 别名。
pub type Result<T, E = BufferError> = core::result::Result<T, E>;

/// 缓冲层错误域。
///
/// # 教案式说明
/// - **意图 (Why)**：区分“调用方传参越界”“对象生命周期被破坏”“请求了另一种存储才有的能力”
///   等本质不同的失败，避免上层通过解析字符串推断语义。
/// - **契约 (What)**：
///   - 所有变体均满足 `Send + Sync + 'static`，可跨线程传播；
///   - 失败的操作不会留下部分效果（越界检查总在读写之前完成）；
///   - [`code`](Self::code) 返回的错误码在版本间保持稳定。
/// - **设计权衡 (Trade-offs)**：`InvalidArgument` 以 `String` 携带原因，牺牲一次分配换取可读性；
///   越界错误则只携带整数字段，保证热路径上构造错误不分配。
#[derive(Debug, Error)]
pub enum BufferError {
    /// 索引或区间超出 `[0, capacity)`。
    ///
    /// - `index`：访问起点；`length`：访问宽度；`capacity`：访问时的容量。
    #[error("index out of bounds: index {index} + length {length} exceeds capacity {capacity}")]
    IndexOutOfBounds {
        index: usize,
        length: usize,
        capacity: usize,
    },

    /// 读写游标组合违反 `reader_index <= writer_index <= capacity`。
    #[error("invalid indices: reader {reader_index}, writer {writer_index}, capacity {capacity}")]
    InvalidIndex {
        reader_index: usize,
        writer_index: usize,
        capacity: usize,
    },

    /// 顺序读取请求的字节数超过可读区间。
    #[error("not enough readable bytes: requested {requested}, readable {readable}")]
    ReadableUnderflow { requested: usize, readable: usize },

    /// 构造或调整参数不满足约束，例如 `initial_capacity > max_capacity` 或包装只读区域。
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// 在引用计数已归零（或为负）时执行 `acquire`/`release`。
    #[error("illegal reference count: {ref_cnt}")]
    IllegalRefCount { ref_cnt: isize },

    /// 通过已释放缓冲的视图访问存储。
    #[error("buffer storage has already been released")]
    Released,

    /// 请求只对另一种存储类型有意义的能力，例如向直接缓冲索要堆数组。
    #[error("operation `{operation}` is not supported for this storage kind")]
    Unsupported { operation: &'static str },

    /// 写入需要的容量超过 `max_capacity`。
    #[error("cannot grow to {required} bytes: max capacity is {max_capacity}")]
    InsufficientCapacity {
        required: usize,
        max_capacity: usize,
    },

    /// 与外部流/通道交换字节时底层 I/O 失败。
    #[error("transport I/O failure: {0}")]
    Io(#[from] io::Error),
}

/// 错误的粗粒度分类，对应缓冲层约定的五类失败。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BufferErrorKind {
    /// 越界访问。
    Bounds,
    /// 构造/调整参数非法。
    InvalidArgument,
    /// 生命周期误用（引用计数非法或访问已释放存储），属于编程错误。
    IllegalLifecycle,
    /// 当前存储类型不支持的操作。
    Unsupported,
    /// 外部传输失败。
    Io,
}

impl BufferError {
    /// 构造越界错误。
    pub(crate) fn out_of_bounds(index: usize, length: usize, capacity: usize) -> Self {
        BufferError::IndexOutOfBounds {
            index,
            length,
            capacity,
        }
    }

    /// 构造参数错误。
    pub(crate) fn invalid_argument(reason: impl Into<String>) -> Self {
        BufferError::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// 构造“存储类型不支持”错误。
    pub(crate) fn unsupported(operation: &'static str) -> Self {
        BufferError::Unsupported { operation }
    }

    /// 返回稳定错误码。
    pub fn code(&self) -> &'static str {
        match self {
            BufferError::IndexOutOfBounds { .. } => codes::INDEX_OUT_OF_BOUNDS,
            BufferError::InvalidIndex { .. } => codes::INVALID_INDEX,
            BufferError::ReadableUnderflow { .. } => codes::READABLE_UNDERFLOW,
            BufferError::InvalidArgument { .. } => codes::INVALID_ARGUMENT,
            BufferError::IllegalRefCount { .. } => codes::ILLEGAL_REF_COUNT,
            BufferError::Released => codes::RELEASED,
            BufferError::Unsupported { .. } => codes::UNSUPPORTED,
            BufferError::InsufficientCapacity { .. } => codes::INSUFFICIENT_CAPACITY,
            BufferError::Io(_) => codes::TRANSPORT_IO,
        }
    }

    /// 返回错误分类。
    ///
    /// `InsufficientCapacity` 归入 [`BufferErrorKind::Bounds`]：它是写入越过 `max_capacity`
    /// 这一硬上界的结果。
    pub fn kind(&self) -> BufferErrorKind {
        match self {
            BufferError::IndexOutOfBounds { .. }
            | BufferError::InvalidIndex { .. }
            | BufferError::ReadableUnderflow { .. }
            | BufferError::InsufficientCapacity { .. } => BufferErrorKind::Bounds,
            BufferError::InvalidArgument { .. } => BufferErrorKind::InvalidArgument,
            BufferError::IllegalRefCount { .. } | BufferError::Released => {
                BufferErrorKind::IllegalLifecycle
            }
            BufferError::Unsupported { .. } => BufferErrorKind::Unsupported,
            BufferError::Io(_) => BufferErrorKind::Io,
        }
    }

    /// 是否属于生命周期误用。这类错误代表编程缺陷，调用方应向上传播而不是吞掉。
    pub fn is_lifecycle_violation(&self) -> bool {
        self.kind() == BufferErrorKind::IllegalLifecycle
    }
}

/// 缓冲层错误码常量，供日志与指标使用稳定识别符。
pub mod codes {
    /// 索引越界。
    pub const INDEX_OUT_OF_BOUNDS: &str = "buffer.index_out_of_bounds";
    /// 读写游标组合非法。
    pub const INVALID_INDEX: &str = "buffer.invalid_index";
    /// 可读字节不足。
    pub const READABLE_UNDERFLOW: &str = "buffer.readable_underflow";
    /// 构造参数非法。
    pub const INVALID_ARGUMENT: &str = "buffer.invalid_argument";
    /// 引用计数非法。
    pub const ILLEGAL_REF_COUNT: &str = "buffer.illegal_ref_count";
    /// 存储已释放。
    pub const RELEASED: &str = "buffer.released";
    /// 存储类型不支持该操作。
    pub const UNSUPPORTED: &str = "buffer.unsupported";
    /// 超过最大容量。
    pub const INSUFFICIENT_CAPACITY: &str = "buffer.insufficient_capacity";
    /// 外部传输 I/O 失败。
    pub const TRANSPORT_IO: &str = "transport.io";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_kinds_are_stable() {
        let err = BufferError::out_of_bounds(4, 4, 6);
        assert_eq!(err.code(), codes::INDEX_OUT_OF_BOUNDS);
        assert_eq!(err.kind(), BufferErrorKind::Bounds);
        assert_eq!(
            err.to_string(),
            "index out of bounds: index 4 + length 4 exceeds capacity 6"
        );

        let err = BufferError::IllegalRefCount { ref_cnt: 0 };
        assert!(err.is_lifecycle_violation());
        assert_eq!(err.code(), codes::ILLEGAL_REF_COUNT);

        assert!(BufferError::Released.is_lifecycle_violation());
        assert_eq!(
            BufferError::unsupported("array").kind(),
            BufferErrorKind::Unsupported
        );
    }

    #[test]
    fn io_errors_convert_through_question_mark() {
        fn fail() -> Result<()> {
            Err(io::Error::other("boom"))?;
            Ok(())
        }
        let err = fail().expect_err("I/O 错误应被转换");
        assert_eq!(err.code(), codes::TRANSPORT_IO);
        assert_eq!(err.kind(), BufferErrorKind::Io);
    }
}
