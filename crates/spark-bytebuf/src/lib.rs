//! `spark-bytebuf` 提供网络 I/O 框架共享的字节缓冲层。
//!
//! # 模块定位（Why）
//! - 协议编解码、流水线与传输实现都需要同一种可索引、可扩容、字节序感知的内存容器；
//! - 传输层还需要确定性释放的原生内存与零拷贝视图，而这些细节不应暴露给协议代码。
//!
//! # 设计概要（How）
//! - [`ByteBuf`] 定义双游标契约与全部读写/搬运操作，协议代码只依赖它；
//! - [`HeapByteBuf`] 以托管数组承载，[`DirectByteBuf`] 以原生区域承载并显式引用计数；
//! - [`unsafe_buf::UnsafeByteBuf`] 把引用计数、原始视图与同类缓冲工厂单独开放给传输层，
//!   它不在 crate 根部导出，协议代码拿到的 `&mut dyn ByteBuf` 也无法升级为该能力；
//! - 字节序以类型参数（[`BigEndian`]/[`LittleEndian`]）固定在具体缓冲上。
//!
//! # 并发约定（What）
//! - 内容读写不加锁：任一时刻只允许一个执行上下文写入同一存储（含其全部别名）；
//! - 存储槽位以 `arc-swap` 快照共享，别名可以移交到其它线程，容量调整与释放不会回收仍在被访问的存储；
//! - 引用计数是原子的，`acquire`/`release` 可以跨线程进行，存储只会被释放一次。

mod byte_buf;
pub mod config;
mod direct;
pub mod error;
mod heap;
mod order;
mod ref_cnt;
mod slot;
pub mod unsafe_buf;

pub use byte_buf::{ByteBuf, DEFAULT_MAX_CAPACITY, Transfer};
pub use config::{BufferConfig, StorageKind};
pub use direct::{DirectByteBuf, ForeignRegion};
pub use error::{BufferError, BufferErrorKind, Result};
pub use heap::HeapByteBuf;
pub use order::{BigEndian, ByteOrder, Endianness, LittleEndian};

mod sealed {
    pub trait Sealed {}
}
