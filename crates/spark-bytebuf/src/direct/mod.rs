//! 原生（直接）内存缓冲。
//!
//! # 模块定位（Why）
//! - 传输层在缓冲与外部传输之间搬运字节时，需要一块不受托管回收约束、基址稳定的内存；
//! - 原生区域的释放必须是确定性的，且在多个别名视图之间只发生一次。
//!
//! # 结构概览（How）
//! - [`region`]：区域句柄。自有区域通过 `std::alloc` 分配与释放，外部区域（[`ForeignRegion`]）
//!   只被读写，永不释放；
//! - [`buffer`]：[`DirectByteBuf`]，在区域之上实现游标、容量调整与引用计数生命周期。

mod buffer;
mod region;

pub use buffer::DirectByteBuf;
pub use region::ForeignRegion;
