use std::{
    fmt,
    io::{self, IoSlice, IoSliceMut, Read, Write},
    ptr::{self, NonNull},
    slice,
    sync::Arc,
};

use bytes::Bytes;

use crate::{
    error::{BufferError, Result},
    order::ByteOrder,
    slot::Storage,
};

/// 未显式指定时的最大容量，与 32 位有符号长度上限对齐。
pub const DEFAULT_MAX_CAPACITY: usize = i32::MAX as usize;

/// 首次按需扩容时的最小容量。
const GROWTH_FLOOR: usize = 64;

/// 与外部流/通道交换字节的结果。
///
/// - `Bytes(n)`：本次实际搬运的字节数，读取时可能小于请求值（短读）；
/// - `EndOfStream`：对端已到达流末尾或连接已断开，这不是错误。
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Transfer {
    Bytes(usize),
    EndOfStream,
}

impl Transfer {
    /// 实际搬运的字节数；流结束视为 0。
    pub fn bytes(&self) -> usize {
        match self {
            Transfer::Bytes(n) => *n,
            Transfer::EndOfStream => 0,
        }
    }

    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Transfer::EndOfStream)
    }
}

/// `ByteBuf` 定义了对象安全的可索引字节缓冲契约。
///
/// # 设计背景（Why）
/// - **框架定位**：协议编解码、流水线与传输层共享同一种内存容器；协议/业务代码只能看到本契约，
///   原生内存、引用计数等细节由 [`UnsafeByteBuf`](crate::unsafe_buf::UnsafeByteBuf) 单独暴露给传输层。
/// - **游标模型**：采用双游标划分存储，`[0, reader_index)` 为已消费区，
///   `[reader_index, writer_index)` 为可读内容，`[writer_index, capacity)` 为可写空间。
///
/// # 逻辑解析（How）
/// - 实现者只需提供容量/游标、切片级批量读写、跨缓冲与跨传输的搬运、`duplicate`/`copy` 等原语；
/// - 定宽访问器（`get_i32` 等）与顺序读写（`read_*`/`write_*`）以默认方法形式构建在原语之上，
///   统一经由 [`ByteOrder`] 完成字节序转换，保证两种存储的数值编码完全一致。
///
/// # 契约说明（What）
/// - **不变式**：任何操作之后 `0 <= reader_index <= writer_index <= capacity <= max_capacity`；
///   违反约束的操作直接失败，不做静默截断（容量收缩对游标的钳制除外）。
/// - **越界**：`index + width > capacity` 时返回 [`BufferError::IndexOutOfBounds`]，且不产生部分写入。
/// - **零长度**：批量搬运长度为 0 时直接返回，不触碰目标或传输。
///
/// # 设计考量（Trade-offs & Gotchas）
/// - **并发**：内容读写不加锁，同一时刻只允许一个执行上下文写入某块存储（包括其所有别名视图）；
///   存储本身以快照方式共享，任一别名调整容量或释放时，其它线程上进行中的访问仍读写旧存储，
///   旧存储在这些访问结束后才回收。
/// - **别名**：`duplicate()` 共享存储，任一视图调整容量后，其它视图的游标可能超出新容量，
///   后续访问仍会经过越界检查。
pub trait ByteBuf: Send + 'static {
    /// 当前可寻址长度。
    fn capacity(&self) -> usize;

    /// 容量永远无法超过的上界，构造后不可变。
    fn max_capacity(&self) -> usize;

    /// 调整容量，参数必须位于 `[0, max_capacity]`。
    ///
    /// 收缩时若 `reader_index < new_capacity`，`writer_index` 被钳制到 `new_capacity`；
    /// 否则两个游标都被重置为 `new_capacity`。
    fn set_capacity(&mut self, new_capacity: usize) -> Result<()>;

    fn reader_index(&self) -> usize;

    fn writer_index(&self) -> usize;

    /// 同时设置两个游标，要求 `reader_index <= writer_index <= capacity`。
    fn set_index(&mut self, reader_index: usize, writer_index: usize) -> Result<()>;

    /// 多字节访问器使用的字节序，由具体变体固定。
    fn order(&self) -> ByteOrder;

    /// 是否由原生（直接）内存承载。
    fn is_direct(&self) -> bool;

    /// 是否能直接暴露底层堆数组。
    fn has_array(&self) -> bool;

    /// 返回整个底层堆数组（长度等于容量）。
    ///
    /// 原生内存缓冲返回 [`BufferError::Unsupported`]。
    ///
    /// # Safety
    /// 返回切片存活期间，调用方不得通过该缓冲或其任何别名调整容量、释放存储或写入数据。
    unsafe fn array(&self) -> Result<&[u8]>;

    /// 返回整个底层堆数组的可变视图。
    ///
    /// # Safety
    /// 返回切片存活期间，调用方不得通过任何别名访问同一存储。
    unsafe fn array_mut(&mut self) -> Result<&mut [u8]>;

    /// 是否由单块原生内存承载并可提供基址。
    fn has_memory_address(&self) -> bool;

    /// 原生区域的基址；堆缓冲返回 [`BufferError::Unsupported`]，已释放返回 [`BufferError::Released`]。
    ///
    /// 指针仅在下一次容量调整或释放前有效。
    fn memory_address(&self) -> Result<NonNull<u8>>;

    /// 将 `[index, index + dst.len())` 复制到 `dst`。
    fn get_slice(&self, index: usize, dst: &mut [u8]) -> Result<()>;

    /// 将 `src` 写入 `[index, index + src.len())`。
    fn set_slice(&mut self, index: usize, src: &[u8]) -> Result<()>;

    /// 将本缓冲 `[index, index + length)` 搬运到 `dst` 的 `[dst_index, dst_index + length)`。
    ///
    /// 目标拥有原生基址或堆数组时直接在两块存储之间复制；其余情况走通用切片路径。
    fn get_bytes_to_buf(
        &self,
        index: usize,
        dst: &mut dyn ByteBuf,
        dst_index: usize,
        length: usize,
    ) -> Result<()>;

    /// 从 `src` 的 `[src_index, src_index + length)` 搬运到本缓冲 `[index, index + length)`。
    fn set_bytes_from_buf(
        &mut self,
        index: usize,
        src: &dyn ByteBuf,
        src_index: usize,
        length: usize,
    ) -> Result<()>;

    /// 将 `[index, index + length)` 完整写入输出流。
    fn get_bytes_to_writer(&self, index: usize, out: &mut dyn Write, length: usize)
    -> Result<()>;

    /// 从输入流执行一次读取，最多填充 `length` 字节到 `index` 处。
    fn set_bytes_from_reader(
        &mut self,
        index: usize,
        input: &mut dyn Read,
        length: usize,
    ) -> Result<Transfer>;

    /// 以一次向量化写把 `[index, index + length)` 交给通道式传输，返回实际写出的字节数。
    fn get_bytes_to_channel(
        &self,
        index: usize,
        out: &mut dyn Write,
        length: usize,
    ) -> Result<Transfer>;

    /// 以一次向量化读从通道式传输填充 `[index, index + length)`。
    fn set_bytes_from_channel(
        &mut self,
        index: usize,
        input: &mut dyn Read,
        length: usize,
    ) -> Result<Transfer>;

    /// 返回共享存储与字节序、游标独立的新视图。
    fn duplicate(&self) -> Box<dyn ByteBuf>;

    /// 深拷贝 `[index, index + length)` 到独立的新缓冲，新缓冲 `writer_index == length`。
    fn copy(&self, index: usize, length: usize) -> Result<Box<dyn ByteBuf>>;

    /// 丢弃已消费区：将可读内容平移到偏移 0 并同步调整游标。
    fn discard_read_bytes(&mut self) -> Result<()>;

    /// 钉住当前连续存储，供另一缓冲在一次搬运期间直接复制。
    ///
    /// 返回 `None` 的实现只走通用切片路径；本 crate 之外的实现无法构造 [`PinnedRegion`]。
    #[doc(hidden)]
    fn pin_region(&self) -> Result<Option<PinnedRegion>> {
        Ok(None)
    }

    fn set_reader_index(&mut self, reader_index: usize) -> Result<()> {
        let writer_index = self.writer_index();
        self.set_index(reader_index, writer_index)
    }

    fn set_writer_index(&mut self, writer_index: usize) -> Result<()> {
        let reader_index = self.reader_index();
        self.set_index(reader_index, writer_index)
    }

    fn readable_bytes(&self) -> usize {
        self.writer_index() - self.reader_index()
    }

    fn writable_bytes(&self) -> usize {
        self.capacity().saturating_sub(self.writer_index())
    }

    fn is_readable(&self) -> bool {
        self.readable_bytes() > 0
    }

    fn is_writable(&self) -> bool {
        self.writable_bytes() > 0
    }

    /// 将两个游标归零，不改动内容。
    fn clear(&mut self) -> Result<()> {
        self.set_index(0, 0)
    }

    /// 校验 `[index, index + length)` 位于当前容量之内。
    fn ensure_accessible(&self, index: usize, length: usize) -> Result<()> {
        check_range(index, length, self.capacity())
    }

    /// 确保至少还有 `min_writable` 字节可写，必要时按倍增策略扩容（封顶 `max_capacity`）。
    fn ensure_writable(&mut self, min_writable: usize) -> Result<()> {
        if min_writable <= self.writable_bytes() {
            return Ok(());
        }
        let max_capacity = self.max_capacity();
        let required = self
            .writer_index()
            .checked_add(min_writable)
            .filter(|required| *required <= max_capacity)
            .ok_or(BufferError::InsufficientCapacity {
                required: self.writer_index().saturating_add(min_writable),
                max_capacity,
            })?;
        self.set_capacity(grown_capacity(self.capacity(), required, max_capacity))
    }

    fn get_u8(&self, index: usize) -> Result<u8> {
        let mut raw = [0u8; 1];
        self.get_slice(index, &mut raw)?;
        Ok(raw[0])
    }

    fn get_i8(&self, index: usize) -> Result<i8> {
        self.get_u8(index).map(|value| value as i8)
    }

    fn get_u16(&self, index: usize) -> Result<u16> {
        let mut raw = [0u8; 2];
        self.get_slice(index, &mut raw)?;
        Ok(self.order().read_u16(raw))
    }

    fn get_i16(&self, index: usize) -> Result<i16> {
        self.get_u16(index).map(|value| value as i16)
    }

    /// 读取 3 字节无符号整数（unsigned medium）。
    fn get_u24(&self, index: usize) -> Result<u32> {
        let mut raw = [0u8; 3];
        self.get_slice(index, &mut raw)?;
        Ok(self.order().read_u24(raw))
    }

    fn get_u32(&self, index: usize) -> Result<u32> {
        let mut raw = [0u8; 4];
        self.get_slice(index, &mut raw)?;
        Ok(self.order().read_u32(raw))
    }

    fn get_i32(&self, index: usize) -> Result<i32> {
        self.get_u32(index).map(|value| value as i32)
    }

    fn get_i64(&self, index: usize) -> Result<i64> {
        let mut raw = [0u8; 8];
        self.get_slice(index, &mut raw)?;
        Ok(self.order().read_u64(raw) as i64)
    }

    fn set_u8(&mut self, index: usize, value: u8) -> Result<()> {
        self.set_slice(index, &[value])
    }

    fn set_i16(&mut self, index: usize, value: i16) -> Result<()> {
        let raw = self.order().write_u16(value as u16);
        self.set_slice(index, &raw)
    }

    /// 写入 `value` 的低 24 位（medium）。
    fn set_u24(&mut self, index: usize, value: u32) -> Result<()> {
        let raw = self.order().write_u24(value);
        self.set_slice(index, &raw)
    }

    fn set_i32(&mut self, index: usize, value: i32) -> Result<()> {
        let raw = self.order().write_u32(value as u32);
        self.set_slice(index, &raw)
    }

    fn set_i64(&mut self, index: usize, value: i64) -> Result<()> {
        let raw = self.order().write_u64(value as u64);
        self.set_slice(index, &raw)
    }

    /// 前移读游标 `length` 字节。
    fn skip_bytes(&mut self, length: usize) -> Result<()> {
        check_readable(&*self, length)?;
        let reader_index = self.reader_index() + length;
        self.set_reader_index(reader_index)
    }

    fn read_u8(&mut self) -> Result<u8> {
        check_readable(&*self, 1)?;
        let value = self.get_u8(self.reader_index())?;
        self.skip_bytes(1)?;
        Ok(value)
    }

    fn read_i16(&mut self) -> Result<i16> {
        check_readable(&*self, 2)?;
        let value = self.get_i16(self.reader_index())?;
        self.skip_bytes(2)?;
        Ok(value)
    }

    fn read_u24(&mut self) -> Result<u32> {
        check_readable(&*self, 3)?;
        let value = self.get_u24(self.reader_index())?;
        self.skip_bytes(3)?;
        Ok(value)
    }

    fn read_i32(&mut self) -> Result<i32> {
        check_readable(&*self, 4)?;
        let value = self.get_i32(self.reader_index())?;
        self.skip_bytes(4)?;
        Ok(value)
    }

    fn read_i64(&mut self) -> Result<i64> {
        check_readable(&*self, 8)?;
        let value = self.get_i64(self.reader_index())?;
        self.skip_bytes(8)?;
        Ok(value)
    }

    /// 读取 `dst.len()` 字节并前移读游标。
    fn read_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        check_readable(&*self, dst.len())?;
        self.get_slice(self.reader_index(), dst)?;
        self.skip_bytes(dst.len())
    }

    /// 将 `length` 个可读字节写入输出流并前移读游标。
    fn read_to(&mut self, out: &mut dyn Write, length: usize) -> Result<()> {
        check_readable(&*self, length)?;
        self.get_bytes_to_writer(self.reader_index(), out, length)?;
        self.skip_bytes(length)
    }

    fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    fn write_i16(&mut self, value: i16) -> Result<()> {
        self.write_bytes(&self.order().write_u16(value as u16))
    }

    fn write_u24(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&self.order().write_u24(value))
    }

    fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_bytes(&self.order().write_u32(value as u32))
    }

    fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write_bytes(&self.order().write_u64(value as u64))
    }

    /// 追加 `src` 并前移写游标，空间不足时先扩容。
    fn write_bytes(&mut self, src: &[u8]) -> Result<()> {
        self.ensure_writable(src.len())?;
        let writer_index = self.writer_index();
        self.set_slice(writer_index, src)?;
        self.set_writer_index(writer_index + src.len())
    }

    /// 从 `src` 的可读区搬运 `length` 字节到本缓冲末尾，双方游标同步前移。
    fn write_buf(&mut self, src: &mut dyn ByteBuf, length: usize) -> Result<()> {
        check_readable(&*src, length)?;
        self.ensure_writable(length)?;
        let writer_index = self.writer_index();
        self.set_bytes_from_buf(writer_index, &*src, src.reader_index(), length)?;
        self.set_writer_index(writer_index + length)?;
        src.skip_bytes(length)
    }

    /// 从输入流读取至多 `length` 字节追加到末尾，写游标按实际读取量前移。
    fn write_from(&mut self, input: &mut dyn Read, length: usize) -> Result<Transfer> {
        self.ensure_writable(length)?;
        let writer_index = self.writer_index();
        let transfer = self.set_bytes_from_reader(writer_index, input, length)?;
        if let Transfer::Bytes(read) = transfer {
            self.set_writer_index(writer_index + read)?;
        }
        Ok(transfer)
    }

    /// 深拷贝当前可读区。
    fn copy_readable(&self) -> Result<Box<dyn ByteBuf>> {
        self.copy(self.reader_index(), self.readable_bytes())
    }

    /// 将可读区复制为 [`Bytes`]，便于交给基于 `bytes` 的编解码器，游标不变。
    fn to_bytes(&self) -> Result<Bytes> {
        let mut out = vec![0u8; self.readable_bytes()];
        self.get_slice(self.reader_index(), &mut out)?;
        Ok(Bytes::from(out))
    }
}

impl fmt::Debug for dyn ByteBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        describe("ByteBuf", self, f)
    }
}

/// 以 `Name(ridx: r, widx: w, cap: c/max)` 形式描述缓冲状态，各实现的 `Debug` 共用。
pub(crate) fn describe(
    name: &str,
    buf: &(impl ByteBuf + ?Sized),
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    write!(
        f,
        "{name}(ridx: {}, widx: {}, cap: {}/{})",
        buf.reader_index(),
        buf.writer_index(),
        buf.capacity(),
        buf.max_capacity()
    )
}

pub(crate) fn check_range(index: usize, length: usize, capacity: usize) -> Result<()> {
    match index.checked_add(length) {
        Some(end) if end <= capacity => Ok(()),
        _ => Err(BufferError::out_of_bounds(index, length, capacity)),
    }
}

pub(crate) fn check_indices(reader_index: usize, writer_index: usize, capacity: usize) -> Result<()> {
    if reader_index <= writer_index && writer_index <= capacity {
        Ok(())
    } else {
        Err(BufferError::InvalidIndex {
            reader_index,
            writer_index,
            capacity,
        })
    }
}

/// 校验构造参数 `initial_capacity <= max_capacity`。
pub(crate) fn check_capacity_args(initial_capacity: usize, max_capacity: usize) -> Result<()> {
    if initial_capacity > max_capacity {
        return Err(BufferError::invalid_argument(format!(
            "initialCapacity({initial_capacity}) > maxCapacity({max_capacity})"
        )));
    }
    Ok(())
}

/// 校验 `set_capacity` 的目标值。
pub(crate) fn check_new_capacity(new_capacity: usize, max_capacity: usize) -> Result<()> {
    if new_capacity > max_capacity {
        return Err(BufferError::invalid_argument(format!(
            "newCapacity: {new_capacity} (max: {max_capacity})"
        )));
    }
    Ok(())
}

fn check_readable(buf: &(impl ByteBuf + ?Sized), requested: usize) -> Result<()> {
    let readable = buf.readable_bytes();
    if requested > readable {
        return Err(BufferError::ReadableUnderflow {
            requested,
            readable,
        });
    }
    Ok(())
}

fn grown_capacity(current: usize, required: usize, max_capacity: usize) -> usize {
    let mut capacity = current.max(GROWTH_FLOOR);
    while capacity < required {
        capacity = capacity.saturating_mul(2);
    }
    capacity.min(max_capacity)
}

/// 以基址与长度描述的一段可寻址存储，两种缓冲的读写原语都落在这里。
///
/// 所有复制均使用 `ptr::copy`（memmove 语义），因此源与目标是同一存储的不同别名时依然正确。
#[derive(Clone, Copy, Debug)]
pub(crate) struct RawRegion {
    base: *mut u8,
    capacity: usize,
}

impl RawRegion {
    /// # Safety
    /// `base` 必须对 `capacity` 字节可读写，且在本值的使用期间保持有效。
    pub(crate) unsafe fn new(base: *mut u8, capacity: usize) -> Self {
        Self { base, capacity }
    }

    pub(crate) fn base(self) -> *mut u8 {
        self.base
    }

    pub(crate) fn capacity(self) -> usize {
        self.capacity
    }

    pub(crate) fn read(self, index: usize, dst: &mut [u8]) -> Result<()> {
        check_range(index, dst.len(), self.capacity)?;
        // SAFETY: 区间已校验位于存储之内。
        unsafe { ptr::copy(self.base.add(index), dst.as_mut_ptr(), dst.len()) };
        Ok(())
    }

    pub(crate) fn write(self, index: usize, src: &[u8]) -> Result<()> {
        check_range(index, src.len(), self.capacity)?;
        // SAFETY: 区间已校验位于存储之内。
        unsafe { ptr::copy(src.as_ptr(), self.base.add(index), src.len()) };
        Ok(())
    }

    /// 在 `[index, index + length)` 上合成瞬时只读切片。
    ///
    /// # Safety
    /// 切片存活期间不得有任何别名写入或调整这块存储。
    pub(crate) unsafe fn window<'a>(self, index: usize, length: usize) -> Result<&'a [u8]> {
        check_range(index, length, self.capacity)?;
        // SAFETY: 区间已校验；别名约束由调用方保证。
        Ok(unsafe { slice::from_raw_parts(self.base.add(index), length) })
    }

    /// 在 `[index, index + length)` 上合成瞬时可写切片。
    ///
    /// # Safety
    /// 切片存活期间不得有任何别名访问这块存储。
    pub(crate) unsafe fn window_mut<'a>(self, index: usize, length: usize) -> Result<&'a mut [u8]> {
        check_range(index, length, self.capacity)?;
        // SAFETY: 同上。
        Ok(unsafe { slice::from_raw_parts_mut(self.base.add(index), length) })
    }

    /// 把 `[index, index + length)` 搬运到另一缓冲。
    ///
    /// 目标拥有原生基址或堆数组时，钉住其存储后直接在两块内存之间复制；否则走通用 `set_slice`。
    pub(crate) fn copy_to(
        self,
        index: usize,
        dst: &mut dyn ByteBuf,
        dst_index: usize,
        length: usize,
    ) -> Result<()> {
        if length == 0 {
            return Ok(());
        }
        check_range(index, length, self.capacity)?;
        // SAFETY: 区间已校验。
        let source = unsafe { self.base.add(index) };
        match pin_peer(dst)? {
            Some(pinned) => {
                let target = pinned.raw();
                check_range(dst_index, length, target.capacity)?;
                // SAFETY: 目标区间已校验，钉住期间目标存储不会被回收；重叠由 memmove 处理。
                unsafe { ptr::copy(source, target.base.add(dst_index), length) };
            }
            None => {
                // SAFETY: 视图只在本次调用期间存活，单写者约定排除了并发写入。
                let view = unsafe { slice::from_raw_parts(source, length) };
                dst.set_slice(dst_index, view)?;
            }
        }
        Ok(())
    }

    /// 从另一缓冲的 `[src_index, src_index + length)` 搬运到 `[index, index + length)`。
    pub(crate) fn copy_from(
        self,
        index: usize,
        src: &dyn ByteBuf,
        src_index: usize,
        length: usize,
    ) -> Result<()> {
        if length == 0 {
            return Ok(());
        }
        check_range(index, length, self.capacity)?;
        // SAFETY: 区间已校验。
        let target = unsafe { self.base.add(index) };
        match pin_peer(src)? {
            Some(pinned) => {
                let source = pinned.raw();
                check_range(src_index, length, source.capacity)?;
                // SAFETY: 源区间已校验，钉住期间源存储不会被回收；重叠由 memmove 处理。
                unsafe { ptr::copy(source.base.add(src_index), target, length) };
            }
            None => {
                // SAFETY: 视图只在本次调用期间存活，单写者约定排除了并发访问。
                let view = unsafe { slice::from_raw_parts_mut(target, length) };
                src.get_slice(src_index, view)?;
            }
        }
        Ok(())
    }

    /// 把 `[reader_index, writer_index)` 平移到偏移 0。
    ///
    /// 游标可能来自容量调整之前的别名，因此先按当前容量校验整个区间。
    pub(crate) fn shift_to_front(self, reader_index: usize, writer_index: usize) -> Result<()> {
        let readable = writer_index - reader_index;
        check_range(reader_index, readable, self.capacity)?;
        if readable > 0 {
            // SAFETY: 两段区间都已位于容量之内，`ptr::copy` 允许重叠。
            unsafe { ptr::copy(self.base.add(reader_index), self.base, readable) };
        }
        Ok(())
    }

    pub(crate) fn write_to(self, index: usize, out: &mut dyn Write, length: usize) -> Result<()> {
        if length == 0 {
            return Ok(());
        }
        // SAFETY: 视图只在写出期间存活。
        transport::write_all(unsafe { self.window(index, length)? }, out)
    }

    pub(crate) fn read_from(
        self,
        index: usize,
        input: &mut dyn Read,
        length: usize,
    ) -> Result<Transfer> {
        if length == 0 {
            return Ok(Transfer::Bytes(0));
        }
        // SAFETY: 视图只在读取期间存活。
        transport::read_once(unsafe { self.window_mut(index, length)? }, input)
    }

    pub(crate) fn write_vectored_to(
        self,
        index: usize,
        out: &mut dyn Write,
        length: usize,
    ) -> Result<Transfer> {
        if length == 0 {
            return Ok(Transfer::Bytes(0));
        }
        // SAFETY: 视图只在写出期间存活。
        transport::write_vectored(unsafe { self.window(index, length)? }, out)
    }

    pub(crate) fn read_vectored_from(
        self,
        index: usize,
        input: &mut dyn Read,
        length: usize,
    ) -> Result<Transfer> {
        if length == 0 {
            return Ok(Transfer::Bytes(0));
        }
        // SAFETY: 视图只在读取期间存活。
        transport::read_vectored(unsafe { self.window_mut(index, length)? }, input)
    }
}

/// 在一次跨缓冲搬运期间钉住对端存储：持有期间该存储不会被容量调整或释放回收。
pub struct PinnedRegion {
    raw: RawRegion,
    _owner: Arc<dyn Send + Sync>,
}

impl PinnedRegion {
    pub(crate) fn new<S: Storage>(storage: Arc<S>) -> Self {
        Self {
            raw: storage.raw(),
            _owner: storage,
        }
    }

    pub(crate) fn raw(&self) -> RawRegion {
        self.raw
    }
}

impl fmt::Debug for PinnedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinnedRegion").field("raw", &self.raw).finish()
    }
}

/// 先看原生基址，再看堆数组；两者都没有时交给通用路径。
fn pin_peer(peer: &dyn ByteBuf) -> Result<Option<PinnedRegion>> {
    if peer.has_memory_address() || peer.has_array() {
        peer.pin_region()
    } else {
        Ok(None)
    }
}

/// 两种存储共用的传输搬运实现：调用方负责提供已完成越界检查的瞬时切片。
mod transport {
    use super::*;

    pub(crate) fn write_all(view: &[u8], out: &mut dyn Write) -> Result<()> {
        out.write_all(view)?;
        Ok(())
    }

    pub(crate) fn read_once(view: &mut [u8], input: &mut dyn Read) -> Result<Transfer> {
        let requested = view.len();
        read_outcome(input.read(view), requested)
    }

    pub(crate) fn write_vectored(view: &[u8], out: &mut dyn Write) -> Result<Transfer> {
        write_outcome(out.write_vectored(&[IoSlice::new(view)]))
    }

    pub(crate) fn read_vectored(view: &mut [u8], input: &mut dyn Read) -> Result<Transfer> {
        let requested = view.len();
        read_outcome(input.read_vectored(&mut [IoSliceMut::new(view)]), requested)
    }

    fn read_outcome(result: io::Result<usize>, requested: usize) -> Result<Transfer> {
        match result {
            Ok(0) if requested > 0 => Ok(Transfer::EndOfStream),
            Ok(read) => Ok(Transfer::Bytes(read)),
            Err(err) if is_disconnect(&err) => Ok(Transfer::EndOfStream),
            Err(err) => Err(err.into()),
        }
    }

    fn write_outcome(result: io::Result<usize>) -> Result<Transfer> {
        match result {
            Ok(written) => Ok(Transfer::Bytes(written)),
            Err(err) if is_disconnect(&err) => Ok(Transfer::EndOfStream),
            Err(err) => Err(err.into()),
        }
    }

    fn is_disconnect(err: &io::Error) -> bool {
        matches!(
            err.kind(),
            io::ErrorKind::NotConnected | io::ErrorKind::BrokenPipe
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_doubles_from_floor_and_caps_at_max() {
        assert_eq!(grown_capacity(0, 1, 1024), 64);
        assert_eq!(grown_capacity(64, 65, 1024), 128);
        assert_eq!(grown_capacity(100, 300, 1024), 400);
        assert_eq!(grown_capacity(512, 1000, 1000), 1000);
    }

    #[test]
    fn range_check_reports_overflow_as_out_of_bounds() {
        assert!(check_range(0, 4, 4).is_ok());
        assert!(check_range(4, 0, 4).is_ok());
        assert!(matches!(
            check_range(2, 3, 4),
            Err(BufferError::IndexOutOfBounds {
                index: 2,
                length: 3,
                capacity: 4
            })
        ));
        assert!(check_range(usize::MAX, 2, 4).is_err());
    }

    #[test]
    fn index_check_enforces_ordering() {
        assert!(check_indices(0, 0, 0).is_ok());
        assert!(check_indices(2, 1, 4).is_err());
        assert!(check_indices(1, 5, 4).is_err());
    }

    #[test]
    fn read_outcome_distinguishes_end_of_stream() {
        let mut empty: &[u8] = &[];
        let mut view = [0u8; 4];
        assert_eq!(
            transport::read_once(&mut view, &mut empty).expect("空输入不应报错"),
            Transfer::EndOfStream
        );

        struct Disconnected;
        impl Read for Disconnected {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::ErrorKind::NotConnected.into())
            }
        }
        assert!(
            transport::read_vectored(&mut view, &mut Disconnected)
                .expect("断开连接应映射为流结束")
                .is_end_of_stream()
        );

        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::other("device failure"))
            }
        }
        assert!(matches!(
            transport::read_once(&mut view, &mut Broken),
            Err(BufferError::Io(_))
        ));
    }
}
