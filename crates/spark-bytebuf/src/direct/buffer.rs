use std::{
    fmt,
    io::{Read, Write},
    marker::PhantomData,
    ptr::NonNull,
    sync::Arc,
};

use tracing::{debug, trace, warn};

use super::region::{ForeignRegion, NativeRegion};
use crate::{
    byte_buf::{
        ByteBuf, PinnedRegion, RawRegion, Transfer, check_capacity_args, check_indices,
        check_new_capacity, check_range, describe,
    },
    error::{BufferError, Result},
    order::{BigEndian, ByteOrder, Endianness},
    ref_cnt::RefCnt,
    slot::{Storage, StorageSlot},
    unsafe_buf::UnsafeByteBuf,
};

/// 所有别名共享的原生存储状态。
///
/// - `region`：当前区域；计数归零后为空，此后任何访问都返回 [`BufferError::Released`]；
/// - `ref_cnt`：所有别名共用的生命周期计数；
/// - `max_capacity`：构造后不可变。
struct DirectShared {
    region: StorageSlot<NativeRegion>,
    ref_cnt: RefCnt,
    max_capacity: usize,
}

impl DirectShared {
    fn new(region: NativeRegion, max_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            region: StorageSlot::new(region),
            ref_cnt: RefCnt::new(),
            max_capacity,
        })
    }
}

impl Drop for DirectShared {
    fn drop(&mut self) {
        if let Some(region) = self.region.take() {
            warn!(
                target: "spark_bytebuf",
                capacity = region.len(),
                foreign = region.is_foreign(),
                ref_cnt = self.ref_cnt.get(),
                "direct buffer leaked: last alias dropped before release, reclaiming region"
            );
        }
    }
}

/// `DirectByteBuf` 是由原生内存区域承载、显式引用计数的缓冲，字节序由类型参数 `O` 固定。
///
/// # 设计背景（Why）
/// - 传输层需要把字节在缓冲与套接字之间直接搬运，原生区域可以提供稳定基址给向量化 I/O；
/// - 原生区域不受托管回收约束，必须由引用计数决定唯一一次释放。
///
/// # 逻辑解析（How）
/// - 区域、计数与容量上限放在 `Arc` 共享状态中，`duplicate()` 只克隆 `Arc` 并复制游标；
/// - `set_capacity` 分配新区域，只复制存活窗口 `[reader_index, writer_index)`，再替换旧区域；
///   旧区域在最后一个进行中的访问结束后释放（外部区域除外）；
/// - 读/写视图不长期持有，每次批量操作都在基址上合成瞬时切片。
///
/// # 契约说明（What）
/// - 通过 [`UnsafeByteBuf::release`] 将计数降到 0 时区域被释放，所有别名随后访问都返回
///   [`BufferError::Released`]；
/// - 若最后一个别名被丢弃时计数仍为正，区域仍会被回收，但会记录一条泄漏告警，
///   调用方不应依赖这一兜底路径。
///
/// # 使用示例
/// ```
/// use spark_bytebuf::{ByteBuf, DirectByteBuf, unsafe_buf::UnsafeByteBuf};
///
/// let mut buf = DirectByteBuf::<spark_bytebuf::BigEndian>::allocate(16, 16)?;
/// buf.set_i32(0, 0x0102_0304)?;
/// assert_eq!(buf.get_u8(0)?, 0x01);
/// assert!(buf.release()?);
/// # Ok::<(), spark_bytebuf::BufferError>(())
/// ```
pub struct DirectByteBuf<O: Endianness = BigEndian> {
    shared: Arc<DirectShared>,
    reader_index: usize,
    writer_index: usize,
    _order: PhantomData<O>,
}

impl<O: Endianness> DirectByteBuf<O> {
    /// 分配 `initial_capacity` 字节（清零）的自有区域。
    pub fn allocate(initial_capacity: usize, max_capacity: usize) -> Result<Self> {
        check_capacity_args(initial_capacity, max_capacity)?;
        let region = NativeRegion::allocate(initial_capacity)?;
        Ok(Self::from_region(region, max_capacity, 0))
    }

    /// 包装外部区域：整块内容视为可读（`writer_index` 等于区域长度），释放时不回收该区域。
    pub fn wrap(region: ForeignRegion, max_capacity: usize) -> Result<Self> {
        let region = NativeRegion::foreign(region)?;
        check_capacity_args(region.len(), max_capacity)?;
        let writer_index = region.len();
        Ok(Self::from_region(region, max_capacity, writer_index))
    }

    fn from_region(region: NativeRegion, max_capacity: usize, writer_index: usize) -> Self {
        Self {
            shared: DirectShared::new(region, max_capacity),
            reader_index: 0,
            writer_index,
            _order: PhantomData,
        }
    }

    fn with_raw<R>(&self, f: impl FnOnce(RawRegion) -> Result<R>) -> Result<R> {
        self.shared.region.with_raw(f)
    }

    /// 当前区域是否为外部提供。已释放时返回 `false`。
    pub fn is_foreign(&self) -> bool {
        self.shared
            .region
            .inspect(NativeRegion::is_foreign)
            .unwrap_or(false)
    }

    /// 返回共享区域的同类型视图，游标取自当前值。
    pub fn duplicate_typed(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            reader_index: self.reader_index,
            writer_index: self.writer_index,
            _order: PhantomData,
        }
    }

    /// 深拷贝 `[index, index + length)` 到新的自有区域。
    pub fn copy_typed(&self, index: usize, length: usize) -> Result<Self> {
        let region = self.with_raw(|raw| {
            check_range(index, length, raw.capacity())?;
            let region = NativeRegion::allocate(length)?;
            // SAFETY: 视图只在本次复制期间存活。
            region.raw().write(0, unsafe { raw.window(index, length)? })?;
            Ok(region)
        })?;
        Ok(Self::from_region(region, self.shared.max_capacity, length))
    }
}

impl<O: Endianness> ByteBuf for DirectByteBuf<O> {
    fn capacity(&self) -> usize {
        self.shared.region.capacity()
    }

    fn max_capacity(&self) -> usize {
        self.shared.max_capacity
    }

    fn set_capacity(&mut self, new_capacity: usize) -> Result<()> {
        check_new_capacity(new_capacity, self.shared.max_capacity)?;
        let old_capacity = self
            .shared
            .region
            .inspect(NativeRegion::len)
            .ok_or(BufferError::Released)?;
        if new_capacity == old_capacity {
            return Ok(());
        }
        let (reader_index, writer_index) =
            if new_capacity < old_capacity && self.reader_index >= new_capacity {
                (new_capacity, new_capacity)
            } else {
                (self.reader_index, self.writer_index.min(new_capacity))
            };
        check_indices(reader_index, writer_index, new_capacity)?;
        let previous = self.shared.region.replace_with(|old| {
            let fresh = NativeRegion::allocate(new_capacity)?;
            let live = writer_index - reader_index;
            if live > 0 {
                // SAFETY: 旧区域由快照保持存活，视图只在本次复制期间存活。
                let window = unsafe { old.raw().window(reader_index, live)? };
                fresh.raw().write(reader_index, window)?;
            }
            Ok(fresh)
        })?;
        self.reader_index = reader_index;
        self.writer_index = writer_index;
        trace!(
            target: "spark_bytebuf",
            kind = "direct",
            old_capacity = previous.len(),
            new_capacity,
            replaced_foreign = previous.is_foreign(),
            "buffer capacity changed"
        );
        Ok(())
    }

    fn reader_index(&self) -> usize {
        self.reader_index
    }

    fn writer_index(&self) -> usize {
        self.writer_index
    }

    fn set_index(&mut self, reader_index: usize, writer_index: usize) -> Result<()> {
        check_indices(reader_index, writer_index, self.capacity())?;
        self.reader_index = reader_index;
        self.writer_index = writer_index;
        Ok(())
    }

    fn order(&self) -> ByteOrder {
        O::ORDER
    }

    fn is_direct(&self) -> bool {
        true
    }

    fn has_array(&self) -> bool {
        false
    }

    unsafe fn array(&self) -> Result<&[u8]> {
        Err(BufferError::unsupported("array"))
    }

    unsafe fn array_mut(&mut self) -> Result<&mut [u8]> {
        Err(BufferError::unsupported("array"))
    }

    fn has_memory_address(&self) -> bool {
        true
    }

    fn memory_address(&self) -> Result<NonNull<u8>> {
        self.shared
            .region
            .inspect(NativeRegion::address)
            .ok_or(BufferError::Released)
    }

    fn get_slice(&self, index: usize, dst: &mut [u8]) -> Result<()> {
        self.with_raw(|raw| raw.read(index, dst))
    }

    fn set_slice(&mut self, index: usize, src: &[u8]) -> Result<()> {
        self.with_raw(|raw| raw.write(index, src))
    }

    fn get_bytes_to_buf(
        &self,
        index: usize,
        dst: &mut dyn ByteBuf,
        dst_index: usize,
        length: usize,
    ) -> Result<()> {
        self.with_raw(|raw| raw.copy_to(index, dst, dst_index, length))
    }

    fn set_bytes_from_buf(
        &mut self,
        index: usize,
        src: &dyn ByteBuf,
        src_index: usize,
        length: usize,
    ) -> Result<()> {
        self.with_raw(|raw| raw.copy_from(index, src, src_index, length))
    }

    fn get_bytes_to_writer(
        &self,
        index: usize,
        out: &mut dyn Write,
        length: usize,
    ) -> Result<()> {
        self.with_raw(|raw| raw.write_to(index, out, length))
    }

    fn set_bytes_from_reader(
        &mut self,
        index: usize,
        input: &mut dyn Read,
        length: usize,
    ) -> Result<Transfer> {
        self.with_raw(|raw| raw.read_from(index, input, length))
    }

    fn get_bytes_to_channel(
        &self,
        index: usize,
        out: &mut dyn Write,
        length: usize,
    ) -> Result<Transfer> {
        self.with_raw(|raw| raw.write_vectored_to(index, out, length))
    }

    fn set_bytes_from_channel(
        &mut self,
        index: usize,
        input: &mut dyn Read,
        length: usize,
    ) -> Result<Transfer> {
        self.with_raw(|raw| raw.read_vectored_from(index, input, length))
    }

    fn duplicate(&self) -> Box<dyn ByteBuf> {
        Box::new(self.duplicate_typed())
    }

    fn copy(&self, index: usize, length: usize) -> Result<Box<dyn ByteBuf>> {
        Ok(Box::new(self.copy_typed(index, length)?))
    }

    fn discard_read_bytes(&mut self) -> Result<()> {
        if self.reader_index == 0 {
            return Ok(());
        }
        let (reader_index, writer_index) = (self.reader_index, self.writer_index);
        self.with_raw(|raw| raw.shift_to_front(reader_index, writer_index))?;
        self.writer_index = writer_index - reader_index;
        self.reader_index = 0;
        Ok(())
    }

    fn pin_region(&self) -> Result<Option<PinnedRegion>> {
        self.shared.region.pin().map(Some)
    }
}

impl<O: Endianness> UnsafeByteBuf for DirectByteBuf<O> {
    fn ref_cnt(&self) -> isize {
        self.shared.ref_cnt.get()
    }

    fn acquire(&self) -> Result<()> {
        self.shared.ref_cnt.retain().map(|_| ())
    }

    fn release(&mut self) -> Result<bool> {
        if !self.shared.ref_cnt.release()? {
            return Ok(false);
        }
        let freed = self.shared.region.take();
        debug!(
            target: "spark_bytebuf",
            kind = "direct",
            capacity = freed.as_ref().map_or(0, |region| region.len()),
            foreign = freed.as_ref().is_some_and(|region| region.is_foreign()),
            "buffer released"
        );
        Ok(true)
    }

    unsafe fn read_view(&self, index: usize, length: usize) -> Result<&[u8]> {
        // SAFETY: 别名约束由调用方保证。
        self.with_raw(|raw| unsafe { raw.window(index, length) })
    }

    unsafe fn write_view(&mut self, index: usize, length: usize) -> Result<&mut [u8]> {
        // SAFETY: 同上。
        self.with_raw(|raw| unsafe { raw.window_mut(index, length) })
    }

    fn new_buffer(&self, initial_capacity: usize) -> Result<Box<dyn UnsafeByteBuf>> {
        let max_capacity = initial_capacity.max(self.shared.max_capacity);
        Ok(Box::new(Self::allocate(initial_capacity, max_capacity)?))
    }

    fn discard_some_read_bytes(&mut self) -> Result<()> {
        if self.reader_index == self.writer_index
            || (self.reader_index > 0 && self.reader_index >= self.capacity() / 2)
        {
            self.discard_read_bytes()?;
        }
        Ok(())
    }
}

impl<O: Endianness> fmt::Debug for DirectByteBuf<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        describe("DirectByteBuf", self, f)
    }
}
