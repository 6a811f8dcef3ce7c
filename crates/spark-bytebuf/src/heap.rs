//! 托管内存缓冲。
//!
//! # 模块定位（Why）
//! - 为协议编解码与测试提供“分配即用、丢弃即回收”的缓冲实现，无需显式释放；
//! - 与原生内存缓冲实现同一 [`ByteBuf`] 契约，上层代码无需区分存储类型。
//!
//! # 设计概要（How）
//! - 存储是一块由全局分配器管理的字节数组，通过 `Arc` 在 `duplicate()` 产生的别名之间共享；
//! - 数组元素以 `UnsafeCell<u8>` 承载，使任一别名都能在单写者约定下写入共享内容；
//! - 容量调整以“新数组 + 复制 `min(旧, 新)` 字节”完成，随后替换共享槽位，所有别名立即可见；
//!   其它线程上进行中的访问继续使用旧数组，结束后旧数组才被回收。

use std::{
    cell::UnsafeCell,
    fmt,
    io::{Read, Write},
    marker::PhantomData,
    ptr::NonNull,
    slice,
    sync::Arc,
};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::{
    byte_buf::{
        ByteBuf, DEFAULT_MAX_CAPACITY, PinnedRegion, RawRegion, Transfer, check_capacity_args,
        check_indices, check_new_capacity, check_range, describe,
    },
    error::{BufferError, Result},
    order::{BigEndian, ByteOrder, Endianness},
    ref_cnt::RefCnt,
    slot::{Storage, StorageSlot},
    unsafe_buf::UnsafeByteBuf,
};

/// 托管字节数组。
struct HeapArray(Box<[UnsafeCell<u8>]>);

// SAFETY: 元素只经由 `RawRegion` 以原始指针读写，内容写入遵循单写者约定。
unsafe impl Sync for HeapArray {}

impl HeapArray {
    fn zeroed(len: usize) -> Self {
        Self::from_vec(vec![0u8; len])
    }

    fn from_vec(bytes: Vec<u8>) -> Self {
        let raw = Box::into_raw(bytes.into_boxed_slice()) as *mut [UnsafeCell<u8>];
        // SAFETY: `UnsafeCell<u8>` 与 `u8` 布局一致（repr(transparent)），分配来源不变。
        Self(unsafe { Box::from_raw(raw) })
    }
}

impl Storage for HeapArray {
    fn raw(&self) -> RawRegion {
        // SAFETY: 数组元素是 `UnsafeCell`，经共享引用取得的指针允许写入；数组随 `self` 存活。
        unsafe { RawRegion::new(self.0.as_ptr() as *mut u8, self.0.len()) }
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

/// 所有别名共享的托管存储。
struct HeapStorage {
    array: StorageSlot<HeapArray>,
    ref_cnt: RefCnt,
    max_capacity: usize,
}

/// `HeapByteBuf` 是由托管字节数组承载的缓冲，字节序由类型参数 `O` 固定。
///
/// # 契约说明（What）
/// - `duplicate()` 返回共享同一数组、游标独立的视图，写入对双方可见；
/// - `copy()` 总是分配新的独立数组；
/// - 引用计数同样可通过 [`UnsafeByteBuf`] 管理：计数归零时数组被丢弃，其后的访问返回
///   [`BufferError::Released`]。不调用 `release` 也不会泄漏，最后一个别名被丢弃时数组自然回收。
///
/// # 使用示例
/// ```
/// use spark_bytebuf::{ByteBuf, HeapByteBuf};
///
/// let mut buf = HeapByteBuf::<spark_bytebuf::BigEndian>::with_capacity(8);
/// buf.write_i32(0x0102_0304)?;
/// assert_eq!(buf.get_u8(0)?, 0x01);
/// assert_eq!(buf.read_i32()?, 0x0102_0304);
/// # Ok::<(), spark_bytebuf::BufferError>(())
/// ```
pub struct HeapByteBuf<O: Endianness = BigEndian> {
    storage: Arc<HeapStorage>,
    reader_index: usize,
    writer_index: usize,
    _order: PhantomData<O>,
}

impl<O: Endianness> HeapByteBuf<O> {
    /// 分配 `initial_capacity` 字节（全零）的数组，容量上限为 `max_capacity`。
    pub fn new(initial_capacity: usize, max_capacity: usize) -> Result<Self> {
        check_capacity_args(initial_capacity, max_capacity)?;
        Ok(Self::from_array(HeapArray::zeroed(initial_capacity), max_capacity, 0))
    }

    /// 以默认上限 [`DEFAULT_MAX_CAPACITY`] 分配。
    pub fn with_capacity(initial_capacity: usize) -> Self {
        let max_capacity = initial_capacity.max(DEFAULT_MAX_CAPACITY);
        Self::from_array(HeapArray::zeroed(initial_capacity), max_capacity, 0)
    }

    /// 接管已有数组：读游标为 0，写游标等于数组长度，容量上限等于数组长度。
    pub fn wrap(bytes: Vec<u8>) -> Self {
        let len = bytes.len();
        Self::from_array(HeapArray::from_vec(bytes), len, len)
    }

    /// 接管已有数组并指定容量上限，数组长度超过上限时失败。
    pub fn wrap_with_max(bytes: Vec<u8>, max_capacity: usize) -> Result<Self> {
        let len = bytes.len();
        check_capacity_args(len, max_capacity)?;
        Ok(Self::from_array(HeapArray::from_vec(bytes), max_capacity, len))
    }

    /// 复制 `bytes` 的内容构造缓冲，全部内容可读。
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self::wrap(bytes.to_vec())
    }

    fn from_array(array: HeapArray, max_capacity: usize, writer_index: usize) -> Self {
        Self {
            storage: Arc::new(HeapStorage {
                array: StorageSlot::new(array),
                ref_cnt: RefCnt::new(),
                max_capacity,
            }),
            reader_index: 0,
            writer_index,
            _order: PhantomData,
        }
    }

    fn with_raw<R>(&self, f: impl FnOnce(RawRegion) -> Result<R>) -> Result<R> {
        self.storage.array.with_raw(f)
    }

    /// 返回共享存储的同类型视图，游标取自当前值。
    pub fn duplicate_typed(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            reader_index: self.reader_index,
            writer_index: self.writer_index,
            _order: PhantomData,
        }
    }

    /// 深拷贝 `[index, index + length)` 为同类型的新缓冲。
    pub fn copy_typed(&self, index: usize, length: usize) -> Result<Self> {
        let bytes = self.with_raw(|raw| {
            check_range(index, length, raw.capacity())?;
            let mut bytes = vec![0u8; length];
            raw.read(index, &mut bytes)?;
            Ok(bytes)
        })?;
        Ok(Self::from_array(
            HeapArray::from_vec(bytes),
            self.storage.max_capacity,
            length,
        ))
    }
}

impl<O: Endianness> ByteBuf for HeapByteBuf<O> {
    fn capacity(&self) -> usize {
        self.storage.array.capacity()
    }

    fn max_capacity(&self) -> usize {
        self.storage.max_capacity
    }

    fn set_capacity(&mut self, new_capacity: usize) -> Result<()> {
        check_new_capacity(new_capacity, self.storage.max_capacity)?;
        let current = self
            .storage
            .array
            .inspect(HeapArray::len)
            .ok_or(BufferError::Released)?;
        if new_capacity == current {
            return Ok(());
        }
        let previous = self.storage.array.replace_with(|old| {
            let mut bytes = vec![0u8; new_capacity];
            let kept = old.len().min(new_capacity);
            old.raw().read(0, &mut bytes[..kept])?;
            Ok(HeapArray::from_vec(bytes))
        })?;
        let old_capacity = previous.len();
        if new_capacity < old_capacity {
            if self.reader_index < new_capacity {
                self.writer_index = self.writer_index.min(new_capacity);
            } else {
                self.reader_index = new_capacity;
                self.writer_index = new_capacity;
            }
        }
        trace!(
            target: "spark_bytebuf",
            kind = "heap",
            old_capacity,
            new_capacity,
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
        false
    }

    fn has_array(&self) -> bool {
        true
    }

    unsafe fn array(&self) -> Result<&[u8]> {
        self.with_raw(|raw| {
            // SAFETY: 别名约束由调用方保证。
            Ok(unsafe { slice::from_raw_parts(raw.base(), raw.capacity()) })
        })
    }

    unsafe fn array_mut(&mut self) -> Result<&mut [u8]> {
        self.with_raw(|raw| {
            // SAFETY: 同上。
            Ok(unsafe { slice::from_raw_parts_mut(raw.base(), raw.capacity()) })
        })
    }

    fn has_memory_address(&self) -> bool {
        false
    }

    fn memory_address(&self) -> Result<NonNull<u8>> {
        Err(BufferError::unsupported("memory_address"))
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
        self.storage.array.pin().map(Some)
    }
}

impl<O: Endianness> UnsafeByteBuf for HeapByteBuf<O> {
    fn ref_cnt(&self) -> isize {
        self.storage.ref_cnt.get()
    }

    fn acquire(&self) -> Result<()> {
        self.storage.ref_cnt.retain().map(|_| ())
    }

    fn release(&mut self) -> Result<bool> {
        if !self.storage.ref_cnt.release()? {
            return Ok(false);
        }
        let freed = self.storage.array.take();
        debug!(
            target: "spark_bytebuf",
            kind = "heap",
            capacity = freed.as_ref().map_or(0, |array| array.len()),
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
        let max_capacity = initial_capacity.max(self.storage.max_capacity);
        Ok(Box::new(Self::new(initial_capacity, max_capacity)?))
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

impl<O: Endianness> fmt::Debug for HeapByteBuf<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        describe("HeapByteBuf", self, f)
    }
}

impl<O: Endianness> From<Vec<u8>> for HeapByteBuf<O> {
    fn from(bytes: Vec<u8>) -> Self {
        Self::wrap(bytes)
    }
}

impl<O: Endianness> From<Bytes> for HeapByteBuf<O> {
    fn from(bytes: Bytes) -> Self {
        Self::wrap(Vec::from(bytes))
    }
}

#[cfg(all(test, not(all(feature = "loom-model", any(loom, spark_loom)))))]
mod tests {
    use super::*;
    use crate::order::LittleEndian;

    #[test]
    fn wrap_exposes_whole_vec_as_readable() {
        let buf = HeapByteBuf::<BigEndian>::wrap(vec![1, 2, 3]);
        assert_eq!(buf.readable_bytes(), 3);
        assert_eq!(buf.max_capacity(), 3);
        assert_eq!(buf.get_u24(0).expect("三字节可读"), 0x010203);
    }

    #[test]
    fn shrink_clamps_writer_and_keeps_prefix() {
        let mut buf = HeapByteBuf::<LittleEndian>::new(8, 8).expect("合法参数");
        buf.write_bytes(&[1, 2, 3, 4, 5, 6]).expect("写入");
        buf.set_reader_index(1).expect("移动读游标");
        buf.set_capacity(4).expect("收缩");
        assert_eq!((buf.reader_index(), buf.writer_index()), (1, 4));
        assert_eq!(buf.get_u8(3).expect("保留前缀"), 4);

        buf.set_capacity(2).expect("继续收缩");
        buf.set_reader_index(2).expect("读尽");
        buf.set_capacity(1).expect("读游标越过新容量");
        assert_eq!((buf.reader_index(), buf.writer_index()), (1, 1));
    }

    #[test]
    fn release_drops_array_for_every_alias() {
        let mut buf = HeapByteBuf::<BigEndian>::with_capacity(4);
        let alias = buf.duplicate();
        assert!(buf.release().expect("首次释放"));
        assert_eq!(alias.capacity(), 0);
        assert!(matches!(alias.get_u8(0), Err(BufferError::Released)));
        assert!(matches!(
            buf.release(),
            Err(BufferError::IllegalRefCount { ref_cnt: 0 })
        ));
    }

    #[test]
    fn debug_reports_indices() {
        let buf = HeapByteBuf::<BigEndian>::new(4, 16).expect("合法参数");
        assert_eq!(
            format!("{buf:?}"),
            "HeapByteBuf(ridx: 0, widx: 0, cap: 4/16)"
        );
    }
}
