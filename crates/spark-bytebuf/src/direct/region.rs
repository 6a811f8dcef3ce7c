use std::{
    alloc::{self, Layout},
    fmt,
    ptr::NonNull,
};

use tracing::trace;

use crate::{
    byte_buf::RawRegion,
    error::{BufferError, Result},
    slot::Storage,
};

/// 原生区域的对齐要求，满足常见 SIMD 与 DMA 访问。
const REGION_ALIGN: usize = 16;

/// 由调用方提供、释放责任仍归调用方的原生内存区域。
///
/// # 契约说明（What）
/// - 通过 [`DirectByteBuf::wrap`](crate::DirectByteBuf::wrap) 交给缓冲后，缓冲只读写这块内存，
///   永远不会释放它；
/// - 只读区域与空指针区域可以构造，但包装时会以 [`BufferError::InvalidArgument`] 拒绝。
pub struct ForeignRegion {
    ptr: *mut u8,
    len: usize,
    read_only: bool,
}

// SAFETY: 区域的生命周期与别名约束由构造方承诺，跨线程交接遵循单写者约定。
unsafe impl Send for ForeignRegion {}

impl ForeignRegion {
    /// 描述一块可写的外部内存。
    ///
    /// # Safety
    /// - `ptr` 必须对 `len` 字节可读写，并且在包装它的缓冲（及其全部别名）销毁前保持有效；
    /// - 调用方在此期间不得通过其它途径并发访问这块内存。
    pub unsafe fn from_raw_parts(ptr: *mut u8, len: usize) -> Self {
        Self {
            ptr,
            len,
            read_only: false,
        }
    }

    /// 描述一块只读的外部内存，仅用于让包装方拒绝它。
    ///
    /// # Safety
    /// 与 [`from_raw_parts`](Self::from_raw_parts) 相同。
    pub unsafe fn read_only(ptr: *const u8, len: usize) -> Self {
        Self {
            ptr: ptr.cast_mut(),
            len,
            read_only: true,
        }
    }

    /// 借出一块静态可变内存，例如 `Box::leak` 的结果。
    pub fn from_static(bytes: &'static mut [u8]) -> Self {
        Self {
            ptr: bytes.as_mut_ptr(),
            len: bytes.len(),
            read_only: false,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}

impl fmt::Debug for ForeignRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignRegion")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("read_only", &self.read_only)
            .finish()
    }
}

/// 缓冲持有的原生区域句柄：基址 + 长度 + 是否由外部负责释放。
///
/// 自有区域在 `Drop` 中恰好释放一次；外部区域（`do_not_free`）只被遗忘。
pub(crate) struct NativeRegion {
    ptr: NonNull<u8>,
    len: usize,
    do_not_free: bool,
}

// SAFETY: 区域只经由 `RawRegion` 以原始指针读写，内容写入遵循单写者约定；
// 回收只发生在最后一个 `Arc` 被丢弃时。
unsafe impl Send for NativeRegion {}
// SAFETY: 同上。
unsafe impl Sync for NativeRegion {}

impl NativeRegion {
    /// 分配 `len` 字节的清零区域；长度为 0 时不触发分配。
    pub(crate) fn allocate(len: usize) -> Result<Self> {
        if len == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                len,
                do_not_free: false,
            });
        }
        let layout = Self::layout(len)?;
        // SAFETY: `layout` 尺寸非零。
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw) else {
            alloc::handle_alloc_error(layout);
        };
        trace!(target: "spark_bytebuf", len, "native region allocated");
        Ok(Self {
            ptr,
            len,
            do_not_free: false,
        })
    }

    /// 接管外部区域，拒绝只读或空指针区域。
    pub(crate) fn foreign(region: ForeignRegion) -> Result<Self> {
        if region.read_only {
            return Err(BufferError::invalid_argument("region is read-only"));
        }
        let ptr = NonNull::new(region.ptr)
            .ok_or_else(|| BufferError::invalid_argument("region is null"))?;
        Ok(Self {
            ptr,
            len: region.len,
            do_not_free: true,
        })
    }

    fn layout(len: usize) -> Result<Layout> {
        Layout::from_size_align(len, REGION_ALIGN)
            .map_err(|err| {
                BufferError::invalid_argument(format!("native region of {len} bytes: {err}"))
            })
    }

    pub(crate) fn is_foreign(&self) -> bool {
        self.do_not_free
    }

    pub(crate) fn address(&self) -> NonNull<u8> {
        self.ptr
    }

}

impl Storage for NativeRegion {
    fn raw(&self) -> RawRegion {
        // SAFETY: 区域在本句柄存活期间对 `len` 字节可读写。
        unsafe { RawRegion::new(self.ptr.as_ptr(), self.len) }
    }

    fn len(&self) -> usize {
        self.len
    }
}

impl Drop for NativeRegion {
    fn drop(&mut self) {
        if self.do_not_free || self.len == 0 {
            return;
        }
        // 分配时已验证同一尺寸的布局。
        if let Ok(layout) = Self::layout(self.len) {
            // SAFETY: 区域由 `allocate` 以相同布局分配，且只在此处释放一次。
            unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) };
            trace!(target: "spark_bytebuf", len = self.len, "native region freed");
        }
    }
}

impl fmt::Debug for NativeRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeRegion")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("do_not_free", &self.do_not_free)
            .finish()
    }
}
