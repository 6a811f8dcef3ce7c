//! 缓冲分配配置。
//!
//! # 模块定位（Why）
//! - 缓冲工厂/池属于外部协作者，但它们需要一份可序列化的“分配什么样的缓冲”描述，
//!   以便从配置文件或控制面下发；
//! - 本模块只负责描述与校验，并提供一个最小的 [`BufferConfig::allocate`] 入口，不做池化。
//!
//! # 契约说明（What）
//! - 缺省字段取默认值：原生存储、大端、初始 256 字节、上限 [`DEFAULT_MAX_CAPACITY`]；
//! - `validate` 在 `initial_capacity > max_capacity` 时返回 [`BufferError::InvalidArgument`]。

use serde::{Deserialize, Serialize};

use crate::{
    byte_buf::{DEFAULT_MAX_CAPACITY, check_capacity_args},
    direct::DirectByteBuf,
    error::Result,
    heap::HeapByteBuf,
    order::{BigEndian, ByteOrder, LittleEndian},
    unsafe_buf::UnsafeByteBuf,
};

/// 默认初始容量。
pub const DEFAULT_INITIAL_CAPACITY: usize = 256;

/// 存储类型。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// 托管堆数组。
    Heap,
    /// 原生内存区域。
    #[default]
    Direct,
}

/// 描述一次缓冲分配的参数。
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub storage: StorageKind,
    pub order: ByteOrder,
    pub initial_capacity: usize,
    pub max_capacity: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            storage: StorageKind::default(),
            order: ByteOrder::default(),
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            max_capacity: DEFAULT_MAX_CAPACITY,
        }
    }
}

impl BufferConfig {
    pub fn heap() -> Self {
        Self {
            storage: StorageKind::Heap,
            ..Self::default()
        }
    }

    pub fn direct() -> Self {
        Self::default()
    }

    pub fn with_order(mut self, order: ByteOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_capacity(mut self, initial_capacity: usize, max_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self.max_capacity = max_capacity;
        self
    }

    pub fn validate(&self) -> Result<()> {
        check_capacity_args(self.initial_capacity, self.max_capacity)
    }

    /// 按配置分配缓冲，返回带低层访问能力的句柄，交给传输层持有。
    pub fn allocate(&self) -> Result<Box<dyn UnsafeByteBuf>> {
        self.validate()?;
        let (initial, max) = (self.initial_capacity, self.max_capacity);
        Ok(match (self.storage, self.order) {
            (StorageKind::Heap, ByteOrder::BigEndian) => {
                Box::new(HeapByteBuf::<BigEndian>::new(initial, max)?)
            }
            (StorageKind::Heap, ByteOrder::LittleEndian) => {
                Box::new(HeapByteBuf::<LittleEndian>::new(initial, max)?)
            }
            (StorageKind::Direct, ByteOrder::BigEndian) => {
                Box::new(DirectByteBuf::<BigEndian>::allocate(initial, max)?)
            }
            (StorageKind::Direct, ByteOrder::LittleEndian) => {
                Box::new(DirectByteBuf::<LittleEndian>::allocate(initial, max)?)
            }
        })
    }
}
