//! 字节序编解码。
//!
//! # 模块定位（Why）
//! - 缓冲层唯一“线上可见”的契约就是多字节数值的字节序；所有 `get_*`/`set_*` 访问器都经由本模块完成
//!   数值与字节序列之间的互转，保证大端/小端变体行为一致。
//!
//! # 设计概要（How）
//! - [`ByteOrder`] 提供纯函数形式的读写，输入输出均为定长数组，不涉及任何状态或分配；
//! - [`BigEndian`]/[`LittleEndian`] 是类型级标记，具体缓冲以泛型参数 `O: Endianness` 固定字节序，
//!   字节序因而是变体的固有属性而非运行期可变状态，`duplicate()` 与 `copy()` 自然保留它。

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::sealed::Sealed;

/// 多字节数值的字节序。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    /// 网络字节序，最高有效字节在前。
    #[default]
    BigEndian,
    /// 最低有效字节在前。
    LittleEndian,
}

impl ByteOrder {
    /// 返回当前平台的本机字节序。
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::BigEndian
        } else {
            ByteOrder::LittleEndian
        }
    }

    #[inline]
    pub fn read_u16(self, src: [u8; 2]) -> u16 {
        match self {
            ByteOrder::BigEndian => u16::from_be_bytes(src),
            ByteOrder::LittleEndian => u16::from_le_bytes(src),
        }
    }

    #[inline]
    pub fn write_u16(self, value: u16) -> [u8; 2] {
        match self {
            ByteOrder::BigEndian => value.to_be_bytes(),
            ByteOrder::LittleEndian => value.to_le_bytes(),
        }
    }

    /// 将 3 个字节组合为 24 位无符号整数（unsigned medium）。
    ///
    /// 每个字节先按无符号值参与运算，大端下结果为 `(b0 << 16) | (b1 << 8) | b2`。
    #[inline]
    pub fn read_u24(self, src: [u8; 3]) -> u32 {
        let [b0, b1, b2] = src.map(u32::from);
        match self {
            ByteOrder::BigEndian => (b0 << 16) | (b1 << 8) | b2,
            ByteOrder::LittleEndian => b0 | (b1 << 8) | (b2 << 16),
        }
    }

    /// 取 `value` 的低 24 位拆为 3 个字节，高 8 位被忽略。
    #[inline]
    pub fn write_u24(self, value: u32) -> [u8; 3] {
        let b0 = (value >> 16) as u8;
        let b1 = (value >> 8) as u8;
        let b2 = value as u8;
        match self {
            ByteOrder::BigEndian => [b0, b1, b2],
            ByteOrder::LittleEndian => [b2, b1, b0],
        }
    }

    #[inline]
    pub fn read_u32(self, src: [u8; 4]) -> u32 {
        match self {
            ByteOrder::BigEndian => u32::from_be_bytes(src),
            ByteOrder::LittleEndian => u32::from_le_bytes(src),
        }
    }

    #[inline]
    pub fn write_u32(self, value: u32) -> [u8; 4] {
        match self {
            ByteOrder::BigEndian => value.to_be_bytes(),
            ByteOrder::LittleEndian => value.to_le_bytes(),
        }
    }

    #[inline]
    pub fn read_u64(self, src: [u8; 8]) -> u64 {
        match self {
            ByteOrder::BigEndian => u64::from_be_bytes(src),
            ByteOrder::LittleEndian => u64::from_le_bytes(src),
        }
    }

    #[inline]
    pub fn write_u64(self, value: u64) -> [u8; 8] {
        match self {
            ByteOrder::BigEndian => value.to_be_bytes(),
            ByteOrder::LittleEndian => value.to_le_bytes(),
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteOrder::BigEndian => f.write_str("BIG_ENDIAN"),
            ByteOrder::LittleEndian => f.write_str("LITTLE_ENDIAN"),
        }
    }
}

/// 类型级字节序标记。
///
/// # 契约说明（What）
/// - 该 trait 为密封 trait，仅有 [`BigEndian`] 与 [`LittleEndian`] 两个实现；
/// - 缓冲实现通过 `O::ORDER` 读取字节序，编译期即确定分支。
pub trait Endianness: Sealed + Copy + Default + fmt::Debug + Send + Sync + 'static {
    /// 该标记对应的运行期字节序值。
    const ORDER: ByteOrder;
}

/// 大端标记。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct BigEndian;

/// 小端标记。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LittleEndian;

impl Sealed for BigEndian {}
impl Sealed for LittleEndian {}

impl Endianness for BigEndian {
    const ORDER: ByteOrder = ByteOrder::BigEndian;
}

impl Endianness for LittleEndian {
    const ORDER: ByteOrder = ByteOrder::LittleEndian;
}
