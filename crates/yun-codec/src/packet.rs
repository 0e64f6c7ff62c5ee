//! 压缩数据包 (Packet).
//!
//! 流水线中移动的基本单位. 负载字节从不被解释, 只有时间戳、标志与
//! 流索引会被各阶段读取或改写.

use bitflags::bitflags;
use bytes::Bytes;
use yun_core::{NOPTS_VALUE, Rational, Timestamp};

bitflags! {
    /// 数据包标志
    ///
    /// 取值与原始记录格式中的 `flags` 字段一致.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PacketFlags: u32 {
        /// 关键帧
        const KEY = 1 << 0;
        /// 数据损坏
        const CORRUPT = 1 << 1;
    }
}

/// 压缩数据包
///
/// 由 Source 产生, 任一时刻只被当前持有它的阶段独占,
/// 写出或丢弃它的阶段负责消费.
#[derive(Debug, Clone)]
pub struct Packet {
    /// 负载数据
    pub data: Bytes,
    /// 显示时间戳 (PTS)
    pub pts: i64,
    /// 解码时间戳 (DTS)
    pub dts: i64,
    /// 时长 (以 time_base 为单位)
    pub duration: i64,
    /// 当前时间戳所用的时间基
    pub time_base: Rational,
    /// 所属流的索引
    pub stream_index: usize,
    /// 标志
    pub flags: PacketFlags,
    /// 在容器中的字节偏移量 (-1 表示未知)
    pub pos: i64,
}

impl Packet {
    /// 创建空数据包
    pub fn empty() -> Self {
        Self {
            data: Bytes::new(),
            pts: NOPTS_VALUE,
            dts: NOPTS_VALUE,
            duration: 0,
            time_base: Rational::UNDEFINED,
            stream_index: 0,
            flags: PacketFlags::empty(),
            pos: -1,
        }
    }

    /// 从数据创建数据包
    pub fn from_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            ..Self::empty()
        }
    }

    /// 数据大小 (字节)
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// 是否为关键帧
    pub fn is_keyframe(&self) -> bool {
        self.flags.contains(PacketFlags::KEY)
    }

    /// 设置或清除关键帧标志
    pub fn set_keyframe(&mut self, key: bool) {
        self.flags.set(PacketFlags::KEY, key);
    }

    /// 带时间基的 PTS, 用于日志
    pub fn pts_ts(&self) -> Timestamp {
        Timestamp::new(self.pts, self.time_base)
    }

    /// 带时间基的 DTS, 用于日志
    pub fn dts_ts(&self) -> Timestamp {
        Timestamp::new(self.dts, self.time_base)
    }
}
