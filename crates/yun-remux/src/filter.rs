//! 数据包过滤器.
//!
//! 过滤器在一次处理过程中对每个数据包调用一次, 返回四种结果之一.
//! `KeepAll` 之后过滤器不再被调用; `DropAll` 让处理过程像输入结束一样停止.

use std::collections::HashMap;

use log::info;
use serde::{Deserialize, Serialize};
use yun_codec::Packet;
use yun_core::NOPTS_VALUE;

/// 过滤结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterAction {
    /// 保留, 继续过滤后续数据包
    Keep,
    /// 丢弃, 继续过滤后续数据包
    Drop,
    /// 保留, 并对本次剩余数据包停用过滤
    KeepAll,
    /// 丢弃, 并立即结束本次处理
    DropAll,
}

/// 数据包过滤器
pub trait PacketFilter {
    /// 对一个数据包做出决定
    fn filter(&mut self, packet: &Packet) -> FilterAction;
}

impl<F> PacketFilter for F
where
    F: FnMut(&Packet) -> FilterAction,
{
    fn filter(&mut self, packet: &Packet) -> FilterAction {
        self(packet)
    }
}

/// 单条流上的帧序号窗口 `[begin, end]` (含两端)
///
/// 其他流的数据包一律保留. 序号从 0 开始, 只统计目标流.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRange {
    /// 目标流索引
    pub stream_index: usize,
    /// 起始序号, `None` 表示不限
    pub begin: Option<i64>,
    /// 结束序号 (含), `None` 表示不限
    pub end: Option<i64>,
    #[serde(skip)]
    count: i64,
}

impl FrameRange {
    /// 创建帧序号窗口
    pub fn new(stream_index: usize, begin: Option<i64>, end: Option<i64>) -> Self {
        Self {
            stream_index,
            begin,
            end,
            count: 0,
        }
    }

    /// 整体平移窗口, 返回计数清零的新过滤器
    pub fn shift(&self, n: i64) -> Self {
        Self::new(
            self.stream_index,
            self.begin.map(|b| b + n),
            self.end.map(|e| e + n),
        )
    }
}

impl PacketFilter for FrameRange {
    fn filter(&mut self, packet: &Packet) -> FilterAction {
        if packet.stream_index != self.stream_index {
            return FilterAction::Keep;
        }
        let idx = self.count;
        self.count += 1;
        if self.begin.is_some_and(|b| idx < b) || self.end.is_some_and(|e| e < idx) {
            FilterAction::Drop
        } else {
            FilterAction::Keep
        }
    }
}

/// 单调性过滤器
///
/// 每条流记录最后一个被保留的 pts; pts 不大于它的数据包被丢弃,
/// 且不移动该水位. 未定义的 pts 总是保留.
#[derive(Debug, Clone, Default)]
pub struct MonotonicFilter {
    last_pts: HashMap<usize, i64>,
    dropped: u64,
}

impl MonotonicFilter {
    /// 创建单调性过滤器
    pub fn new() -> Self {
        Self::default()
    }

    /// 已丢弃的数据包数
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// 某条流的当前水位
    pub fn last_pts(&self, stream_index: usize) -> Option<i64> {
        self.last_pts.get(&stream_index).copied()
    }
}

impl PacketFilter for MonotonicFilter {
    fn filter(&mut self, packet: &Packet) -> FilterAction {
        if packet.pts == NOPTS_VALUE {
            return FilterAction::Keep;
        }
        match self.last_pts.get(&packet.stream_index) {
            Some(&last) if packet.pts <= last => {
                info!(
                    "丢弃流 {} 上 pts 非单调递增的数据包: {} <= {last}",
                    packet.stream_index, packet.pts
                );
                self.dropped += 1;
                FilterAction::Drop
            }
            _ => {
                self.last_pts.insert(packet.stream_index, packet.pts);
                FilterAction::Keep
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(stream_index: usize, pts: i64) -> Packet {
        let mut p = Packet::from_data(vec![0u8; 1]);
        p.stream_index = stream_index;
        p.pts = pts;
        p.dts = pts;
        p
    }

    #[test]
    fn test_帧序号窗口() {
        let mut range = FrameRange::new(1, Some(2), Some(3));
        let actions: Vec<FilterAction> = (0..6).map(|_| range.filter(&packet(1, 0))).collect();
        use FilterAction::*;
        assert_eq!(actions, vec![Drop, Drop, Keep, Keep, Drop, Drop]);
        assert_eq!(range.filter(&packet(0, 0)), Keep);
    }

    #[test]
    fn test_窗口平移() {
        let range = FrameRange::new(0, Some(0), Some(1)).shift(1);
        assert_eq!((range.begin, range.end), (Some(1), Some(2)));
        let mut open_end = FrameRange::new(0, Some(1), None);
        assert_eq!(open_end.filter(&packet(0, 0)), FilterAction::Drop);
        assert_eq!(open_end.filter(&packet(0, 0)), FilterAction::Keep);
        assert_eq!(open_end.filter(&packet(0, 0)), FilterAction::Keep);
    }

    #[test]
    fn test_单调性过滤() {
        let mut f = MonotonicFilter::new();
        assert_eq!(f.filter(&packet(0, 10)), FilterAction::Keep);
        assert_eq!(f.filter(&packet(0, 10)), FilterAction::Drop);
        assert_eq!(f.filter(&packet(0, 5)), FilterAction::Drop);
        // 被丢弃的包不移动水位
        assert_eq!(f.last_pts(0), Some(10));
        assert_eq!(f.filter(&packet(0, 11)), FilterAction::Keep);
        // 各流独立
        assert_eq!(f.filter(&packet(1, 0)), FilterAction::Keep);
        assert_eq!(f.dropped(), 2);
    }

    #[test]
    fn test_闭包过滤器() {
        let mut seen = 0;
        let mut f = |_: &Packet| {
            seen += 1;
            if seen == 3 { FilterAction::DropAll } else { FilterAction::Keep }
        };
        assert_eq!(f.filter(&packet(0, 0)), FilterAction::Keep);
        assert_eq!(f.filter(&packet(0, 0)), FilterAction::Keep);
        assert_eq!(f.filter(&packet(0, 0)), FilterAction::DropAll);
    }
}
