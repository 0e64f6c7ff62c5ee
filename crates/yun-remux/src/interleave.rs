//! 两路来源的交织.
//!
//! 每路各有自己的比较时间基 (编码域). 两路当前包中 pts 较小者先出,
//! 相等时 A 路优先; 比较发生在任何一路换算到输出时间基之前.

use std::cmp::Ordering;

use yun_codec::Packet;
use yun_core::{Rational, YunResult, compare_ts};

use crate::source::PacketSource;

/// 交织输出的来路
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    /// A 路 (通常为视频)
    A,
    /// B 路 (通常为音频)
    B,
}

struct LaneState<'a> {
    source: &'a mut dyn PacketSource,
    time_base: Rational,
    head: Option<Packet>,
    /// 需要从来源再取一个包
    needs_pull: bool,
    exhausted: bool,
}

impl<'a> LaneState<'a> {
    fn new(source: &'a mut dyn PacketSource, time_base: Rational) -> Self {
        Self {
            source,
            time_base,
            head: None,
            needs_pull: true,
            exhausted: false,
        }
    }

    fn pull(&mut self) -> YunResult<()> {
        if self.needs_pull && !self.exhausted {
            self.head = self.source.next_packet()?;
            self.exhausted = self.head.is_none();
            self.needs_pull = false;
        }
        Ok(())
    }
}

/// 两路交织器, 任一路都可以缺省
pub struct Interleaver<'a> {
    a: Option<LaneState<'a>>,
    b: Option<LaneState<'a>>,
}

impl<'a> Interleaver<'a> {
    /// 创建交织器, 每路附带其比较时间基
    pub fn new(
        a: Option<(&'a mut dyn PacketSource, Rational)>,
        b: Option<(&'a mut dyn PacketSource, Rational)>,
    ) -> Self {
        Self {
            a: a.map(|(s, tb)| LaneState::new(s, tb)),
            b: b.map(|(s, tb)| LaneState::new(s, tb)),
        }
    }

    /// 取下一个包, 两路都耗尽时返回 `Ok(None)`
    pub fn next_packet(&mut self) -> YunResult<Option<(Lane, Packet)>> {
        for lane in [&mut self.a, &mut self.b].into_iter().flatten() {
            lane.pull()?;
        }

        let a_head = self.a.as_ref().and_then(|l| l.head.as_ref().map(|p| (p.pts, l.time_base)));
        let b_head = self.b.as_ref().and_then(|l| l.head.as_ref().map(|p| (p.pts, l.time_base)));

        let lane = match (a_head, b_head) {
            (None, None) => return Ok(None),
            (Some(_), None) => Lane::A,
            (None, Some(_)) => Lane::B,
            (Some((a_pts, a_tb)), Some((b_pts, b_tb))) => {
                if compare_ts(a_pts, a_tb, b_pts, b_tb) == Ordering::Greater {
                    Lane::B
                } else {
                    Lane::A
                }
            }
        };

        let state = match lane {
            Lane::A => self.a.as_mut(),
            Lane::B => self.b.as_mut(),
        };
        let packet = state.and_then(|s| {
            s.needs_pull = true;
            s.head.take()
        });
        Ok(packet.map(|p| (lane, p)))
    }
}
