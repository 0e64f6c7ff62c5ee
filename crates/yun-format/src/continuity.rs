//! 连续性计数器存储.
//!
//! MPEG-TS 为每个 PID 维护一个 4 位的连续性计数器 (CC), 每发出一个
//! 携带负载的 TS 包就加 1 (模 16). 把一个容器中的计数器导出 (extract)
//! 再注入 (inject) 到新打开的封装器, 新输出的计数器就能紧接着旧输出继续.
//!
//! 存储记录的是每个 PID *最后一次发出* 的计数值. 注入 `c` 之后,
//! 该 PID 下一个发出的包携带 `(c + 1) % 16`.

use std::collections::BTreeMap;

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use yun_core::{YunError, YunResult};

/// 计数器取值掩码
pub const CC_MASK: u8 = 0x0F;

/// 一个 (PID, 计数器) 对
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuityCounter {
    /// 通道 ID (PID)
    pub pid: u16,
    /// 最后发出的计数值 (0..=15)
    pub cc: u8,
}

impl ContinuityCounter {
    /// 创建计数器条目
    pub const fn new(pid: u16, cc: u8) -> Self {
        Self { pid, cc }
    }
}

/// 导出结果
///
/// `counters` 按 PID 升序且最多 `max` 条; `available` 是容器中实际存在的
/// 通道数, 两者之差即被截断的条数.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    /// 计数器条目
    pub counters: Vec<ContinuityCounter>,
    /// 可用的通道总数
    pub available: usize,
}

impl CounterSnapshot {
    /// 因上限被跳过的条数
    pub fn skipped(&self) -> usize {
        self.available.saturating_sub(self.counters.len())
    }

    /// 查找某个 PID 的计数值
    pub fn get(&self, pid: u16) -> Option<u8> {
        self.counters.iter().find(|c| c.pid == pid).map(|c| c.cc)
    }
}

/// 连续性计数器存储接口
///
/// 由带有连续性状态的容器实现; 封装器/解封装器通过
/// `continuity()` / `continuity_mut()` 暴露它.
pub trait ContinuityStore {
    /// 所有通道的计数器, 按 PID 升序
    fn counters(&self) -> Vec<ContinuityCounter>;

    /// 设置某个通道最后发出的计数值, 通道不存在时返回 `false`
    fn set_counter(&mut self, pid: u16, cc: u8) -> bool;

    /// 导出最多 `max` 条计数器
    fn extract(&self, max: usize) -> CounterSnapshot {
        let all = self.counters();
        let available = all.len();
        for skipped in all.iter().skip(max) {
            warn!(
                "连续性计数器超出上限 {max}, 跳过 pid={:#06x} cc={}",
                skipped.pid, skipped.cc
            );
        }
        CounterSnapshot {
            counters: all.into_iter().take(max).collect(),
            available,
        }
    }

    /// 注入计数器, 返回实际生效的条数
    ///
    /// 目标中不存在的 PID 记录日志后跳过; 计数值超过 15 返回 `BadValue`.
    fn inject(&mut self, counters: &[ContinuityCounter]) -> YunResult<usize> {
        if let Some(bad) = counters.iter().find(|c| c.cc > CC_MASK) {
            return Err(YunError::BadValue(format!(
                "连续性计数器越界: pid={:#06x} cc={}",
                bad.pid, bad.cc
            )));
        }
        let mut applied = 0;
        for counter in counters {
            if self.set_counter(counter.pid, counter.cc) {
                debug!("注入连续性计数器 pid={:#06x} cc={}", counter.pid, counter.cc);
                applied += 1;
            } else {
                warn!("目标中没有 pid={:#06x}, 跳过计数器注入", counter.pid);
            }
        }
        Ok(applied)
    }
}

/// 按 PID 记录计数器的表, TS 封装器与解封装器共用
#[derive(Debug, Clone, Default)]
pub struct CounterTable {
    last: BTreeMap<u16, u8>,
}

impl CounterTable {
    /// 创建空表
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始跟踪一个 PID, 已存在时保持原值
    pub fn track(&mut self, pid: u16, last: u8) {
        self.last.entry(pid).or_insert(last & CC_MASK);
    }

    /// 是否正在跟踪
    pub fn is_tracked(&self, pid: u16) -> bool {
        self.last.contains_key(&pid)
    }

    /// 记录观察到的计数值, PID 未跟踪时开始跟踪
    pub fn record(&mut self, pid: u16, cc: u8) {
        self.last.insert(pid, cc & CC_MASK);
    }

    /// 取下一个要发出的计数值并推进
    ///
    /// 未跟踪的 PID 从 0 开始.
    pub fn advance(&mut self, pid: u16) -> u8 {
        let last = self.last.entry(pid).or_insert(CC_MASK);
        *last = (*last + 1) & CC_MASK;
        *last
    }

    /// 清空所有记录
    pub fn clear(&mut self) {
        self.last.clear();
    }
}

impl ContinuityStore for CounterTable {
    fn counters(&self) -> Vec<ContinuityCounter> {
        self.last
            .iter()
            .map(|(&pid, &cc)| ContinuityCounter::new(pid, cc))
            .collect()
    }

    fn set_counter(&mut self, pid: u16, cc: u8) -> bool {
        match self.last.get_mut(&pid) {
            Some(last) => {
                *last = cc & CC_MASK;
                true
            }
            None => false,
        }
    }
}
