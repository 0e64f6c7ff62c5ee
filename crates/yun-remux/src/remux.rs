//! 转封装: 来源 → 过滤器 → 时间戳重映射 → 输出, 单遍完成.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use yun_core::{YunError, YunResult};
use yun_format::{ContinuityCounter, CounterSnapshot, MuxOptions};

use crate::abort::AbortSignal;
use crate::filter::{FilterAction, PacketFilter};
use crate::remap::remap;
use crate::sink::PendingSink;
use crate::source::PacketSource;

/// 默认导出的连续性计数器上限
pub const DEFAULT_MAX_COUNTERS: usize = 64;

/// 转封装选项
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemuxOptions {
    /// 每条流的时间戳偏移 (源时间基单位), 缺省的流为 0
    pub offsets: Vec<i64>,
    /// 写出第一个包之前注入的连续性计数器
    pub counters: Vec<ContinuityCounter>,
    /// 封装器选项
    pub mux_options: MuxOptions,
    /// 收尾后导出的计数器上限
    pub max_counters: usize,
}

impl Default for RemuxOptions {
    fn default() -> Self {
        Self {
            offsets: Vec::new(),
            counters: Vec::new(),
            mux_options: MuxOptions::new(),
            max_counters: DEFAULT_MAX_COUNTERS,
        }
    }
}

impl RemuxOptions {
    fn offset(&self, stream_index: usize) -> i64 {
        self.offsets.get(stream_index).copied().unwrap_or(0)
    }
}

/// 转封装统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct RemuxStats {
    /// 读入的数据包数
    pub packets_read: u64,
    /// 写出的数据包数
    pub packets_written: u64,
    /// 被过滤器丢弃的数据包数
    pub packets_dropped: u64,
    /// 输出收尾后的连续性计数器 (仅 MPEG-TS 输出)
    pub counters: Option<CounterSnapshot>,
}

/// 把来源的全部数据包转封装到输出
///
/// 输出须以来源的流列表打开 (见 [`PendingSink::open`]).
/// 过滤器返回 `DropAll` 时如同输入结束, 正常收尾.
pub fn remux(
    source: &mut dyn PacketSource,
    sink: PendingSink,
    mut filter: Option<&mut dyn PacketFilter>,
    options: &RemuxOptions,
    abort: &dyn AbortSignal,
) -> YunResult<RemuxStats> {
    let in_streams = source.streams().to_vec();
    if sink.streams().len() != in_streams.len() {
        return Err(YunError::BadValue(format!(
            "输出流数 {} 与输入流数 {} 不一致",
            sink.streams().len(),
            in_streams.len()
        )));
    }

    let mut sink = sink.write_header(&options.mux_options)?;
    sink.inject_continuity(&options.counters)?;
    let out_time_bases: Vec<_> = sink.streams().iter().map(|s| s.time_base).collect();

    let mut stats = RemuxStats::default();
    loop {
        abort.check().inspect_err(|_| info!("转封装已中止"))?;

        let Some(packet) = source.next_packet()? else {
            break;
        };
        stats.packets_read += 1;
        let index = packet.stream_index;
        let Some(in_stream) = in_streams.get(index) else {
            return Err(YunError::StreamNotFound(index));
        };

        if let Some(f) = filter.as_deref_mut() {
            match f.filter(&packet) {
                FilterAction::Keep => {}
                FilterAction::Drop => {
                    stats.packets_dropped += 1;
                    continue;
                }
                FilterAction::KeepAll => {
                    debug!("过滤器返回 KeepAll, 停用过滤");
                    filter = None;
                }
                FilterAction::DropAll => {
                    debug!("过滤器返回 DropAll, 结束处理");
                    stats.packets_dropped += 1;
                    break;
                }
            }
        }

        debug!("输入 #{index} {} dts={}", packet.pts_ts(), packet.dts);
        let packet = remap(
            packet,
            in_stream.time_base,
            out_time_bases[index],
            options.offset(index),
        );
        debug!("输出 #{index} {} dts={}", packet.pts_ts(), packet.dts);
        sink.write_packet(&packet)?;
        stats.packets_written += 1;
    }

    let closed = sink.finish()?;
    stats.counters = closed.extract_continuity(options.max_counters);
    info!(
        "转封装完成: 读入 {}, 写出 {}, 丢弃 {}",
        stats.packets_read, stats.packets_written, stats.packets_dropped
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abort::NeverAbort;
    use crate::source::packet_list;
    use yun_codec::{CodecId, Packet};
    use yun_core::Rational;
    use yun_format::io::{MemoryBackend, MemoryHandle};
    use yun_format::{FormatHint, FormatRegistry, IoContext, Stream};

    fn registry() -> FormatRegistry {
        let mut r = FormatRegistry::new();
        yun_format::register_all(&mut r);
        r
    }

    fn source(count: i64) -> impl PacketSource {
        let streams = vec![Stream::new(0, CodecId::Aac, Rational::new(1, 1000))];
        let packets = (0..count)
            .map(|i| {
                let mut p = Packet::from_data(vec![i as u8; 10]);
                p.pts = i * 20;
                p.dts = i * 20;
                p.duration = 20;
                p
            })
            .collect();
        packet_list(streams, packets)
    }

    fn ts_sink(streams: &[Stream]) -> (PendingSink, MemoryHandle) {
        let backend = MemoryBackend::new();
        let handle = backend.handle();
        let io = IoContext::new(Box::new(backend));
        let sink = PendingSink::open(&registry(), io, &FormatHint::named("mpegts"), streams).unwrap();
        (sink, handle)
    }

    #[test]
    fn test_转封装_丢弃全部后正常收尾() {
        let mut src = source(10);
        let (sink, _) = ts_sink(src.streams());
        let mut seen = 0;
        let mut filter = |_: &Packet| {
            seen += 1;
            if seen == 5 { FilterAction::DropAll } else { FilterAction::Keep }
        };
        let stats = remux(&mut src, sink, Some(&mut filter), &RemuxOptions::default(), &NeverAbort).unwrap();
        assert_eq!(stats.packets_written, 4);
        assert_eq!(stats.packets_read, 5);
        assert_eq!(stats.counters.unwrap().get(0x0100), Some(3));
    }

    #[test]
    fn test_转封装_保留全部后不再调用过滤器() {
        let mut src = source(6);
        let (sink, _) = ts_sink(src.streams());
        let mut calls = 0;
        let mut filter = |_: &Packet| {
            calls += 1;
            if calls == 1 { FilterAction::Drop } else { FilterAction::KeepAll }
        };
        let stats = remux(&mut src, sink, Some(&mut filter), &RemuxOptions::default(), &NeverAbort).unwrap();
        assert_eq!(calls, 2);
        assert_eq!(stats.packets_dropped, 1);
        assert_eq!(stats.packets_written, 5);
    }

    #[test]
    fn test_转封装_中止不写尾部() {
        let mut src = source(3);
        let (sink, handle) = ts_sink(src.streams());
        let err = remux(&mut src, sink, None, &RemuxOptions::default(), &|| true).unwrap_err();
        assert!(err.is_aborted());
        // 头部推迟到第一个包, 中止时没有任何输出
        assert!(handle.is_empty());
    }

    #[test]
    fn test_转封装_注入计数器() {
        let mut src = source(2);
        let (sink, _) = ts_sink(src.streams());
        let options = RemuxOptions {
            counters: vec![ContinuityCounter::new(0x0000, 5), ContinuityCounter::new(0x0100, 14)],
            ..Default::default()
        };
        let stats = remux(&mut src, sink, None, &options, &NeverAbort).unwrap();
        let snap = stats.counters.unwrap();
        assert_eq!(snap.get(0x0000), Some(6));
        assert_eq!(snap.get(0x0100), Some(0));
    }

    #[test]
    fn test_选项_json() {
        let options: RemuxOptions =
            serde_json::from_str(r#"{"offsets":[90],"mux_options":{"psi_period":"10"}}"#).unwrap();
        assert_eq!(options.offset(0), 90);
        assert_eq!(options.offset(3), 0);
        assert_eq!(options.max_counters, DEFAULT_MAX_COUNTERS);
        assert_eq!(options.mux_options.get("psi_period"), Some("10"));
    }
}
