//! 扫描与信息查询: 读完整个输入取出连续性计数器, 或只打开输入报告流信息.

use log::{debug, info};
use serde::Serialize;
use yun_core::{MediaType, NOPTS_VALUE, Rational, YunResult};
use yun_format::{CounterSnapshot, FormatHint, FormatRegistry, IoContext};

use crate::abort::AbortSignal;
use crate::source::{DemuxSource, PacketSource};

/// 单条流的扫描统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamScan {
    /// 数据包数
    pub packets: u64,
    /// 负载总字节数
    pub bytes: u64,
    /// 关键帧数
    pub keyframes: u64,
    /// 首个有效 pts
    pub first_pts: Option<i64>,
    /// 最后一个有效 pts
    pub last_pts: Option<i64>,
}

/// 扫描结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    /// 读取的数据包总数
    pub packets: u64,
    /// 按流索引排列的统计
    pub streams: Vec<StreamScan>,
    /// 每个通道最后的连续性计数器 (非 MPEG-TS 输入为空)
    pub counters: CounterSnapshot,
}

/// 读完整个来源, 报告每条流的统计与最后的连续性计数器
///
/// 每个数据包前检查一次中止信号.
pub fn scan(source: &mut dyn PacketSource, max_counters: usize, abort: &dyn AbortSignal) -> YunResult<ScanReport> {
    let mut report = ScanReport {
        streams: vec![StreamScan::default(); source.streams().len()],
        ..Default::default()
    };

    loop {
        abort.check()?;
        let Some(packet) = source.next_packet()? else {
            break;
        };
        report.packets += 1;
        let Some(entry) = report.streams.get_mut(packet.stream_index) else {
            debug!("忽略未声明流 {} 上的数据包", packet.stream_index);
            continue;
        };
        entry.packets += 1;
        entry.bytes += packet.size() as u64;
        if packet.is_keyframe() {
            entry.keyframes += 1;
        }
        if packet.pts != NOPTS_VALUE {
            entry.first_pts.get_or_insert(packet.pts);
            entry.last_pts = Some(packet.pts);
        }
    }

    if let Some(store) = source.continuity() {
        report.counters = store.extract(max_counters);
    }
    info!(
        "扫描完成: {} 个数据包, {} 个连续性通道",
        report.packets,
        report.counters.counters.len()
    );
    Ok(report)
}

/// 流信息
#[derive(Debug, Clone, Serialize)]
pub struct StreamInfo {
    /// 流索引
    pub index: usize,
    /// 媒体类型
    pub media_type: MediaType,
    /// 编解码器短名
    pub codec: String,
    /// 时间基
    pub time_base: Rational,
}

/// 输入信息
#[derive(Debug, Clone, Serialize)]
pub struct StatReport {
    /// 识别出的格式名
    pub format: String,
    /// 流列表
    pub streams: Vec<StreamInfo>,
}

/// 打开输入并报告格式与流, 不读取数据包
pub fn stat(registry: &FormatRegistry, io: IoContext, hint: &FormatHint) -> YunResult<StatReport> {
    let source = DemuxSource::open(registry, io, hint)?;
    let streams = source
        .streams()
        .iter()
        .map(|s| StreamInfo {
            index: s.index,
            media_type: s.media_type,
            codec: s.codec_id.name().to_string(),
            time_base: s.time_base,
        })
        .collect();
    Ok(StatReport {
        format: source.format_id().name().to_string(),
        streams,
    })
}

/// 报告中某类媒体的流数
pub fn count_streams(report: &StatReport, media_type: MediaType) -> usize {
    report.streams.iter().filter(|s| s.media_type == media_type).count()
}
