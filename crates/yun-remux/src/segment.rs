//! 分段器.
//!
//! 状态机 `Init → Open → {Open, Splitting} → Closed`:
//!
//! - `Init`: 校验模板、时长与参考流索引, 选定参考流 (缺省为 0)
//! - `Open`: 按序号展开模板打开新输出, 写头部, 注入连续性计数器
//!   (第 0 段注入调用方给出的计数器, 之后每段注入上一段关闭时的计数器)
//! - 每个包换算到当前段的输出时间基后判断是否切分; 切分时上一段只 flush
//!   不写尾部, 关闭后再打开下一段
//! - 输入结束时给最后一段写尾部

use log::{debug, info};
use serde::{Deserialize, Serialize};
use yun_codec::Packet;
use yun_core::{MediaType, NOPTS_VALUE, Rational, YunError, YunResult};
use yun_format::{
    ContinuityCounter, CounterSnapshot, FormatHint, FormatRegistry, IoContext, MuxOptions, Stream,
};

use crate::abort::AbortSignal;
use crate::remap::remap;
use crate::remux::DEFAULT_MAX_COUNTERS;
use crate::sink::{ActiveSink, PendingSink};
use crate::source::PacketSource;
use crate::template::SegmentTemplate;

/// 分段选项
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentOptions {
    /// 目标分段时长 (秒)
    pub duration: f64,
    /// 安全余量 (秒), 从目标时长中扣除
    pub margin: f64,
    /// 参考流索引, 缺省为 0
    pub ref_stream: Option<usize>,
    /// 第 0 段注入的连续性计数器
    pub counters: Vec<ContinuityCounter>,
    /// 封装器选项, 每段都会应用
    pub mux_options: MuxOptions,
    /// 结束后导出的计数器上限
    pub max_counters: usize,
}

impl Default for SegmentOptions {
    fn default() -> Self {
        Self {
            duration: 10.0,
            margin: 0.0,
            ref_stream: None,
            counters: Vec::new(),
            mux_options: MuxOptions::new(),
            max_counters: DEFAULT_MAX_COUNTERS,
        }
    }
}

/// 一个已完成的分段
#[derive(Debug, Clone, Serialize)]
pub struct SegmentInfo {
    /// 文件名 (模板展开结果)
    pub file_name: String,
    /// 写入的数据包数
    pub packets: u64,
    /// 起始 pts (参考流输出时间基), 段内没有参考流数据包时为 `None`
    pub start_pts: Option<i64>,
}

/// 分段结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct SegmentReport {
    /// 按顺序排列的分段
    pub segments: Vec<SegmentInfo>,
    /// 读入的数据包数
    pub packets_read: u64,
    /// 参考流
    pub ref_stream: usize,
    /// 切分间隔 (参考流输出时间基)
    pub interval: i64,
    /// 最后一段收尾后的连续性计数器 (仅 MPEG-TS 输出)
    pub counters: Option<CounterSnapshot>,
}

/// 计算切分间隔: (时长 - 余量) 换算到参考流输出时间基, 向零截断
fn split_interval(duration: f64, margin: f64, time_base: Rational) -> i64 {
    ((duration - margin) * f64::from(time_base.den) / f64::from(time_base.num)) as i64
}

struct Segmenter<'r, O> {
    registry: &'r FormatRegistry,
    format: FormatHint,
    template: SegmentTemplate,
    opener: O,
    options: &'r SegmentOptions,
    in_streams: Vec<Stream>,
    ref_stream: usize,
    ref_is_video: bool,
    number: u32,
    sink: Option<ActiveSink>,
    current: Option<SegmentInfo>,
    /// 本段内上一次切分 (或第一个 pts 已知的参考包) 的 pts
    last_split_pts: Option<i64>,
    report: SegmentReport,
}

impl<'r, O> Segmenter<'r, O>
where
    O: FnMut(&str) -> YunResult<IoContext>,
{
    /// 打开第 `self.number` 段并注入计数器
    fn open_segment(&mut self, counters: &[ContinuityCounter]) -> YunResult<()> {
        let file_name = self.template.expand(self.number)?;
        let io = (self.opener)(&file_name)?;
        let pending = PendingSink::open(self.registry, io, &self.format, &self.in_streams)?;
        let mut sink = pending.write_header(&self.options.mux_options)?;
        sink.inject_continuity(counters)?;
        info!("打开分段 #{} {file_name}", self.number);
        self.sink = Some(sink);
        self.current = Some(SegmentInfo {
            file_name,
            packets: 0,
            start_pts: None,
        });
        Ok(())
    }

    fn active(&mut self) -> YunResult<&mut ActiveSink> {
        self.sink
            .as_mut()
            .ok_or_else(|| YunError::BadValue("没有打开的分段".into()))
    }

    fn close_current(&mut self, counters_after: Option<usize>) -> YunResult<Vec<ContinuityCounter>> {
        let Some(sink) = self.sink.take() else {
            return Ok(Vec::new());
        };
        let closed = match counters_after {
            // 最后一段写尾部
            Some(_) => sink.finish()?,
            None => sink.detach()?,
        };
        if let Some(info) = self.current.take() {
            info!("关闭分段 #{} {} ({} 个数据包)", self.number, info.file_name, info.packets);
            self.report.segments.push(info);
        }
        if let Some(max) = counters_after {
            self.report.counters = closed.extract_continuity(max);
        }
        Ok(closed
            .continuity()
            .map(|store| store.counters())
            .unwrap_or_default())
    }

    /// 切分: 上一段 flush 后关闭, 再打开下一段并接续计数器
    fn split(&mut self) -> YunResult<()> {
        let carried = self.close_current(None)?;
        self.number += 1;
        self.open_segment(&carried)
    }

    fn should_split(&self, packet: &Packet, interval: i64) -> bool {
        if packet.stream_index != self.ref_stream || packet.pts == NOPTS_VALUE {
            return false;
        }
        let Some(last) = self.last_split_pts else {
            return false;
        };
        if self.ref_is_video && !packet.is_keyframe() {
            return false;
        }
        packet.pts.saturating_sub(last) >= interval
    }

    fn run(
        &mut self,
        source: &mut dyn PacketSource,
        abort: &dyn AbortSignal,
    ) -> YunResult<()> {
        let initial = self.options.counters.clone();
        self.open_segment(&initial)?;

        let ref_stream = self.ref_stream;
        let out_tb = self.active()?.streams()[ref_stream].time_base;
        let interval = split_interval(self.options.duration, self.options.margin, out_tb);
        self.report.interval = interval;
        debug!("分段间隔 {interval} (时间基 {out_tb})");

        loop {
            abort.check().inspect_err(|_| info!("分段已中止"))?;

            let Some(packet) = source.next_packet()? else {
                break;
            };
            self.report.packets_read += 1;
            let index = packet.stream_index;
            let Some(in_stream) = self.in_streams.get(index) else {
                return Err(YunError::StreamNotFound(index));
            };
            let in_tb = in_stream.time_base;
            let to_tb = self.active()?.streams()[index].time_base;
            let packet = remap(packet, in_tb, to_tb, 0);

            if self.should_split(&packet, interval) {
                debug!("在 pts={} 处切分", packet.pts);
                self.split()?;
                self.last_split_pts = Some(packet.pts);
            } else if index == self.ref_stream
                && self.last_split_pts.is_none()
                && packet.pts != NOPTS_VALUE
            {
                // 第一个 pts 已知的参考包只作为起点
                self.last_split_pts = Some(packet.pts);
            }

            if index == self.ref_stream && packet.pts != NOPTS_VALUE {
                if let Some(info) = self.current.as_mut() {
                    info.start_pts.get_or_insert(packet.pts);
                }
            }
            self.active()?.write_packet(&packet)?;
            if let Some(info) = self.current.as_mut() {
                info.packets += 1;
            }
        }

        let max = self.options.max_counters;
        self.close_current(Some(max))?;
        Ok(())
    }
}

/// 把来源切分成一组输出
///
/// `opener` 按文件名打开每段的输出; `format` 为空时由模板的扩展名推断格式.
pub fn segment<O>(
    source: &mut dyn PacketSource,
    registry: &FormatRegistry,
    format: Option<&str>,
    template: &str,
    opener: O,
    options: &SegmentOptions,
    abort: &dyn AbortSignal,
) -> YunResult<SegmentReport>
where
    O: FnMut(&str) -> YunResult<IoContext>,
{
    // 参数校验
    let template = SegmentTemplate::parse(template)?;
    if !(options.duration > 0.0) {
        return Err(YunError::BadValue(format!(
            "分段时长须为正数: {}",
            options.duration
        )));
    }
    if !(options.duration - options.margin > 0.0) {
        return Err(YunError::BadValue(format!(
            "安全余量 {} 不小于分段时长 {}",
            options.margin, options.duration
        )));
    }
    let in_streams = source.streams().to_vec();
    let ref_stream = options.ref_stream.unwrap_or(0);
    let Some(reference) = in_streams.get(ref_stream) else {
        return Err(YunError::BadValue(format!(
            "参考流索引 {ref_stream} 越界 (共 {} 条流)",
            in_streams.len()
        )));
    };
    let ref_is_video = reference.media_type == MediaType::Video;
    let format = FormatHint {
        name: format.map(str::to_string),
        filename: Some(template.as_str().to_string()),
    };
    // 格式名无效时尽早报错, 不产生任何输出
    registry.create_muxer_for(&format)?;

    let mut segmenter = Segmenter {
        registry,
        format,
        template,
        opener,
        options,
        in_streams,
        ref_stream,
        ref_is_video,
        number: 0,
        sink: None,
        current: None,
        last_split_pts: None,
        report: SegmentReport {
            ref_stream,
            ..Default::default()
        },
    };
    // 出错或中止时, 打开中的输出随 segmenter 一起释放, 不写尾部
    segmenter.run(source, abort)?;
    info!(
        "分段完成: {} 段, 读入 {} 个数据包",
        segmenter.report.segments.len(),
        segmenter.report.packets_read
    );
    Ok(segmenter.report)
}

/// 把来源切分成一组文件, 模板展开结果即文件路径
pub fn segment_to_files(
    source: &mut dyn PacketSource,
    registry: &FormatRegistry,
    format: Option<&str>,
    template: &str,
    options: &SegmentOptions,
    abort: &dyn AbortSignal,
) -> YunResult<SegmentReport> {
    segment(
        source,
        registry,
        format,
        template,
        |name: &str| IoContext::open_write(name),
        options,
        abort,
    )
}
