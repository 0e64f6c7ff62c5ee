//! 实时交织封装: 把两路独立产生的基本流 (视频、音频) 合并进一个输出.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use yun_core::{Rational, YunError, YunResult};
use yun_format::{CounterSnapshot, MuxOptions, Stream};

use crate::abort::AbortSignal;
use crate::filter::{FilterAction, MonotonicFilter, PacketFilter};
use crate::interleave::{Interleaver, Lane};
use crate::remap::remap;
use crate::remux::DEFAULT_MAX_COUNTERS;
use crate::sink::PendingSink;
use crate::source::PacketSource;

/// 交织封装标志
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxFlags {
    /// 丢弃 pts 非单调递增的数据包 (在输出时间基下比较)
    pub monotonic: bool,
}

/// 交织封装的一路输入
pub struct MuxInput<'a> {
    /// 数据包来源, 只使用其第一条流
    pub source: &'a mut dyn PacketSource,
    /// 比较用的编码域时间基, 缺省取来源流的时间基
    pub time_base: Option<Rational>,
}

impl<'a> MuxInput<'a> {
    /// 以来源流的时间基作为比较时间基
    pub fn new(source: &'a mut dyn PacketSource) -> Self {
        Self {
            source,
            time_base: None,
        }
    }

    fn stream(&self) -> YunResult<Stream> {
        self.source
            .streams()
            .first()
            .cloned()
            .ok_or_else(|| YunError::BadValue("交织封装的输入没有流".into()))
    }
}

/// 交织封装统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct MuxStats {
    /// 写出的视频包数
    pub video_packets: u64,
    /// 写出的音频包数
    pub audio_packets: u64,
    /// 因单调性被丢弃的包数
    pub dropped: u64,
    /// 收尾后的连续性计数器 (仅 MPEG-TS 输出)
    pub counters: Option<CounterSnapshot>,
}

/// 输出的流列表: 视频 (若有) 在前, 音频 (若有) 在后
pub fn mux_streams<'a>(
    video: Option<&MuxInput<'a>>,
    audio: Option<&MuxInput<'a>>,
) -> YunResult<Vec<Stream>> {
    let mut streams = Vec::with_capacity(2);
    for input in [video, audio].into_iter().flatten() {
        let mut stream = input.stream()?;
        stream.index = streams.len();
        streams.push(stream);
    }
    if streams.is_empty() {
        return Err(YunError::BadValue("交织封装至少需要一路输入".into()));
    }
    Ok(streams)
}

/// 把视频、音频两路交织写入输出
///
/// `sink` 须以 [`mux_streams`] 返回的流列表打开. 每次从两路当前包中取
/// pts 较小者 (相等时视频优先), 在各自的编码域时间基下比较, 然后换算到
/// 输出流时间基写出.
pub fn mux<'a>(
    sink: PendingSink,
    video: Option<MuxInput<'a>>,
    audio: Option<MuxInput<'a>>,
    flags: MuxFlags,
    options: &MuxOptions,
    abort: &dyn AbortSignal,
) -> YunResult<MuxStats> {
    let expected = mux_streams(video.as_ref(), audio.as_ref())?;
    if sink.streams().len() != expected.len() {
        return Err(YunError::BadValue(format!(
            "输出流数 {} 与输入路数 {} 不一致",
            sink.streams().len(),
            expected.len()
        )));
    }
    let video_index = video.as_ref().map(|_| 0);
    let audio_index = audio.as_ref().map(|_| usize::from(video.is_some()));

    let mut in_time_bases = Vec::with_capacity(2);
    let mut lanes = Vec::with_capacity(2);
    for (input, stream) in [video, audio].into_iter().flatten().zip(&expected) {
        let tb = input.time_base.unwrap_or(stream.time_base);
        in_time_bases.push(tb);
        lanes.push((input.source, tb));
    }
    let mut lanes = lanes.into_iter();
    let video_lane = video_index.and_then(|_| lanes.next());
    let audio_lane = audio_index.and_then(|_| lanes.next());
    let mut interleaver = Interleaver::new(video_lane, audio_lane);

    let mut sink = sink.write_header(options)?;
    let out_time_bases: Vec<Rational> = sink.streams().iter().map(|s| s.time_base).collect();
    let mut monotonic = MonotonicFilter::new();
    let mut stats = MuxStats::default();

    loop {
        abort.check().inspect_err(|_| info!("交织封装已中止"))?;

        let Some((lane, packet)) = interleaver.next_packet()? else {
            break;
        };
        let index = match lane {
            Lane::A => video_index,
            Lane::B => audio_index,
        }
        .ok_or_else(|| YunError::BadValue("交织输出了不存在的一路".into()))?;

        let mut packet = remap(packet, in_time_bases[index], out_time_bases[index], 0);
        packet.stream_index = index;
        let kind = if lane == Lane::A { "视频" } else { "音频" };
        debug!("{kind} {} dts={}", packet.pts_ts(), packet.dts);

        if flags.monotonic && monotonic.filter(&packet) == FilterAction::Drop {
            stats.dropped += 1;
            continue;
        }
        sink.write_packet(&packet)?;
        match lane {
            Lane::A => stats.video_packets += 1,
            Lane::B => stats.audio_packets += 1,
        }
    }

    let closed = sink.finish()?;
    stats.counters = closed.extract_continuity(DEFAULT_MAX_COUNTERS);
    info!(
        "交织封装完成: 视频 {}, 音频 {}, 丢弃 {}",
        stats.video_packets, stats.audio_packets, stats.dropped
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abort::NeverAbort;
    use crate::source::packet_list;
    use yun_codec::{CodecId, Packet};
    use yun_format::io::{MemoryBackend, MemoryHandle};
    use yun_format::{FormatHint, FormatRegistry, IoContext};

    fn registry() -> FormatRegistry {
        let mut r = FormatRegistry::new();
        yun_format::register_all(&mut r);
        r
    }

    fn lane(codec: CodecId, tb: Rational, pts: &[i64]) -> impl PacketSource + use<> {
        let packets = pts
            .iter()
            .map(|&t| {
                let mut p = Packet::from_data(vec![0u8; 16]);
                p.pts = t;
                p.dts = t;
                p.set_keyframe(true);
                p
            })
            .collect();
        packet_list(vec![Stream::new(0, codec, tb)], packets)
    }

    fn ts_sink(streams: &[Stream]) -> (PendingSink, MemoryHandle) {
        let backend = MemoryBackend::new();
        let handle = backend.handle();
        let io = IoContext::new(Box::new(backend));
        let sink = PendingSink::open(&registry(), io, &FormatHint::named("mpegts"), streams).unwrap();
        (sink, handle)
    }

    #[test]
    fn test_交织封装_音视频() {
        let mut v = lane(CodecId::H264, Rational::new(1, 30), &[0, 1, 2, 3]);
        let mut a = lane(CodecId::Opus, Rational::new(1, 48000), &[0, 960, 1920, 2880, 3840]);
        let video = MuxInput::new(&mut v);
        let audio = MuxInput::new(&mut a);
        let streams = mux_streams(Some(&video), Some(&audio)).unwrap();
        assert_eq!(streams[1].index, 1);
        let (sink, handle) = ts_sink(&streams);
        let stats = mux(sink, Some(video), Some(audio), MuxFlags::default(), &MuxOptions::new(), &NeverAbort).unwrap();
        assert_eq!((stats.video_packets, stats.audio_packets), (4, 5));
        assert_eq!(handle.len() % 188, 0);
        assert_eq!(stats.counters.unwrap().get(0x0101), Some(4));
    }

    #[test]
    fn test_交织封装_单调性过滤() {
        let mut a = lane(CodecId::Aac, Rational::new(1, 1000), &[0, 20, 20, 10, 40]);
        let audio = MuxInput::new(&mut a);
        let streams = mux_streams(None, Some(&audio)).unwrap();
        let (sink, _) = ts_sink(&streams);
        let flags = MuxFlags { monotonic: true };
        let stats = mux(sink, None, Some(audio), flags, &MuxOptions::new(), &NeverAbort).unwrap();
        assert_eq!(stats.audio_packets, 3);
        assert_eq!(stats.dropped, 2);
    }

    #[test]
    fn test_交织封装_首次轮询即中止() {
        let mut v = lane(CodecId::H264, Rational::new(1, 30), &[0, 1, 2]);
        let mut a = lane(CodecId::Aac, Rational::new(1, 48000), &[0, 1024]);
        let video = MuxInput::new(&mut v);
        let audio = MuxInput::new(&mut a);
        let streams = mux_streams(Some(&video), Some(&audio)).unwrap();
        let (sink, handle) = ts_sink(&streams);
        let err = mux(sink, Some(video), Some(audio), MuxFlags::default(), &MuxOptions::new(), &|| true)
            .unwrap_err();
        assert!(err.is_aborted());
        // PSI 延迟到第一个包, 没有尾部也就没有任何输出
        assert_eq!(handle.len(), 0);
    }

    #[test]
    fn test_交织封装_中途中止() {
        let mut v = lane(CodecId::H264, Rational::new(1, 30), &[0, 1, 2, 3]);
        let video = MuxInput::new(&mut v);
        let streams = mux_streams(Some(&video), None).unwrap();
        let (sink, _) = ts_sink(&streams);
        let polls = std::cell::Cell::new(0);
        let abort = || {
            polls.set(polls.get() + 1);
            polls.get() > 2
        };
        let err = mux(sink, Some(video), None, MuxFlags::default(), &MuxOptions::new(), &abort).unwrap_err();
        assert!(err.is_aborted());
        assert_eq!(polls.get(), 3);
    }

    #[test]
    fn test_交织封装_没有输入() {
        assert!(matches!(mux_streams(None, None), Err(YunError::BadValue(_))));
    }
}
