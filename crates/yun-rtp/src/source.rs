//! RTP 归档作为数据包来源.
//!
//! 打开时为缺少的流参数单独读一遍归档: 视频取第一个关键帧的尺寸并按帧起始包
//! 的时间戳估计帧率, 音频取第一个包的声道数. 之后的读取按顺序去负载.

use std::str::FromStr;

use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use yun_codec::Packet;
use yun_core::{MediaType, Rational, YunError, YunResult};
use yun_format::Stream;
use yun_format::stream::{AudioStreamParams, StreamParams, VideoStreamParams};
use yun_remux::PacketSource;

use crate::depacketize::{TimestampUnwrapper, Vp8Assembler, opus_packet};
use crate::description::key_values;
use crate::infer::{self, DEFAULT_FRAME_RATE_WINDOW};
use crate::payload::PayloadKind;
use crate::reader::{ArchivePart, RtpFilter, RtpPackets};

/// yuv420p
pub const DEFAULT_PIXEL_FORMAT: i32 = 0;
pub const DEFAULT_VIDEO_BIT_RATE: u64 = 1_000_000;
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
pub const DEFAULT_AUDIO_BIT_RATE: u64 = 96_000;

/// 流参数覆盖, 未设置的取缺省值或从归档推断
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamProfile {
    pub encoder_name: Option<String>,
    pub pixel_format: Option<i32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub sample_rate: Option<u32>,
    pub channel_layout: Option<u64>,
    pub bit_rate: Option<u64>,
}

impl FromStr for StreamProfile {
    type Err = YunError;

    /// `width=640,height=480,frame_rate=25`
    fn from_str(s: &str) -> YunResult<Self> {
        fn num<T: FromStr>(key: &str, value: &str) -> YunResult<Option<T>> {
            value
                .parse()
                .map(Some)
                .map_err(|_| YunError::BadValue(format!("流参数 {key} 的取值 \"{value}\" 无效")))
        }

        let mut profile = Self::default();
        for (key, value) in key_values(s)? {
            match key {
                "encoder" | "encoder_name" => profile.encoder_name = Some(value.to_string()),
                "pix_fmt" | "pixel_format" => profile.pixel_format = num(key, value)?,
                "width" => profile.width = num(key, value)?,
                "height" => profile.height = num(key, value)?,
                "frame_rate" => profile.frame_rate = num(key, value)?,
                "sample_rate" => profile.sample_rate = num(key, value)?,
                "channel_layout" => profile.channel_layout = num(key, value)?,
                "bit_rate" => profile.bit_rate = num(key, value)?,
                _ => return Err(YunError::BadValue(format!("未知的流参数 \"{key}\""))),
            }
        }
        Ok(profile)
    }
}

/// 一路流的归档
#[derive(Debug, Clone)]
pub struct ArchiveSet {
    pub kind: PayloadKind,
    /// 按顺序拼接的分片
    pub parts: Vec<ArchivePart>,
    pub filter: RtpFilter,
    /// 跳过开头的分片数
    pub skip_parts: usize,
}

impl ArchiveSet {
    pub fn new(kind: PayloadKind, parts: Vec<ArchivePart>) -> Self {
        Self {
            kind,
            parts,
            filter: RtpFilter::default(),
            skip_parts: 0,
        }
    }

    fn readable_parts(&self) -> YunResult<Vec<ArchivePart>> {
        match self.parts.get(self.skip_parts..) {
            Some(parts) if !parts.is_empty() => Ok(parts.to_vec()),
            _ => Err(YunError::BadValue(format!(
                "{} 路流跳过 {} 个分片后没有可读的归档 (共 {} 个)",
                self.kind,
                self.skip_parts,
                self.parts.len()
            ))),
        }
    }
}

/// 打开选项
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtpSourceOptions {
    pub profile: StreamProfile,
    /// 估计帧率用的帧起始包数
    pub frame_rate_window: usize,
    /// 加到每个 pts 上的偏移 (RTP 时钟单位)
    pub pts_offset: i64,
}

impl Default for RtpSourceOptions {
    fn default() -> Self {
        Self {
            profile: StreamProfile::default(),
            frame_rate_window: DEFAULT_FRAME_RATE_WINDOW,
            pts_offset: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceState {
    Open,
    Finished,
    Failed,
}

/// RTP 归档来源, 只有一条流, 时间基为 1/RTP 时钟频率
pub struct RtpSource {
    kind: PayloadKind,
    streams: Vec<Stream>,
    packets: RtpPackets,
    unwrapper: TimestampUnwrapper,
    vp8: Option<Vp8Assembler>,
    pts_offset: i64,
    state: SourceState,
    frames: u64,
}

impl RtpSource {
    pub fn open(set: &ArchiveSet, options: &RtpSourceOptions) -> YunResult<Self> {
        let parts = set.readable_parts()?;
        let stream = describe_stream(set.kind, &parts, set.filter, options)?;
        debug!("打开 {} 路 RTP 来源: {} 个分片, {:?}", set.kind, parts.len(), stream.params);
        let time_base = set.kind.time_base();
        Ok(Self {
            kind: set.kind,
            streams: vec![stream],
            packets: RtpPackets::new(parts, set.filter),
            unwrapper: TimestampUnwrapper::default(),
            vp8: (set.kind == PayloadKind::Vp8).then(|| Vp8Assembler::new(time_base)),
            pts_offset: options.pts_offset,
            state: SourceState::Open,
            frames: 0,
        })
    }

    pub fn kind(&self) -> PayloadKind {
        self.kind
    }

    /// 已产出的数据包数
    pub fn frames(&self) -> u64 {
        self.frames
    }

    fn read_frame(&mut self) -> YunResult<Option<Packet>> {
        loop {
            let Some(rtp) = self.packets.next_packet()? else {
                return Ok(self.vp8.as_mut().and_then(Vp8Assembler::finish));
            };
            let pts = self.unwrapper.unwrap(rtp.timestamp) + self.pts_offset;
            let frame = match self.vp8.as_mut() {
                Some(assembler) => assembler.push(&rtp, pts),
                None => Some(opus_packet(&rtp, pts, self.kind.time_base())),
            };
            if frame.is_some() {
                return Ok(frame);
            }
        }
    }
}

impl PacketSource for RtpSource {
    fn streams(&self) -> &[Stream] {
        &self.streams
    }

    fn next_packet(&mut self) -> YunResult<Option<Packet>> {
        match self.state {
            SourceState::Open => {}
            SourceState::Finished => return Ok(None),
            SourceState::Failed => return Err(YunError::BadValue("来源已关闭".into())),
        }
        match self.read_frame() {
            Ok(Some(packet)) => {
                self.frames += 1;
                Ok(Some(packet))
            }
            Ok(None) => {
                let dropped = self.vp8.as_ref().map_or(0, Vp8Assembler::dropped);
                info!(
                    "{} 路 RTP 来源结束: {} 个 RTP 包, {} 个数据包, 丢弃 {dropped}, 无法解析 {}",
                    self.kind,
                    self.packets.packets_read(),
                    self.frames,
                    self.packets.malformed()
                );
                self.state = SourceState::Finished;
                Ok(None)
            }
            Err(e) => {
                error!("读取 RTP 归档失败: {e}");
                self.state = SourceState::Failed;
                Err(e)
            }
        }
    }
}

fn frame_rate_rational(rate: f64) -> YunResult<Rational> {
    if !rate.is_finite() || rate <= 0.0 || rate > 1000.0 {
        return Err(YunError::BadValue(format!("帧率 {rate} 无效")));
    }
    Ok(Rational::new((rate * 1000.0).round() as i32, 1000).reduce())
}

/// 组装流描述, 缺少的参数从单独打开的一份包序列中推断
fn describe_stream(
    kind: PayloadKind,
    parts: &[ArchivePart],
    filter: RtpFilter,
    options: &RtpSourceOptions,
) -> YunResult<Stream> {
    let profile = &options.profile;
    let fresh = || RtpPackets::new(parts.to_vec(), filter);

    let mut stream = Stream::new(0, kind.codec_id(), kind.time_base());
    stream.encoder_name = profile
        .encoder_name
        .clone()
        .unwrap_or_else(|| kind.encoder_name().to_string());
    stream.params = match kind.media_type() {
        MediaType::Video => {
            let (width, height) = match (profile.width, profile.height) {
                (Some(w), Some(h)) => (w, h),
                (w, h) => {
                    let (iw, ih) = infer::video_dimensions(&mut fresh())?
                        .ok_or_else(|| YunError::BadValue("归档中没有带尺寸的 VP8 关键帧".into()))?;
                    (w.unwrap_or(u32::from(iw)), h.unwrap_or(u32::from(ih)))
                }
            };
            let rate = match profile.frame_rate {
                Some(rate) => rate,
                None => infer::video_frame_rate(&mut fresh(), kind.clock_rate(), options.frame_rate_window)?
                    .ok_or_else(|| {
                        YunError::BadValue(format!(
                            "归档中不足 {} 个 VP8 帧, 无法估计帧率",
                            options.frame_rate_window
                        ))
                    })?,
            };
            StreamParams::Video(VideoStreamParams {
                width,
                height,
                pixel_format: profile.pixel_format.unwrap_or(DEFAULT_PIXEL_FORMAT),
                frame_rate: frame_rate_rational(rate)?,
                bit_rate: profile.bit_rate.unwrap_or(DEFAULT_VIDEO_BIT_RATE),
            })
        }
        _ => {
            let channel_layout = match profile.channel_layout {
                Some(layout) => layout,
                None => infer::audio_channel_layout(&mut fresh())?
                    .ok_or_else(|| YunError::BadValue("归档中没有可用的 Opus 包".into()))?,
            };
            StreamParams::Audio(AudioStreamParams {
                sample_rate: profile.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE),
                channel_layout,
                bit_rate: profile.bit_rate.unwrap_or(DEFAULT_AUDIO_BIT_RATE),
            })
        }
    };
    Ok(stream)
}
