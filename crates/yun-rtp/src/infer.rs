//! 从 RTP 包推断流参数: 画面尺寸、帧率、声道布局.
//!
//! 每个函数都会消耗传入的包序列, 调用方应为推断单独打开一份.

use yun_core::YunResult;

use crate::depacketize::TimestampUnwrapper;
use crate::opus;
use crate::reader::RtpPackets;
use crate::vp8::Vp8Payload;

/// 估计帧率时缺省取的帧起始包数
pub const DEFAULT_FRAME_RATE_WINDOW: usize = 10;

/// 第一个带尺寸的 VP8 关键帧的 (宽, 高)
pub fn video_dimensions(packets: &mut RtpPackets) -> YunResult<Option<(u16, u16)>> {
    while let Some(rtp) = packets.next_packet()? {
        if let Some(dimensions) = Vp8Payload::parse(&rtp.payload).ok().and_then(|vp8| vp8.dimensions()) {
            return Ok(Some(dimensions));
        }
    }
    Ok(None)
}

/// 用前 `window` 个 VP8 帧起始包的时间戳估计帧率
///
/// 包数不足 `window` 或时间戳不增长时返回 `None`.
pub fn video_frame_rate(packets: &mut RtpPackets, clock_rate: i32, window: usize) -> YunResult<Option<f64>> {
    let mut unwrapper = TimestampUnwrapper::default();
    let mut first = None;
    let mut last = 0;
    let mut seen = 0;
    while seen < window {
        let Some(rtp) = packets.next_packet()? else {
            return Ok(None);
        };
        let Ok(vp8) = Vp8Payload::parse(&rtp.payload) else {
            continue;
        };
        if !vp8.is_start_of_frame() {
            continue;
        }
        let ts = unwrapper.unwrap(rtp.timestamp);
        first.get_or_insert(ts);
        last = ts;
        seen += 1;
    }
    let span = last - first.unwrap_or(last);
    if seen < 2 || span <= 0 {
        return Ok(None);
    }
    Ok(Some((seen - 1) as f64 * f64::from(clock_rate) / span as f64))
}

/// 第一个非空 Opus 包的声道布局
pub fn audio_channel_layout(packets: &mut RtpPackets) -> YunResult<Option<u64>> {
    while let Some(rtp) = packets.next_packet()? {
        if let Some(&toc) = rtp.payload.first() {
            return Ok(opus::channel_layout(opus::channels(toc)));
        }
    }
    Ok(None)
}
