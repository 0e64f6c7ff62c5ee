//! Opus 包的 TOC 字节 (RFC 6716 第 3.1 节).
//!
//! RTP 负载就是一个完整的 Opus 包, 不需要重组.

use yun_core::{YunError, YunResult};

/// 单声道布局
pub const CHANNEL_LAYOUT_MONO: u64 = 0x4;
/// 立体声布局
pub const CHANNEL_LAYOUT_STEREO: u64 = 0x3;

/// TOC 中的声道数
pub fn channels(toc: u8) -> u8 {
    if toc & 0x04 != 0 { 2 } else { 1 }
}

/// 声道数对应的布局
pub fn channel_layout(channels: u8) -> Option<u64> {
    match channels {
        1 => Some(CHANNEL_LAYOUT_MONO),
        2 => Some(CHANNEL_LAYOUT_STEREO),
        _ => None,
    }
}

/// 每帧的采样数 (48 kHz)
pub fn samples_per_frame(toc: u8) -> u32 {
    let config = toc >> 3;
    match config {
        // SILK: 10/20/40/60 ms
        0..=11 => [480, 960, 1920, 2880][usize::from(config & 3)],
        // Hybrid: 10/20 ms
        12..=15 => [480, 960][usize::from(config & 1)],
        // CELT: 2.5/5/10/20 ms
        _ => [120, 240, 480, 960][usize::from(config & 3)],
    }
}

/// 包中的帧数
pub fn frame_count(packet: &[u8]) -> YunResult<u32> {
    let toc = *packet
        .first()
        .ok_or_else(|| YunError::InvalidData("Opus: 空包".into()))?;
    match toc & 0x03 {
        0 => Ok(1),
        1 | 2 => Ok(2),
        _ => {
            let count = packet
                .get(1)
                .map(|b| u32::from(b & 0x3F))
                .ok_or_else(|| YunError::InvalidData("Opus: 缺少帧数字节".into()))?;
            if count == 0 {
                return Err(YunError::InvalidData("Opus: 帧数为 0".into()));
            }
            Ok(count)
        }
    }
}

/// 包的时长 (48 kHz 采样数)
pub fn packet_samples(packet: &[u8]) -> YunResult<u32> {
    let frames = frame_count(packet)?;
    Ok(samples_per_frame(packet[0]) * frames)
}
