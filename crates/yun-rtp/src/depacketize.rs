//! 去负载: RTP 包 → 数据包.
//!
//! 时间戳以 RTP 时钟为单位, 32 位回绕展开为单调的 64 位值.
//! VP8 帧可能跨多个 RTP 包, 以帧起始包为界重组; Opus 包与数据包一一对应.

use bytes::BytesMut;
use log::{debug, warn};
use yun_codec::Packet;
use yun_core::Rational;

use crate::opus;
use crate::packet::RtpPacket;
use crate::vp8::Vp8Payload;

/// 把 32 位 RTP 时间戳展开为 64 位
#[derive(Debug, Clone, Copy, Default)]
pub struct TimestampUnwrapper {
    last: Option<(u32, i64)>,
}

impl TimestampUnwrapper {
    /// 与上一个时间戳的差按有符号 32 位解释, 前后跳动不超过 2^31 时结果连续
    pub fn unwrap(&mut self, timestamp: u32) -> i64 {
        let extended = match self.last {
            Some((raw, ext)) => ext + i64::from(timestamp.wrapping_sub(raw) as i32),
            None => i64::from(timestamp),
        };
        self.last = Some((timestamp, extended));
        extended
    }
}

struct PendingFrame {
    pts: i64,
    key: bool,
    data: BytesMut,
    fragments: u32,
}

/// VP8 帧重组
///
/// 先跳过帧中间的包, 再跳过第一个关键帧之前的帧, 之后每个帧起始包结束上一帧.
pub struct Vp8Assembler {
    time_base: Rational,
    pending: Option<PendingFrame>,
    synced: bool,
    dropped: u64,
}

impl Vp8Assembler {
    pub fn new(time_base: Rational) -> Self {
        Self {
            time_base,
            pending: None,
            synced: false,
            dropped: 0,
        }
    }

    /// 送入一个 RTP 包, `pts` 是展开后的时间戳; 返回因此完成的上一帧
    pub fn push(&mut self, rtp: &RtpPacket, pts: i64) -> Option<Packet> {
        let vp8 = match Vp8Payload::parse(&rtp.payload) {
            Ok(vp8) => vp8,
            Err(e) => {
                warn!("丢弃 VP8 包 seq={}: {e}", rtp.sequence_number);
                self.dropped += 1;
                return None;
            }
        };
        if !vp8.is_start_of_frame() {
            match self.pending.as_mut() {
                Some(frame) => {
                    frame.data.extend_from_slice(&vp8.data);
                    frame.fragments += 1;
                }
                None => self.dropped += 1,
            }
            return None;
        }
        if !self.synced {
            if !vp8.is_key_frame() {
                self.dropped += 1;
                return None;
            }
            debug!("VP8 从 pts={pts} 的关键帧开始, 之前丢弃 {} 个包", self.dropped);
            self.synced = true;
        }
        let done = self.finish();
        self.pending = Some(PendingFrame {
            pts,
            key: vp8.is_key_frame(),
            data: BytesMut::from(&vp8.data[..]),
            fragments: 1,
        });
        done
    }

    /// 交出正在重组的帧
    pub fn finish(&mut self) -> Option<Packet> {
        let frame = self.pending.take()?;
        let mut packet = Packet::from_data(frame.data.freeze());
        packet.pts = frame.pts;
        packet.dts = frame.pts;
        packet.time_base = self.time_base;
        packet.set_keyframe(frame.key);
        if frame.fragments > 1 {
            debug!("VP8 帧 pts={} 由 {} 个包组成", frame.pts, frame.fragments);
        }
        Some(packet)
    }

    /// 被丢弃的包数
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

/// Opus 包: 总是关键帧, 时长由 TOC 推出 (无法推出时为 0)
pub fn opus_packet(rtp: &RtpPacket, pts: i64, time_base: Rational) -> Packet {
    let mut packet = Packet::from_data(rtp.payload.clone());
    packet.pts = pts;
    packet.dts = pts;
    packet.time_base = time_base;
    packet.duration = opus::packet_samples(&rtp.payload).map_or(0, i64::from);
    packet.set_keyframe(true);
    packet
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 关键帧起始包: 描述符 + 帧头 + 填充数据
    pub(crate) fn key_start(width: u16, height: u16) -> Vec<u8> {
        let mut p = vec![0x10, 0x10, 0x02, 0x00, 0x9D, 0x01, 0x2A];
        p.extend_from_slice(&width.to_le_bytes());
        p.extend_from_slice(&height.to_le_bytes());
        p.extend_from_slice(&[0xAB; 8]);
        p
    }

    pub(crate) fn inter_start() -> Vec<u8> {
        vec![0x10, 0x11, 0x00, 0x00, 0xCD, 0xCD]
    }

    pub(crate) fn continuation() -> Vec<u8> {
        vec![0x00, 0xEF, 0xEF]
    }

    fn rtp(seq: u16, ts: u32, payload: Vec<u8>) -> RtpPacket {
        RtpPacket::new(96, seq, ts, 1, payload)
    }

    #[test]
    fn test_时间戳展开() {
        let mut u = TimestampUnwrapper::default();
        assert_eq!(u.unwrap(u32::MAX - 10), i64::from(u32::MAX) - 10);
        assert_eq!(u.unwrap(5), i64::from(u32::MAX) + 6);
        // 乱序包向回跳
        assert_eq!(u.unwrap(u32::MAX), i64::from(u32::MAX));
        assert_eq!(u.unwrap(100), i64::from(u32::MAX) + 101);
    }

    #[test]
    fn test_vp8_重组() {
        let tb = Rational::new(1, 90000);
        let mut asm = Vp8Assembler::new(tb);
        // 帧中间的包与关键帧前的普通帧都被跳过
        assert!(asm.push(&rtp(1, 0, continuation()), 0).is_none());
        assert!(asm.push(&rtp(2, 0, inter_start()), 0).is_none());
        assert!(asm.push(&rtp(3, 3000, key_start(640, 480)), 3000).is_none());
        assert!(asm.push(&rtp(4, 3000, continuation()), 3000).is_none());

        let key = asm.push(&rtp(5, 6000, inter_start()), 6000).unwrap();
        assert!(key.is_keyframe());
        assert_eq!(key.pts, 3000);
        assert_eq!(key.time_base, tb);
        assert_eq!(key.data.len(), 18 + 2);

        let inter = asm.finish().unwrap();
        assert!(!inter.is_keyframe());
        assert_eq!((inter.pts, inter.dts), (6000, 6000));
        assert_eq!(&inter.data[..], &[0x11, 0x00, 0x00, 0xCD, 0xCD]);
        assert!(asm.finish().is_none());
        assert_eq!(asm.dropped(), 2);
    }

    #[test]
    fn test_opus_包() {
        let tb = Rational::new(1, 48000);
        let p = opus_packet(&rtp(1, 960, vec![0xFC, 0x01]), 960, tb);
        assert!(p.is_keyframe());
        assert_eq!(p.duration, 960);
        assert_eq!(opus_packet(&rtp(2, 0, vec![]), 0, tb).duration, 0);
    }
}
