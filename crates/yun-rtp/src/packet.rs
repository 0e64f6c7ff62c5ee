//! RTP 包 (RFC 3550 第 5.1 节).

use byteorder::{BigEndian, ByteOrder};
use bytes::{BufMut, Bytes, BytesMut};
use yun_core::{YunError, YunResult};

/// 固定头部长度
pub const RTP_HEADER_SIZE: usize = 12;

/// 支持的 RTP 版本
pub const RTP_VERSION: u8 = 2;

/// RTP 包
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket {
    pub marker: bool,
    pub payload_type: u8,
    pub sequence_number: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
    /// 头部扩展: (profile, 数据)
    pub extension: Option<(u16, Bytes)>,
    /// 负载, 已去掉填充
    pub payload: Bytes,
}

impl RtpPacket {
    /// 创建不带 CSRC 与扩展的包
    pub fn new(payload_type: u8, sequence_number: u16, timestamp: u32, ssrc: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            marker: false,
            payload_type,
            sequence_number,
            timestamp,
            ssrc,
            csrc: Vec::new(),
            extension: None,
            payload: payload.into(),
        }
    }

    /// 解析一个完整的 RTP 包
    pub fn parse(data: &[u8]) -> YunResult<Self> {
        let bad = |what: &str| YunError::InvalidData(format!("RTP: {what}"));
        if data.len() < RTP_HEADER_SIZE {
            return Err(bad("包长度不足 12 字节"));
        }
        let version = data[0] >> 6;
        if version != RTP_VERSION {
            return Err(YunError::InvalidData(format!("RTP: 不支持的版本 {version}")));
        }
        let padding = data[0] & 0x20 != 0;
        let has_extension = data[0] & 0x10 != 0;
        let csrc_count = usize::from(data[0] & 0x0F);

        let mut offset = RTP_HEADER_SIZE;
        let csrc = data
            .get(offset..offset + csrc_count * 4)
            .ok_or_else(|| bad("CSRC 列表被截断"))?
            .chunks_exact(4)
            .map(BigEndian::read_u32)
            .collect();
        offset += csrc_count * 4;

        let extension = if has_extension {
            let head = data.get(offset..offset + 4).ok_or_else(|| bad("扩展头被截断"))?;
            let profile = BigEndian::read_u16(&head[0..2]);
            let len = usize::from(BigEndian::read_u16(&head[2..4])) * 4;
            offset += 4;
            let body = data.get(offset..offset + len).ok_or_else(|| bad("扩展数据被截断"))?;
            offset += len;
            Some((profile, Bytes::copy_from_slice(body)))
        } else {
            None
        };

        let mut end = data.len();
        if padding {
            let pad = usize::from(data[end - 1]);
            if pad == 0 || offset + pad > end {
                return Err(bad("填充长度无效"));
            }
            end -= pad;
        }

        Ok(Self {
            marker: data[1] & 0x80 != 0,
            payload_type: data[1] & 0x7F,
            sequence_number: BigEndian::read_u16(&data[2..4]),
            timestamp: BigEndian::read_u32(&data[4..8]),
            ssrc: BigEndian::read_u32(&data[8..12]),
            csrc,
            extension,
            payload: Bytes::copy_from_slice(&data[offset..end]),
        })
    }

    /// 序列化, 不加填充; CSRC 最多写 15 个
    pub fn to_bytes(&self) -> Bytes {
        let csrc = &self.csrc[..self.csrc.len().min(15)];
        let ext_len = self
            .extension
            .as_ref()
            .map_or(0, |(_, data)| 4 + data.len().div_ceil(4) * 4);
        let mut buf = BytesMut::with_capacity(RTP_HEADER_SIZE + csrc.len() * 4 + ext_len + self.payload.len());

        let mut first = RTP_VERSION << 6 | csrc.len() as u8;
        if self.extension.is_some() {
            first |= 0x10;
        }
        let mut second = self.payload_type & 0x7F;
        if self.marker {
            second |= 0x80;
        }
        buf.put_u8(first);
        buf.put_u8(second);
        buf.put_u16(self.sequence_number);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
        for &id in csrc {
            buf.put_u32(id);
        }
        if let Some((profile, data)) = &self.extension {
            let words = data.len().div_ceil(4);
            buf.put_u16(*profile);
            buf.put_u16(words as u16);
            buf.put_slice(data);
            buf.put_bytes(0, words * 4 - data.len());
        }
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

/// 负载类型是否可能承载媒体
///
/// 64..=95 与 RTCP 包类型 (200..=207 去掉最高位) 冲突, 不视为媒体.
pub fn is_media_payload_type(payload_type: u8) -> bool {
    payload_type < 64 || payload_type >= 96
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_解析完整头部() {
        let data = [
            0xB1, 0xE4, 0x12, 0x34, // V=2 P X CC=1, M PT=100, seq
            0x00, 0x01, 0x00, 0x00, // ts
            0xDE, 0xAD, 0xBE, 0xEF, // ssrc
            0x00, 0x00, 0x00, 0x07, // csrc
            0xBE, 0xDE, 0x00, 0x01, // 扩展 profile, 1 个字
            0x10, 0x20, 0x30, 0x40, // 扩展数据
            0xAA, 0xBB, // 负载
            0x00, 0x00, 0x03, // 填充
        ];
        let p = RtpPacket::parse(&data).unwrap();
        assert!(p.marker);
        assert_eq!(p.payload_type, 100);
        assert_eq!(p.sequence_number, 0x1234);
        assert_eq!(p.timestamp, 0x0001_0000);
        assert_eq!(p.ssrc, 0xDEAD_BEEF);
        assert_eq!(p.csrc, vec![7]);
        assert_eq!(p.extension, Some((0xBEDE, Bytes::from_static(&[0x10, 0x20, 0x30, 0x40]))));
        assert_eq!(&p.payload[..], &[0xAA, 0xBB]);
    }

    #[test]
    fn test_序列化后可再解析() {
        let mut p = RtpPacket::new(111, 7, 960, 42, vec![1u8, 2, 3]);
        p.marker = true;
        p.extension = Some((0x1000, Bytes::from_static(&[9, 9])));
        let bytes = p.to_bytes();
        assert_eq!(bytes.len(), 12 + 8 + 3);
        let back = RtpPacket::parse(&bytes).unwrap();
        assert_eq!(back.extension, Some((0x1000, Bytes::from_static(&[9, 9, 0, 0]))));
        assert_eq!(back.payload, p.payload);
        assert!(back.marker);
    }

    #[test]
    fn test_无效包() {
        assert!(RtpPacket::parse(&[0x80; 11]).is_err());
        let mut v1 = RtpPacket::new(96, 0, 0, 0, vec![0u8]).to_bytes().to_vec();
        v1[0] = 0x40;
        assert!(matches!(RtpPacket::parse(&v1), Err(YunError::InvalidData(_))));
        // CC=2 但没有 CSRC
        let mut short = [0u8; 12];
        short[0] = 0x82;
        assert!(RtpPacket::parse(&short).is_err());
        // 填充长度超过负载
        let mut pad = RtpPacket::new(96, 0, 0, 0, vec![0u8, 5]).to_bytes().to_vec();
        pad[0] |= 0x20;
        assert!(RtpPacket::parse(&pad).is_err());
    }

    #[test]
    fn test_媒体负载类型() {
        assert!(is_media_payload_type(0));
        assert!(is_media_payload_type(111));
        assert!(!is_media_payload_type(72));
        assert!(!is_media_payload_type(200 & 0x7F));
    }
}
