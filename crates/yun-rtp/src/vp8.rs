//! VP8 的 RTP 负载描述符 (RFC 7741 第 4.2 节) 与帧头 (RFC 6386 第 9.1 节).

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use yun_core::{YunError, YunResult};

/// 关键帧头中的起始码
pub const KEY_FRAME_START_CODE: [u8; 3] = [0x9D, 0x01, 0x2A];

/// 负载描述符
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Vp8Descriptor {
    /// N: 不作参考帧
    pub non_reference: bool,
    /// S: 分区起始
    pub start_of_partition: bool,
    pub partition_id: u8,
    /// 7 位或 15 位的图像序号
    pub picture_id: Option<u16>,
    pub tl0_pic_idx: Option<u8>,
    pub temporal_layer: Option<u8>,
    pub key_index: Option<u8>,
}

impl Vp8Descriptor {
    /// 解析描述符, 返回描述符与帧数据在负载中的起始偏移
    pub fn parse(payload: &[u8]) -> YunResult<(Self, usize)> {
        let truncated = || YunError::InvalidData("VP8: 负载描述符被截断".into());
        let byte_at = |i: usize| payload.get(i).copied().ok_or_else(truncated);

        let first = byte_at(0)?;
        let mut desc = Self {
            non_reference: first & 0x20 != 0,
            start_of_partition: first & 0x10 != 0,
            partition_id: first & 0x07,
            ..Self::default()
        };
        let mut offset = 1;
        if first & 0x80 != 0 {
            let ext = byte_at(offset)?;
            offset += 1;
            if ext & 0x80 != 0 {
                let b = byte_at(offset)?;
                if b & 0x80 != 0 {
                    let low = byte_at(offset + 1)?;
                    desc.picture_id = Some(u16::from(b & 0x7F) << 8 | u16::from(low));
                    offset += 2;
                } else {
                    desc.picture_id = Some(u16::from(b));
                    offset += 1;
                }
            }
            if ext & 0x40 != 0 {
                desc.tl0_pic_idx = Some(byte_at(offset)?);
                offset += 1;
            }
            if ext & 0x30 != 0 {
                let b = byte_at(offset)?;
                if ext & 0x20 != 0 {
                    desc.temporal_layer = Some(b >> 6);
                }
                if ext & 0x10 != 0 {
                    desc.key_index = Some(b & 0x1F);
                }
                offset += 1;
            }
        }
        Ok((desc, offset))
    }

    /// 帧的第一个包: 第 0 分区的起始
    pub fn is_start_of_frame(&self) -> bool {
        self.start_of_partition && self.partition_id == 0
    }
}

/// 未压缩数据块中的帧头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Vp8FrameHeader {
    pub key_frame: bool,
    pub version: u8,
    pub show_frame: bool,
    pub first_partition_size: u32,
    /// 关键帧的 (宽, 高), 已去掉缩放位
    pub dimensions: Option<(u16, u16)>,
}

impl Vp8FrameHeader {
    pub fn parse(frame: &[u8]) -> YunResult<Self> {
        let tag = frame
            .get(0..3)
            .ok_or_else(|| YunError::InvalidData("VP8: 帧头被截断".into()))?;
        let tag = u32::from(tag[0]) | u32::from(tag[1]) << 8 | u32::from(tag[2]) << 16;
        let key_frame = tag & 1 == 0;
        let dimensions = if key_frame {
            let key = frame
                .get(3..10)
                .ok_or_else(|| YunError::InvalidData("VP8: 关键帧头被截断".into()))?;
            if key[0..3] != KEY_FRAME_START_CODE {
                return Err(YunError::InvalidData("VP8: 关键帧起始码错误".into()));
            }
            let width = LittleEndian::read_u16(&key[3..5]) & 0x3FFF;
            let height = LittleEndian::read_u16(&key[5..7]) & 0x3FFF;
            Some((width, height))
        } else {
            None
        };
        Ok(Self {
            key_frame,
            version: (tag >> 1 & 0x07) as u8,
            show_frame: tag >> 4 & 1 == 1,
            first_partition_size: tag >> 5,
            dimensions,
        })
    }
}

/// 一个 VP8 RTP 包的负载
#[derive(Debug, Clone)]
pub struct Vp8Payload {
    pub descriptor: Vp8Descriptor,
    /// 描述符之后的帧数据
    pub data: Bytes,
}

impl Vp8Payload {
    pub fn parse(payload: &Bytes) -> YunResult<Self> {
        let (descriptor, offset) = Vp8Descriptor::parse(payload)?;
        Ok(Self {
            descriptor,
            data: payload.slice(offset..),
        })
    }

    pub fn is_start_of_frame(&self) -> bool {
        self.descriptor.is_start_of_frame()
    }

    /// 关键帧的第一个包
    pub fn is_key_frame(&self) -> bool {
        self.is_start_of_frame() && self.data.first().is_some_and(|b| b & 1 == 0)
    }

    /// 关键帧第一个包中的画面尺寸
    pub fn dimensions(&self) -> Option<(u16, u16)> {
        if !self.is_key_frame() {
            return None;
        }
        Vp8FrameHeader::parse(&self.data).ok()?.dimensions
    }
}
