//! MPEG-TS 公共定义.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ 同步字节 (0x47)                    1 byte│
//! │ TEI(1) + PUSI(1) + Priority(1) +         │
//! │   PID(13)                         2 bytes│
//! │ TSC(2) + AFC(2) + CC(4)           1 byte │
//! │ [Adaptation Field]                可变   │
//! │ [Payload]                         可变   │
//! └──────────────────────────────────────────┘
//! ```

use yun_codec::CodecId;
use yun_core::NOPTS_VALUE;

/// TS 包大小
pub const TS_PACKET_SIZE: usize = 188;
/// TS 包头大小
pub const TS_HEADER_SIZE: usize = 4;
/// TS 同步字节
pub const TS_SYNC_BYTE: u8 = 0x47;
/// PAT PID
pub const PID_PAT: u16 = 0x0000;
/// SDT PID
pub const PID_SDT: u16 = 0x0011;
/// 空包 PID
pub const PID_NULL: u16 = 0x1FFF;
/// 默认 PMT PID
pub const DEFAULT_PMT_PID: u16 = 0x1000;
/// 默认第一个 ES PID
pub const DEFAULT_START_PID: u16 = 0x0100;

/// PAT table_id
pub const TABLE_PAT: u8 = 0x00;
/// PMT table_id
pub const TABLE_PMT: u8 = 0x02;
/// SDT (actual) table_id
pub const TABLE_SDT: u8 = 0x42;

/// 33 位时间戳掩码
const TS_33BIT_MASK: u64 = (1 << 33) - 1;

/// 解析后的 TS 包头
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TsHeader {
    /// PID
    pub pid: u16,
    /// Payload Unit Start Indicator
    pub pusi: bool,
    /// Adaptation Field Control
    pub afc: u8,
    /// 连续性计数器
    pub cc: u8,
}

impl TsHeader {
    /// 从 TS 包前 4 字节解析
    pub fn parse(pkt: &[u8; TS_PACKET_SIZE]) -> Self {
        Self {
            pid: (u16::from(pkt[1] & 0x1F) << 8) | u16::from(pkt[2]),
            pusi: (pkt[1] & 0x40) != 0,
            afc: (pkt[3] >> 4) & 0x03,
            cc: pkt[3] & 0x0F,
        }
    }

    /// 是否携带负载
    pub fn has_payload(&self) -> bool {
        self.afc & 0x01 != 0
    }

    /// 是否带 adaptation field
    pub fn has_adaptation(&self) -> bool {
        self.afc & 0x02 != 0
    }
}

/// 编解码器 -> stream_type
pub fn codec_to_stream_type(codec_id: CodecId) -> Option<u8> {
    match codec_id {
        CodecId::Mpeg2Video => Some(0x02),
        CodecId::Mpeg4 => Some(0x10),
        CodecId::H264 => Some(0x1B),
        CodecId::H265 => Some(0x24),
        CodecId::Mp3 => Some(0x03),
        CodecId::Mp2 => Some(0x04),
        CodecId::Aac => Some(0x0F),
        CodecId::Ac3 => Some(0x81),
        // 私有数据 + "Opus" 注册描述符
        CodecId::Opus => Some(0x06),
        _ => None,
    }
}

/// stream_type (+ 注册描述符) -> 编解码器
pub fn stream_type_to_codec(stream_type: u8, registration: Option<[u8; 4]>) -> CodecId {
    match stream_type {
        0x01 | 0x02 => CodecId::Mpeg2Video,
        0x10 => CodecId::Mpeg4,
        0x1B => CodecId::H264,
        0x24 => CodecId::H265,
        0x03 => CodecId::Mp3,
        0x04 => CodecId::Mp2,
        0x0F | 0x11 => CodecId::Aac,
        0x81 => CodecId::Ac3,
        0x06 if registration == Some(*b"Opus") => CodecId::Opus,
        _ => CodecId::None,
    }
}

/// 编码 PES 头中的 33 位时间戳 (5 字节)
///
/// `prefix` 为高 4 位标记: 仅 PTS 时 0x20, PTS+DTS 时 PTS 用 0x30、DTS 用 0x10.
pub fn encode_timestamp(prefix: u8, ts: i64) -> [u8; 5] {
    let ts = (ts as u64) & TS_33BIT_MASK;
    [
        prefix | ((((ts >> 30) as u8) & 0x07) << 1) | 0x01,
        (ts >> 22) as u8,
        ((((ts >> 15) as u8) & 0x7F) << 1) | 0x01,
        (ts >> 7) as u8,
        (((ts as u8) & 0x7F) << 1) | 0x01,
    ]
}

/// 解码 PES 头中的 33 位时间戳
pub fn decode_timestamp(data: &[u8]) -> i64 {
    if data.len() < 5 {
        return NOPTS_VALUE;
    }
    let b0 = i64::from(data[0]);
    let b1 = i64::from(data[1]);
    let b2 = i64::from(data[2]);
    let b3 = i64::from(data[3]);
    let b4 = i64::from(data[4]);
    ((b0 >> 1) & 0x07) << 30 | b1 << 22 | (b2 >> 1) << 15 | b3 << 7 | b4 >> 1
}

/// 编码 PCR (6 字节, 扩展部分为 0)
pub fn encode_pcr(base: i64) -> [u8; 6] {
    let base = (base as u64) & TS_33BIT_MASK;
    [
        (base >> 25) as u8,
        (base >> 17) as u8,
        (base >> 9) as u8,
        (base >> 1) as u8,
        (((base & 0x01) as u8) << 7) | 0x7E,
        0x00,
    ]
}
