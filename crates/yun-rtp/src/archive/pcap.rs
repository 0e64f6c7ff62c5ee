//! pcap 抓包文件中的 RTP 包.
//!
//! 只取以太网 (可带一层 802.1Q 标签) 或裸 IP 链路上未分片的 IPv4/UDP 报文,
//! UDP 负载像 RTP (版本 2, 负载类型不与 RTCP 冲突) 时才交出.

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use bytes::Bytes;
use log::{debug, warn};
use yun_core::{YunError, YunResult};
use yun_format::IoContext;

use super::{ArchiveFormat, ArchiveReader};
use crate::packet::{RTP_HEADER_SIZE, RTP_VERSION, is_media_payload_type};

/// 微秒时间戳的魔数
pub const MAGIC_MICROS: u32 = 0xA1B2_C3D4;
/// 纳秒时间戳的魔数
pub const MAGIC_NANOS: u32 = 0xA1B2_3C4D;

const GLOBAL_HEADER_SIZE: usize = 24;
const RECORD_HEADER_SIZE: usize = 16;

pub const LINKTYPE_ETHERNET: u32 = 1;
pub const LINKTYPE_RAW: u32 = 101;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_VLAN: u16 = 0x8100;
const IPPROTO_UDP: u8 = 17;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

impl Endian {
    fn read_u32(self, buf: &[u8]) -> u32 {
        match self {
            Self::Little => LittleEndian::read_u32(buf),
            Self::Big => BigEndian::read_u32(buf),
        }
    }
}

/// 由文件头的魔数判断字节序
fn magic_endian(head: &[u8]) -> Option<Endian> {
    let head = head.get(0..4)?;
    let is_magic = |m: u32| m == MAGIC_MICROS || m == MAGIC_NANOS;
    if is_magic(LittleEndian::read_u32(head)) {
        Some(Endian::Little)
    } else if is_magic(BigEndian::read_u32(head)) {
        Some(Endian::Big)
    } else {
        None
    }
}

/// 文件头是否为 pcap 魔数
pub(crate) fn is_pcap_magic(head: &[u8]) -> bool {
    magic_endian(head).is_some()
}

/// pcap 读取器
pub struct PcapReader {
    io: IoContext,
    endian: Endian,
    link_type: u32,
    frames: u64,
    skipped: u64,
}

impl PcapReader {
    pub fn open(mut io: IoContext) -> YunResult<Self> {
        let mut header = [0u8; GLOBAL_HEADER_SIZE];
        io.read_exact(&mut header).map_err(|e| match e {
            YunError::Eof => YunError::InvalidData("pcap: 文件头不完整".into()),
            e => e,
        })?;
        let endian = magic_endian(&header).ok_or_else(|| {
            YunError::InvalidData(format!(
                "pcap: 魔数错误 {:#010x}",
                BigEndian::read_u32(&header[0..4])
            ))
        })?;
        let link_type = endian.read_u32(&header[20..24]);
        if link_type != LINKTYPE_ETHERNET && link_type != LINKTYPE_RAW {
            return Err(YunError::Unsupported(format!("pcap: 不支持的链路类型 {link_type}")));
        }
        debug!("打开 pcap 归档: {endian:?}, 链路类型 {link_type}");
        Ok(Self {
            io,
            endian,
            link_type,
            frames: 0,
            skipped: 0,
        })
    }

    /// 被跳过的非 RTP 报文数
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn read_frame(&mut self) -> YunResult<Option<Vec<u8>>> {
        if self.io.peek(1)?.is_empty() {
            return Ok(None);
        }
        let mut head = [0u8; RECORD_HEADER_SIZE];
        let frame = self.io.read_exact(&mut head).and_then(|()| {
            let captured = self.endian.read_u32(&head[8..12]) as usize;
            self.io.read_bytes(captured)
        });
        match frame {
            Ok(frame) => {
                self.frames += 1;
                Ok(Some(frame))
            }
            Err(YunError::Eof) => {
                warn!("pcap 第 {} 个报文被截断, 按归档结束处理", self.frames + 1);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

/// 从一帧链路层数据中取出 UDP 负载
fn udp_payload(frame: &[u8], link_type: u32) -> Option<&[u8]> {
    let ip = if link_type == LINKTYPE_ETHERNET {
        let mut ethertype = BigEndian::read_u16(frame.get(12..14)?);
        let mut offset = 14;
        if ethertype == ETHERTYPE_VLAN {
            ethertype = BigEndian::read_u16(frame.get(16..18)?);
            offset = 18;
        }
        if ethertype != ETHERTYPE_IPV4 {
            return None;
        }
        frame.get(offset..)?
    } else {
        frame
    };

    let first = *ip.first()?;
    if first >> 4 != 4 {
        return None;
    }
    let ihl = usize::from(first & 0x0F) * 4;
    if ihl < 20 || *ip.get(9)? != IPPROTO_UDP {
        return None;
    }
    // MF 位或片偏移非零
    if BigEndian::read_u16(ip.get(6..8)?) & 0x3FFF != 0 {
        return None;
    }
    let total = usize::from(BigEndian::read_u16(ip.get(2..4)?));
    let udp = ip.get(ihl..total.min(ip.len()))?;
    let udp_len = usize::from(BigEndian::read_u16(udp.get(4..6)?));
    if udp_len < 8 {
        return None;
    }
    udp.get(8..udp_len.min(udp.len()))
}

fn looks_like_rtp(data: &[u8]) -> bool {
    data.len() >= RTP_HEADER_SIZE && data[0] >> 6 == RTP_VERSION && is_media_payload_type(data[1] & 0x7F)
}

impl ArchiveReader for PcapReader {
    fn next_record(&mut self) -> YunResult<Option<Bytes>> {
        while let Some(frame) = self.read_frame()? {
            match udp_payload(&frame, self.link_type) {
                Some(payload) if looks_like_rtp(payload) => {
                    return Ok(Some(Bytes::copy_from_slice(payload)));
                }
                _ => self.skipped += 1,
            }
        }
        debug!("pcap 归档结束: {} 个报文, 跳过 {}", self.frames, self.skipped);
        Ok(None)
    }

    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Pcap
    }
}
