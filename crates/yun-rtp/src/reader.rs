//! 依次读取一组归档分片中的 RTP 包.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use bytes::Bytes;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use yun_core::{YunError, YunResult};
use yun_format::IoContext;
use yun_format::io::MemoryBackend;

use crate::archive::{ArchiveReader, open_archive};
use crate::description::key_values;
use crate::packet::RtpPacket;

/// 归档的一个分片
#[derive(Debug, Clone)]
pub enum ArchivePart {
    File(PathBuf),
    Memory { name: String, data: Bytes },
}

impl ArchivePart {
    pub fn memory(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self::Memory {
            name: name.into(),
            data: data.into(),
        }
    }

    pub fn open(&self) -> YunResult<Box<dyn ArchiveReader>> {
        match self {
            Self::File(path) => {
                let name = path.to_string_lossy();
                open_archive(IoContext::open_read(path)?, Some(&name))
            }
            Self::Memory { name, data } => {
                let backend = MemoryBackend::from_data(data.to_vec());
                open_archive(IoContext::new(Box::new(backend)), Some(name))
            }
        }
    }
}

impl From<PathBuf> for ArchivePart {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

impl fmt::Display for ArchivePart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Memory { name, .. } => f.write_str(name),
        }
    }
}

/// 按负载类型与 SSRC 选取 RTP 包, 未设置的条件不限制
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RtpFilter {
    pub payload_type: Option<u8>,
    pub ssrc: Option<u32>,
}

impl RtpFilter {
    pub fn matches(&self, packet: &RtpPacket) -> bool {
        self.payload_type.is_none_or(|pt| pt == packet.payload_type)
            && self.ssrc.is_none_or(|ssrc| ssrc == packet.ssrc)
    }
}

impl FromStr for RtpFilter {
    type Err = YunError;

    /// `pt=96,ssrc=12345`
    fn from_str(s: &str) -> YunResult<Self> {
        let mut filter = Self::default();
        for (key, value) in key_values(s)? {
            let bad = || YunError::BadValue(format!("过滤条件 {key} 的取值 \"{value}\" 无效"));
            match key {
                "pt" | "payload_type" => filter.payload_type = Some(value.parse().map_err(|_| bad())?),
                "ssrc" => filter.ssrc = Some(value.parse().map_err(|_| bad())?),
                _ => return Err(YunError::BadValue(format!("未知的过滤条件 \"{key}\""))),
            }
        }
        Ok(filter)
    }
}

/// 一组分片中的 RTP 包, 分片按给定顺序拼接
pub struct RtpPackets {
    parts: Vec<ArchivePart>,
    next_part: usize,
    current: Option<Box<dyn ArchiveReader>>,
    filter: RtpFilter,
    packets: u64,
    malformed: u64,
}

impl RtpPackets {
    pub fn new(parts: Vec<ArchivePart>, filter: RtpFilter) -> Self {
        Self {
            parts,
            next_part: 0,
            current: None,
            filter,
            packets: 0,
            malformed: 0,
        }
    }

    /// 下一个满足过滤条件的包, 无法解析的包记录警告后跳过
    pub fn next_packet(&mut self) -> YunResult<Option<RtpPacket>> {
        loop {
            if self.current.is_none() {
                let Some(part) = self.parts.get(self.next_part) else {
                    return Ok(None);
                };
                debug!("打开归档分片 #{}: {part}", self.next_part);
                self.current = Some(part.open()?);
                self.next_part += 1;
            }
            let Some(reader) = self.current.as_mut() else {
                continue;
            };
            let Some(raw) = reader.next_record()? else {
                self.current = None;
                continue;
            };
            match RtpPacket::parse(&raw) {
                Ok(packet) if self.filter.matches(&packet) => {
                    self.packets += 1;
                    return Ok(Some(packet));
                }
                Ok(_) => {}
                Err(e) => {
                    self.malformed += 1;
                    warn!("跳过无法解析的 RTP 包: {e}");
                }
            }
        }
    }

    /// 已交出的包数
    pub fn packets_read(&self) -> u64 {
        self.packets
    }

    /// 无法解析而被跳过的包数
    pub fn malformed(&self) -> u64 {
        self.malformed
    }
}
