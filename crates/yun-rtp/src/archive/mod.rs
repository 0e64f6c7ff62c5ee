//! RTP 归档: 按记录顺序交出原始 RTP 包.

pub mod mjr;
pub mod pcap;

use std::path::Path;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use yun_core::{YunError, YunResult};
use yun_format::IoContext;

pub use mjr::{MJR_MARKER, MjrReader, MjrWriter};
pub use pcap::PcapReader;

/// 归档读取器
pub trait ArchiveReader {
    /// 下一个 RTP 包的原始字节, `Ok(None)` 表示归档结束
    fn next_record(&mut self) -> YunResult<Option<Bytes>>;

    fn format(&self) -> ArchiveFormat;
}

/// 归档格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveFormat {
    Mjr,
    Pcap,
}

impl ArchiveFormat {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mjr => "mjr",
            Self::Pcap => "pcap",
        }
    }

    /// 由文件头识别
    pub fn detect(head: &[u8]) -> Option<Self> {
        if head.starts_with(MJR_MARKER) {
            Some(Self::Mjr)
        } else if pcap::is_pcap_magic(head) {
            Some(Self::Pcap)
        } else {
            None
        }
    }

    /// 由扩展名识别
    pub fn from_filename(filename: &str) -> Option<Self> {
        let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "mjr" => Some(Self::Mjr),
            "pcap" | "cap" => Some(Self::Pcap),
            _ => None,
        }
    }
}

/// 打开归档: 先看文件头, 识别不了再看扩展名
pub fn open_archive(mut io: IoContext, filename: Option<&str>) -> YunResult<Box<dyn ArchiveReader>> {
    let format = ArchiveFormat::detect(io.peek(8)?)
        .or_else(|| filename.and_then(ArchiveFormat::from_filename))
        .ok_or_else(|| {
            YunError::FormatNotFound(format!("无法识别的归档 {}", filename.unwrap_or("<内存>")))
        })?;
    Ok(match format {
        ArchiveFormat::Mjr => Box::new(MjrReader::open(io)?),
        ArchiveFormat::Pcap => Box::new(PcapReader::open(io)?),
    })
}
