//! MJR 归档 (Janus 录制格式).
//!
//! 布局 (大端):
//! - 头部: `"MEETECHO"` `[u16 长度]["video" | "audio"]`
//! - 之后每条记录: `"MEETECHO"` `[u16 长度][RTP 包]`
//!
//! 录制进程可能在写记录时被打断, 因此读到不完整或标记错误的记录时按归档结束处理.

use bytes::Bytes;
use log::{debug, warn};
use yun_core::{MediaType, YunError, YunResult};
use yun_format::IoContext;

use super::{ArchiveFormat, ArchiveReader};

/// 头部与每条记录前的标记
pub const MJR_MARKER: &[u8; 8] = b"MEETECHO";

fn read_record(io: &mut IoContext) -> YunResult<Vec<u8>> {
    let mut marker = [0u8; 8];
    io.read_exact(&mut marker)?;
    if &marker != MJR_MARKER {
        return Err(YunError::InvalidData(format!(
            "MJR: 标记错误 {:?}",
            String::from_utf8_lossy(&marker)
        )));
    }
    let mut len = [0u8; 2];
    io.read_exact(&mut len)?;
    io.read_bytes(usize::from(u16::from_be_bytes(len)))
}

fn write_record(io: &mut IoContext, data: &[u8]) -> YunResult<()> {
    let len = u16::try_from(data.len())
        .map_err(|_| YunError::BadValue(format!("MJR: 记录长度 {} 超过 65535", data.len())))?;
    io.write_all(MJR_MARKER)?;
    io.write_all(&len.to_be_bytes())?;
    io.write_all(data)
}

/// MJR 读取器
pub struct MjrReader {
    io: IoContext,
    media_type: MediaType,
    records: u64,
}

impl MjrReader {
    pub fn open(mut io: IoContext) -> YunResult<Self> {
        let kind = read_record(&mut io).map_err(|e| match e {
            YunError::Eof => YunError::InvalidData("MJR: 头部不完整".into()),
            e => e,
        })?;
        let media_type = match kind.as_slice() {
            b"video" => MediaType::Video,
            b"audio" => MediaType::Audio,
            other => {
                return Err(YunError::Unsupported(format!(
                    "MJR: 未知的媒体类型 {:?}",
                    String::from_utf8_lossy(other)
                )));
            }
        };
        debug!("打开 MJR 归档: {media_type:?}");
        Ok(Self {
            io,
            media_type,
            records: 0,
        })
    }

    /// 头部声明的媒体类型
    pub fn media_type(&self) -> MediaType {
        self.media_type
    }
}

impl ArchiveReader for MjrReader {
    fn next_record(&mut self) -> YunResult<Option<Bytes>> {
        if self.io.peek(1)?.is_empty() {
            debug!("MJR 归档结束, 共 {} 条记录", self.records);
            return Ok(None);
        }
        match read_record(&mut self.io) {
            Ok(data) => {
                self.records += 1;
                Ok(Some(Bytes::from(data)))
            }
            Err(e @ (YunError::Eof | YunError::InvalidData(_))) => {
                warn!("MJR 第 {} 条记录损坏, 按归档结束处理: {e}", self.records + 1);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn format(&self) -> ArchiveFormat {
        ArchiveFormat::Mjr
    }
}

/// MJR 写入器
pub struct MjrWriter {
    io: IoContext,
    records: u64,
}

impl MjrWriter {
    /// 写出头部
    pub fn create(mut io: IoContext, media_type: MediaType) -> YunResult<Self> {
        let kind: &[u8] = match media_type {
            MediaType::Video => b"video",
            MediaType::Audio => b"audio",
            MediaType::Other => {
                return Err(YunError::BadValue("MJR 只能记录音频或视频".into()));
            }
        };
        write_record(&mut io, kind)?;
        Ok(Self { io, records: 0 })
    }

    /// 追加一个 RTP 包
    pub fn write_record(&mut self, rtp: &[u8]) -> YunResult<()> {
        write_record(&mut self.io, rtp)?;
        self.records += 1;
        Ok(())
    }

    /// 刷新输出, 返回写入的记录数
    pub fn finish(mut self) -> YunResult<u64> {
        self.io.flush()?;
        Ok(self.records)
    }
}
