//! yunraw 解封装器.
//!
//! 只能读取带记录头的文件; data_only 模式输出的文件没有记录边界.

use byteorder::{ByteOrder, LittleEndian};
use bytes::Bytes;
use yun_codec::{Packet, PacketFlags};
use yun_core::{YunError, YunResult};

use crate::demuxer::Demuxer;
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::probe::{FormatProbe, ProbeScore, SCORE_MAX, score_extension};
use crate::raw::{RECORD_HEADER_SIZE, TYPE_AUDIO, TYPE_VIDEO, decode_header};
use crate::stream::Stream;

/// yunraw 解封装器
pub struct YunRawDemuxer {
    streams: Vec<Stream>,
}

impl YunRawDemuxer {
    /// 创建 yunraw 解封装器 (工厂函数)
    pub fn create() -> YunResult<Box<dyn Demuxer>> {
        Ok(Box::new(Self::new()))
    }

    /// 创建 yunraw 解封装器
    pub fn new() -> Self {
        Self {
            streams: Vec::new(),
        }
    }
}

impl Default for YunRawDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Demuxer for YunRawDemuxer {
    fn format_id(&self) -> FormatId {
        FormatId::YunRaw
    }

    fn open(&mut self, io: &mut IoContext) -> YunResult<()> {
        let stream = decode_header(io).map_err(|e| match e {
            YunError::Eof => YunError::InvalidData("yunraw: 文件头不完整".into()),
            other => other,
        })?;
        self.streams = vec![stream];
        Ok(())
    }

    fn streams(&self) -> &[Stream] {
        &self.streams
    }

    fn read_packet(&mut self, io: &mut IoContext) -> YunResult<Packet> {
        let Some(stream) = self.streams.first() else {
            return Err(YunError::BadValue("yunraw: 尚未打开".into()));
        };
        let time_base = stream.time_base;

        let mut record = [0u8; RECORD_HEADER_SIZE];
        // 记录边界处的 EOF 是正常结束
        let first = io.peek(1)?;
        if first.is_empty() {
            return Err(YunError::Eof);
        }
        let truncated = |e: YunError| match e {
            YunError::Eof => YunError::InvalidData("yunraw: 记录被截断".into()),
            other => other,
        };
        io.read_exact(&mut record).map_err(truncated)?;

        let pts = LittleEndian::read_i64(&record[0..8]);
        let flags = LittleEndian::read_i32(&record[8..12]);
        let size = LittleEndian::read_i32(&record[12..16]);
        let size = usize::try_from(size)
            .map_err(|_| YunError::InvalidData(format!("yunraw: 记录长度为负: {size}")))?;
        let data = io.read_bytes(size).map_err(truncated)?;

        let mut pkt = Packet::from_data(Bytes::from(data));
        pkt.pts = pts;
        pkt.dts = pts;
        pkt.duration = 0;
        pkt.time_base = time_base;
        pkt.flags = PacketFlags::from_bits_truncate(flags as u32);
        Ok(pkt)
    }
}

/// yunraw 格式探测器
pub struct YunRawProbe;

impl FormatProbe for YunRawProbe {
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore> {
        let by_ext = score_extension(FormatId::YunRaw, filename);
        let tag_len = *data.first()? as usize;
        let tag = data.get(1..1 + tag_len)?;
        if tag_len == 5 && (tag == TYPE_VIDEO.as_bytes() || tag == TYPE_AUDIO.as_bytes()) {
            // 类型标记太短, 只有扩展名也吻合时才给满分
            return Some(if by_ext.is_some() { SCORE_MAX } else { SCORE_MAX / 4 });
        }
        by_ext
    }

    fn format_id(&self) -> FormatId {
        FormatId::YunRaw
    }
}
