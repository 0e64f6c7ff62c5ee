//! yunraw 封装器: 每个文件一条流, 逐包写出记录.

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use yun_codec::Packet;
use yun_core::{Rational, YunError, YunResult};

use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::muxer::Muxer;
use crate::options::parse_bool;
use crate::raw::{RECORD_HEADER_SIZE, encode_header, raw_time_base};
use crate::stream::Stream;

/// yunraw 封装器
pub struct YunRawMuxer {
    /// 只写负载, 不写记录头
    data_only: bool,
    header_written: bool,
    records: u64,
}

impl YunRawMuxer {
    /// 创建 yunraw 封装器 (工厂函数)
    pub fn create() -> YunResult<Box<dyn Muxer>> {
        Ok(Box::new(Self::new()))
    }

    /// 创建 yunraw 封装器
    pub fn new() -> Self {
        Self {
            data_only: false,
            header_written: false,
            records: 0,
        }
    }
}

impl Default for YunRawMuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Muxer for YunRawMuxer {
    fn format_id(&self) -> FormatId {
        FormatId::YunRaw
    }

    fn stream_time_base(&self, stream: &Stream) -> Rational {
        raw_time_base(stream).unwrap_or(stream.time_base)
    }

    fn set_option(&mut self, key: &str, value: &str) -> YunResult<bool> {
        match key {
            "data_only" => {
                self.data_only = parse_bool(key, value)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn write_header(&mut self, io: &mut IoContext, streams: &[Stream]) -> YunResult<()> {
        if streams.len() != 1 {
            return Err(YunError::BadValue(format!(
                "yunraw 每个文件只能有一条流, 实际 {}",
                streams.len()
            )));
        }
        let stream = &streams[0];
        raw_time_base(stream)?;
        let header = encode_header(stream)?;
        io.write_all(&header)?;
        self.header_written = true;
        self.records = 0;
        debug!(
            "yunraw: {} 流, 编码器 {}, data_only={}",
            stream.media_type,
            stream.encoder(),
            self.data_only
        );
        Ok(())
    }

    fn write_packet(&mut self, io: &mut IoContext, packet: &Packet) -> YunResult<()> {
        if !self.header_written {
            return Err(YunError::BadValue("yunraw: 尚未写入头部".into()));
        }
        if packet.stream_index != 0 {
            return Err(YunError::StreamNotFound(packet.stream_index));
        }
        if !self.data_only {
            let size = i32::try_from(packet.data.len())
                .map_err(|_| YunError::BadValue("yunraw: 数据包过大".into()))?;
            let mut record = [0u8; RECORD_HEADER_SIZE];
            LittleEndian::write_i64(&mut record[0..8], packet.pts);
            LittleEndian::write_i32(&mut record[8..12], packet.flags.bits() as i32);
            LittleEndian::write_i32(&mut record[12..16], size);
            io.write_all(&record)?;
        }
        io.write_all(&packet.data)?;
        self.records += 1;
        Ok(())
    }

    fn write_trailer(&mut self, io: &mut IoContext) -> YunResult<()> {
        debug!("yunraw: 共写出 {} 条记录", self.records);
        io.flush()
    }
}
