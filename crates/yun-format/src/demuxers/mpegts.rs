//! MPEG-TS (Transport Stream) 解封装器.
//!
//! 打开时预读 TS 包直到解析出 PAT 与 PMT; 预读的包被保留下来,
//! 在 `read_packet()` 中按原顺序重新处理, 所以输入不需要支持 seek.
//!
//! PAT、SDT、各 PMT 与各 ES 的 PID 上, 每个携带负载的 TS 包的连续性
//! 计数器都会被记录, 读完文件后可通过 `continuity()` 导出.

use std::collections::{HashMap, VecDeque};

use bytes::Bytes;
use log::{debug, warn};
use yun_codec::{CodecId, Packet};
use yun_core::{NOPTS_VALUE, Rational, YunError, YunResult};

use crate::continuity::{ContinuityStore, CounterTable};
use crate::demuxer::Demuxer;
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::probe::{FormatProbe, ProbeScore, SCORE_MAX, score_extension};
use crate::stream::Stream;
use crate::ts::{
    PID_NULL, PID_PAT, PID_SDT, TABLE_PAT, TABLE_PMT, TS_PACKET_SIZE, TS_SYNC_BYTE, TsHeader,
    decode_timestamp, stream_type_to_codec,
};

/// 打开时最多预读的 TS 包数
const MAX_PROBE_PACKETS: usize = 2000;
/// 同步搜索的最大字节数
const MAX_SYNC_SEARCH: usize = 65536;

/// PES 重组缓冲区
struct PesBuffer {
    data: Vec<u8>,
    pts: i64,
    dts: i64,
    random_access: bool,
    stream_index: usize,
    /// PES 头声明的负载长度 (0 表示未指定)
    expected: usize,
}

impl PesBuffer {
    fn new(stream_index: usize) -> Self {
        Self {
            data: Vec::new(),
            pts: NOPTS_VALUE,
            dts: NOPTS_VALUE,
            random_access: false,
            stream_index,
            expected: 0,
        }
    }

    fn take_packet(&mut self) -> Option<Packet> {
        if self.data.is_empty() {
            return None;
        }
        let mut pkt = Packet::from_data(Bytes::from(std::mem::take(&mut self.data)));
        pkt.stream_index = self.stream_index;
        pkt.pts = self.pts;
        pkt.dts = if self.dts != NOPTS_VALUE { self.dts } else { self.pts };
        pkt.set_keyframe(self.random_access);
        pkt.time_base = Rational::CLOCK_90K;

        self.pts = NOPTS_VALUE;
        self.dts = NOPTS_VALUE;
        self.random_access = false;
        self.expected = 0;
        Some(pkt)
    }
}

/// 解析后的 PES 头
struct PesHeader {
    pts: i64,
    dts: i64,
    header_len: usize,
    /// 负载长度 (PES_packet_length 为 0 时为 0)
    payload_len: usize,
}

/// MPEG-TS 解封装器
pub struct TsDemuxer {
    streams: Vec<Stream>,
    pmt_pid: Option<u16>,
    pid_to_stream: HashMap<u16, usize>,
    pes_buffers: HashMap<u16, PesBuffer>,
    /// 已完成的数据包
    queue: VecDeque<Packet>,
    /// 打开时预读、尚未处理的 TS 包
    pending: VecDeque<[u8; TS_PACKET_SIZE]>,
    counters: CounterTable,
    pmt_parsed: bool,
    eof: bool,
}

impl TsDemuxer {
    /// 创建 MPEG-TS 解封装器实例 (工厂函数)
    pub fn create() -> YunResult<Box<dyn Demuxer>> {
        Ok(Box::new(Self::new()))
    }

    /// 创建 MPEG-TS 解封装器
    pub fn new() -> Self {
        Self {
            streams: Vec::new(),
            pmt_pid: None,
            pid_to_stream: HashMap::new(),
            pes_buffers: HashMap::new(),
            queue: VecDeque::new(),
            pending: VecDeque::new(),
            counters: CounterTable::new(),
            pmt_parsed: false,
            eof: false,
        }
    }

    /// 读取一个 188 字节的 TS 包
    fn read_ts_packet(io: &mut IoContext) -> YunResult<[u8; TS_PACKET_SIZE]> {
        let mut pkt = [0u8; TS_PACKET_SIZE];
        io.read_exact(&mut pkt)?;
        if pkt[0] != TS_SYNC_BYTE {
            return Err(YunError::InvalidData("TS: 同步字节不匹配".into()));
        }
        Ok(pkt)
    }

    /// 跳到第一个后面紧跟同步字节的 0x47
    fn sync_to_packet(io: &mut IoContext) -> YunResult<()> {
        for _ in 0..MAX_SYNC_SEARCH {
            let window = io.peek(TS_PACKET_SIZE + 1)?;
            if window.is_empty() {
                return Err(YunError::Eof);
            }
            if window[0] == TS_SYNC_BYTE
                && (window.len() <= TS_PACKET_SIZE || window[TS_PACKET_SIZE] == TS_SYNC_BYTE)
            {
                return Ok(());
            }
            io.skip(1)?;
        }
        Err(YunError::InvalidData("TS: 找不到同步字节".into()))
    }

    /// 取 payload 起始偏移, 以及 random_access_indicator
    fn payload_offset(pkt: &[u8; TS_PACKET_SIZE], header: &TsHeader) -> (usize, bool) {
        let mut offset = 4;
        let mut random_access = false;
        if header.has_adaptation() {
            let af_len = pkt[offset] as usize;
            if af_len > 0 {
                random_access = (pkt[offset + 1] & 0x40) != 0;
            }
            offset += 1 + af_len;
        }
        if header.has_payload() && offset < TS_PACKET_SIZE {
            (offset, random_access)
        } else {
            (TS_PACKET_SIZE, random_access)
        }
    }

    /// 取出 PSI 段 (跳过 pointer_field), 并按 section_length 截断
    fn psi_section(payload: &[u8]) -> Option<&[u8]> {
        let pointer = *payload.first()? as usize;
        let section = payload.get(1 + pointer..)?;
        if section.len() < 3 {
            return None;
        }
        let section_length = (usize::from(section[1] & 0x0F) << 8) | usize::from(section[2]);
        section.get(..3 + section_length)
    }

    fn parse_pat(&mut self, section: &[u8]) {
        if self.pmt_pid.is_some() || section[0] != TABLE_PAT || section.len() < 12 {
            return;
        }
        // 跳过 8 字节表头, 去掉 4 字节 CRC
        let entries = &section[8..section.len() - 4];
        for chunk in entries.chunks_exact(4) {
            let program_number = u16::from(chunk[0]) << 8 | u16::from(chunk[1]);
            let pid = (u16::from(chunk[2] & 0x1F) << 8) | u16::from(chunk[3]);
            if program_number != 0 {
                debug!("TS PAT: program={program_number} PMT_PID={pid:#06X}");
                self.pmt_pid = Some(pid);
                break;
            }
        }
    }

    fn parse_pmt(&mut self, section: &[u8]) {
        if self.pmt_parsed || section[0] != TABLE_PMT || section.len() < 16 {
            return;
        }
        let prog_info_len = (usize::from(section[10] & 0x0F) << 8) | usize::from(section[11]);
        let section_end = section.len() - 4;
        let mut pos = 12 + prog_info_len;

        while pos + 5 <= section_end {
            let stream_type = section[pos];
            let es_pid = (u16::from(section[pos + 1] & 0x1F) << 8) | u16::from(section[pos + 2]);
            let es_info_len =
                (usize::from(section[pos + 3] & 0x0F) << 8) | usize::from(section[pos + 4]);
            let es_info_end = (pos + 5 + es_info_len).min(section_end);
            let registration = find_registration(&section[pos + 5..es_info_end]);
            let codec_id = stream_type_to_codec(stream_type, registration);
            pos += 5 + es_info_len;

            debug!("TS PMT: stream_type=0x{stream_type:02X} PID={es_pid:#06X} codec={codec_id}");
            if codec_id == CodecId::None {
                debug!("TS PMT: 跳过未知 stream_type 0x{stream_type:02X}");
                continue;
            }

            let index = self.streams.len();
            let mut stream = Stream::new(index, codec_id, Rational::CLOCK_90K);
            stream.encoder_name = codec_id.name().to_string();
            self.streams.push(stream);
            self.pid_to_stream.insert(es_pid, index);
            self.pes_buffers.insert(es_pid, PesBuffer::new(index));
        }
        self.pmt_parsed = true;
    }

    /// 是否需要记录该 PID 的连续性计数器
    fn is_tracked_pid(&self, pid: u16) -> bool {
        pid == PID_PAT
            || pid == PID_SDT
            || Some(pid) == self.pmt_pid
            || self.pid_to_stream.contains_key(&pid)
    }

    /// 只解析 PSI, 用于打开阶段
    fn scan_psi(&mut self, pkt: &[u8; TS_PACKET_SIZE]) {
        let header = TsHeader::parse(pkt);
        if !header.pusi || (header.pid != PID_PAT && Some(header.pid) != self.pmt_pid) {
            return;
        }
        let (offset, _) = Self::payload_offset(pkt, &header);
        let Some(section) = Self::psi_section(&pkt[offset..]) else {
            return;
        };
        if header.pid == PID_PAT {
            self.parse_pat(section);
        } else {
            self.parse_pmt(section);
        }
    }

    /// 完整处理一个 TS 包: 记录计数器并重组 PES
    fn process_packet(&mut self, pkt: &[u8; TS_PACKET_SIZE]) {
        let header = TsHeader::parse(pkt);
        if header.pid == PID_NULL {
            return;
        }
        if header.has_payload() && self.is_tracked_pid(header.pid) {
            self.counters.record(header.pid, header.cc);
        }

        let (offset, random_access) = Self::payload_offset(pkt, &header);
        if offset >= TS_PACKET_SIZE || !self.pid_to_stream.contains_key(&header.pid) {
            return;
        }
        let payload = &pkt[offset..];

        let Some(buf) = self.pes_buffers.get_mut(&header.pid) else {
            return;
        };
        if header.pusi {
            if let Some(done) = buf.take_packet() {
                self.queue.push_back(done);
            }
            buf.random_access = random_access;
            match parse_pes_header(payload) {
                Some(pes) => {
                    buf.pts = pes.pts;
                    buf.dts = pes.dts;
                    buf.expected = pes.payload_len;
                    buf.data.extend_from_slice(&payload[pes.header_len.min(payload.len())..]);
                }
                None => buf.data.extend_from_slice(payload),
            }
        } else if buf.pts != NOPTS_VALUE || !buf.data.is_empty() {
            buf.data.extend_from_slice(payload);
            buf.random_access |= random_access;
        }

        // 声明了长度的 PES 一旦收齐立即输出
        if buf.expected > 0 && buf.data.len() >= buf.expected {
            buf.data.truncate(buf.expected);
            if let Some(done) = buf.take_packet() {
                self.queue.push_back(done);
            }
        }
    }

    /// 输入结束: 按流顺序输出所有未完成的 PES
    fn flush_all(&mut self) {
        let mut buffers: Vec<&mut PesBuffer> = self.pes_buffers.values_mut().collect();
        buffers.sort_by_key(|b| b.stream_index);
        for buf in buffers {
            if let Some(pkt) = buf.take_packet() {
                self.queue.push_back(pkt);
            }
        }
    }
}

impl Default for TsDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

/// 在 ES 描述符中查找 registration_descriptor (tag 0x05)
fn find_registration(mut descriptors: &[u8]) -> Option<[u8; 4]> {
    while descriptors.len() >= 2 {
        let tag = descriptors[0];
        let len = descriptors[1] as usize;
        let body = descriptors.get(2..2 + len)?;
        if tag == 0x05 && len >= 4 {
            return Some([body[0], body[1], body[2], body[3]]);
        }
        descriptors = &descriptors[2 + len..];
    }
    None
}

/// 解析 PES 包头, 提取 PTS/DTS
fn parse_pes_header(data: &[u8]) -> Option<PesHeader> {
    if data.len() < 9 || data[0] != 0x00 || data[1] != 0x00 || data[2] != 0x01 {
        return None;
    }
    let pes_length = (usize::from(data[4]) << 8) | usize::from(data[5]);

    if (data[6] & 0xC0) != 0x80 {
        // 没有可选头 (padding stream 等)
        return Some(PesHeader {
            pts: NOPTS_VALUE,
            dts: NOPTS_VALUE,
            header_len: 6,
            payload_len: pes_length,
        });
    }

    let pts_dts_flags = (data[7] >> 6) & 0x03;
    let header_len = 9 + data[8] as usize;
    let mut pts = NOPTS_VALUE;
    let mut dts = NOPTS_VALUE;
    if pts_dts_flags >= 2 && data.len() >= 14 {
        pts = decode_timestamp(&data[9..14]);
    }
    if pts_dts_flags == 3 && data.len() >= 19 {
        dts = decode_timestamp(&data[14..19]);
    }
    Some(PesHeader {
        pts,
        dts,
        header_len,
        payload_len: pes_length.saturating_sub(header_len - 6),
    })
}

impl Demuxer for TsDemuxer {
    fn format_id(&self) -> FormatId {
        FormatId::MpegTs
    }

    fn open(&mut self, io: &mut IoContext) -> YunResult<()> {
        Self::sync_to_packet(io)?;

        for _ in 0..MAX_PROBE_PACKETS {
            let pkt = match Self::read_ts_packet(io) {
                Ok(p) => p,
                Err(YunError::Eof) => break,
                Err(e) => return Err(e),
            };
            self.scan_psi(&pkt);
            self.pending.push_back(pkt);
            if self.pmt_parsed {
                break;
            }
        }

        if self.streams.is_empty() {
            return Err(YunError::InvalidData(
                "TS: 未找到任何流 (PAT/PMT 解析失败)".into(),
            ));
        }
        debug!(
            "TS: 打开完成, {} 个流, 预读 {} 个 TS 包",
            self.streams.len(),
            self.pending.len()
        );
        Ok(())
    }

    fn streams(&self) -> &[Stream] {
        &self.streams
    }

    fn read_packet(&mut self, io: &mut IoContext) -> YunResult<Packet> {
        loop {
            if let Some(pkt) = self.queue.pop_front() {
                return Ok(pkt);
            }
            if self.eof {
                return Err(YunError::Eof);
            }
            let ts = match self.pending.pop_front() {
                Some(ts) => ts,
                None => match Self::read_ts_packet(io) {
                    Ok(ts) => ts,
                    Err(YunError::Eof) => {
                        self.flush_all();
                        self.eof = true;
                        continue;
                    }
                    Err(YunError::InvalidData(msg)) => {
                        warn!("{msg}, 重新同步");
                        Self::sync_to_packet(io).or_else(|e| match e {
                            YunError::Eof => Ok(()),
                            other => Err(other),
                        })?;
                        continue;
                    }
                    Err(e) => return Err(e),
                },
            };
            self.process_packet(&ts);
        }
    }

    fn continuity(&self) -> Option<&dyn ContinuityStore> {
        Some(&self.counters)
    }
}

/// MPEG-TS 格式探测器
pub struct TsProbe;

impl FormatProbe for TsProbe {
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore> {
        // 在前 188 字节内找一个起点, 其后连续 3 个包都以同步字节开头
        for start in 0..TS_PACKET_SIZE.min(data.len()) {
            let synced = (0..3).all(|i| data.get(start + i * TS_PACKET_SIZE) == Some(&TS_SYNC_BYTE));
            if synced {
                return Some(SCORE_MAX);
            }
        }
        score_extension(FormatId::MpegTs, filename)
    }

    fn format_id(&self) -> FormatId {
        FormatId::MpegTs
    }
}
