//! MPEG-TS (Transport Stream) 封装器.
//!
//! 输出结构:
//! - SDT/PAT/PMT 在第一个数据包之前写出, 之后按 `psi_period` 周期重复
//! - 每个数据包封装为一个 PES, 拆分到若干 188 字节 TS 包
//! - 关键帧的第一个 TS 包带 random_access_indicator, PCR 流同时携带 PCR
//!
//! PSI 推迟到第一个数据包才写出, 所以在 `write_header()` 之后注入的
//! 连续性计数器对 PAT/PMT/SDT 同样生效.

use log::debug;
use yun_codec::{CodecId, Packet};
use yun_core::crc::crc32_mpeg2;
use yun_core::{MediaType, NOPTS_VALUE, Rational, YunError, YunResult};

use crate::continuity::{CC_MASK, ContinuityStore, CounterTable};
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::muxer::Muxer;
use crate::options::parse_value;
use crate::stream::Stream;
use crate::ts::{
    DEFAULT_PMT_PID, DEFAULT_START_PID, PID_NULL, PID_PAT, PID_SDT, TABLE_PAT, TABLE_PMT,
    TABLE_SDT, TS_HEADER_SIZE, TS_PACKET_SIZE, TS_SYNC_BYTE, codec_to_stream_type, encode_pcr,
    encode_timestamp,
};

/// 流信息
struct TsStream {
    pid: u16,
    stream_type: u8,
    stream_id: u8,
    codec_id: CodecId,
}

/// 可通过选项调整的参数
#[derive(Debug, Clone)]
struct TsConfig {
    /// 两次 PAT/PMT 之间的 PES 数
    psi_period: u32,
    /// 两次 SDT 之间的 PES 数
    sdt_period: u32,
    transport_stream_id: u16,
    original_network_id: u16,
    service_id: u16,
    pmt_pid: u16,
    start_pid: u16,
    service_provider: String,
    service_name: String,
}

impl Default for TsConfig {
    fn default() -> Self {
        Self {
            psi_period: 40,
            sdt_period: 200,
            transport_stream_id: 0x0001,
            original_network_id: 0xFF01,
            service_id: 0x0001,
            pmt_pid: DEFAULT_PMT_PID,
            start_pid: DEFAULT_START_PID,
            service_provider: "yun".into(),
            service_name: "Service01".into(),
        }
    }
}

/// MPEG-TS 封装器
pub struct MpegTsMuxer {
    streams: Vec<TsStream>,
    counters: CounterTable,
    config: TsConfig,
    /// PCR 所在流的索引
    pcr_index: usize,
    since_psi: u32,
    since_sdt: u32,
    /// 尚未写出过 PSI
    psi_pending: bool,
}

impl MpegTsMuxer {
    /// 创建 MPEG-TS 封装器 (工厂函数)
    pub fn create() -> YunResult<Box<dyn Muxer>> {
        Ok(Box::new(Self::new()))
    }

    /// 创建 MPEG-TS 封装器
    pub fn new() -> Self {
        Self {
            streams: Vec::new(),
            counters: CounterTable::new(),
            config: TsConfig::default(),
            pcr_index: 0,
            since_psi: 0,
            since_sdt: 0,
            psi_pending: true,
        }
    }

    fn build_section(table_id: u8, syntax: u8, id_ext: u16, body: &[u8]) -> Vec<u8> {
        let section_length = 5 + body.len() + 4;
        let mut section = Vec::with_capacity(3 + section_length);
        section.push(table_id);
        section.push(syntax | ((section_length >> 8) as u8 & 0x0F));
        section.push(section_length as u8);
        section.extend_from_slice(&id_ext.to_be_bytes());
        // reserved, version=0, current_next=1
        section.push(0xC1);
        section.push(0x00);
        section.push(0x00);
        section.extend_from_slice(body);
        let crc = crc32_mpeg2(&section);
        section.extend_from_slice(&crc.to_be_bytes());
        section
    }

    /// 写出一个 PSI 段, 以 pointer_field 开头, 必要时跨多个 TS 包
    fn write_section(&mut self, io: &mut IoContext, pid: u16, section: &[u8]) -> YunResult<()> {
        let mut payload = Vec::with_capacity(section.len() + 1);
        payload.push(0x00);
        payload.extend_from_slice(section);

        for (i, chunk) in payload.chunks(TS_PACKET_SIZE - TS_HEADER_SIZE).enumerate() {
            let mut pkt = [0xFFu8; TS_PACKET_SIZE];
            pkt[0] = TS_SYNC_BYTE;
            pkt[1] = (if i == 0 { 0x40 } else { 0x00 }) | ((pid >> 8) as u8 & 0x1F);
            pkt[2] = pid as u8;
            pkt[3] = 0x10 | self.counters.advance(pid);
            pkt[TS_HEADER_SIZE..TS_HEADER_SIZE + chunk.len()].copy_from_slice(chunk);
            io.write_all(&pkt)?;
        }
        Ok(())
    }

    fn write_pat(&mut self, io: &mut IoContext) -> YunResult<()> {
        let pmt_pid = self.config.pmt_pid;
        let mut body = Vec::with_capacity(4);
        body.extend_from_slice(&self.config.service_id.to_be_bytes());
        body.push(0xE0 | ((pmt_pid >> 8) as u8 & 0x1F));
        body.push(pmt_pid as u8);
        let section =
            Self::build_section(TABLE_PAT, 0xB0, self.config.transport_stream_id, &body);
        self.write_section(io, PID_PAT, &section)
    }

    fn write_pmt(&mut self, io: &mut IoContext) -> YunResult<()> {
        let pcr_pid = self.streams[self.pcr_index].pid;
        let mut body = Vec::with_capacity(4 + self.streams.len() * 11);
        body.push(0xE0 | ((pcr_pid >> 8) as u8 & 0x1F));
        body.push(pcr_pid as u8);
        // program_info_length = 0
        body.push(0xF0);
        body.push(0x00);
        for stream in &self.streams {
            body.push(stream.stream_type);
            body.push(0xE0 | ((stream.pid >> 8) as u8 & 0x1F));
            body.push(stream.pid as u8);
            if stream.codec_id == CodecId::Opus {
                // registration_descriptor "Opus"
                body.extend_from_slice(&[0xF0, 0x06, 0x05, 0x04]);
                body.extend_from_slice(b"Opus");
            } else {
                body.extend_from_slice(&[0xF0, 0x00]);
            }
        }
        let section = Self::build_section(TABLE_PMT, 0xB0, self.config.service_id, &body);
        let pmt_pid = self.config.pmt_pid;
        self.write_section(io, pmt_pid, &section)
    }

    fn write_sdt(&mut self, io: &mut IoContext) -> YunResult<()> {
        let provider = self.config.service_provider.as_bytes();
        let name = self.config.service_name.as_bytes();

        // service_descriptor
        let mut descriptor = Vec::with_capacity(5 + provider.len() + name.len());
        descriptor.push(0x48);
        descriptor.push((3 + provider.len() + name.len()) as u8);
        // digital television service
        descriptor.push(0x01);
        descriptor.push(provider.len() as u8);
        descriptor.extend_from_slice(provider);
        descriptor.push(name.len() as u8);
        descriptor.extend_from_slice(name);

        let mut body = Vec::with_capacity(8 + descriptor.len());
        body.extend_from_slice(&self.config.original_network_id.to_be_bytes());
        body.push(0xFF);
        body.extend_from_slice(&self.config.service_id.to_be_bytes());
        // EIT_schedule_flag=0, EIT_present_following_flag=0
        body.push(0xFC);
        // running_status=4 (running), free_CA_mode=0
        let loop_len = descriptor.len() as u16;
        body.push(0x80 | ((loop_len >> 8) as u8 & 0x0F));
        body.push(loop_len as u8);
        body.extend_from_slice(&descriptor);

        let section =
            Self::build_section(TABLE_SDT, 0xF0, self.config.transport_stream_id, &body);
        self.write_section(io, PID_SDT, &section)
    }

    /// 写出 PSI 表, `with_sdt` 时先写 SDT
    fn write_tables(&mut self, io: &mut IoContext, with_sdt: bool) -> YunResult<()> {
        if with_sdt {
            self.write_sdt(io)?;
            self.since_sdt = 0;
        }
        self.write_pat(io)?;
        self.write_pmt(io)?;
        self.since_psi = 0;
        self.psi_pending = false;
        Ok(())
    }

    fn build_pes_header(stream_id: u8, packet: &Packet) -> Vec<u8> {
        let has_pts = packet.pts != NOPTS_VALUE;
        let has_dts = has_pts && packet.dts != NOPTS_VALUE && packet.dts != packet.pts;
        let ts_len = match (has_pts, has_dts) {
            (true, true) => 10,
            (true, false) => 5,
            _ => 0,
        };

        let mut header = Vec::with_capacity(9 + ts_len);
        header.extend_from_slice(&[0x00, 0x00, 0x01, stream_id]);
        let pes_length = 3 + ts_len + packet.data.len();
        let pes_length = if pes_length > 0xFFFF { 0 } else { pes_length as u16 };
        header.extend_from_slice(&pes_length.to_be_bytes());
        header.push(0x80);
        header.push(match (has_pts, has_dts) {
            (true, true) => 0xC0,
            (true, false) => 0x80,
            _ => 0x00,
        });
        header.push(ts_len as u8);
        if has_pts {
            let prefix = if has_dts { 0x30 } else { 0x20 };
            header.extend_from_slice(&encode_timestamp(prefix, packet.pts));
        }
        if has_dts {
            header.extend_from_slice(&encode_timestamp(0x10, packet.dts));
        }
        header
    }

    /// 把一个 PES 拆分为 TS 包写出
    fn write_pes(
        &mut self,
        io: &mut IoContext,
        pid: u16,
        pes: &[u8],
        random_access: bool,
        pcr: Option<i64>,
    ) -> YunResult<()> {
        let mut offset = 0;
        let mut first = true;

        while offset < pes.len() {
            let mut adaptation: Option<Vec<u8>> = None;
            if first && (random_access || pcr.is_some()) {
                let mut body = vec![0x00u8];
                if random_access {
                    body[0] |= 0x40;
                }
                if let Some(base) = pcr {
                    body[0] |= 0x10;
                    body.extend_from_slice(&encode_pcr(base));
                }
                adaptation = Some(body);
            }

            let af_size = adaptation.as_ref().map_or(0, |body| 1 + body.len());
            let room = TS_PACKET_SIZE - TS_HEADER_SIZE - af_size;
            let chunk = (pes.len() - offset).min(room);
            let stuffing = room - chunk;
            if stuffing > 0 {
                match adaptation.as_mut() {
                    Some(body) => body.resize(body.len() + stuffing, 0xFF),
                    None if stuffing == 1 => adaptation = Some(Vec::new()),
                    None => {
                        let mut body = vec![0x00u8];
                        body.resize(stuffing - 1, 0xFF);
                        adaptation = Some(body);
                    }
                }
            }

            let mut pkt = [0xFFu8; TS_PACKET_SIZE];
            pkt[0] = TS_SYNC_BYTE;
            pkt[1] = (if first { 0x40 } else { 0x00 }) | ((pid >> 8) as u8 & 0x1F);
            pkt[2] = pid as u8;
            let cc = self.counters.advance(pid);
            let mut pos = TS_HEADER_SIZE;
            match &adaptation {
                Some(body) => {
                    pkt[3] = 0x30 | cc;
                    pkt[4] = body.len() as u8;
                    pkt[5..5 + body.len()].copy_from_slice(body);
                    pos = 5 + body.len();
                }
                None => pkt[3] = 0x10 | cc,
            }
            pkt[pos..pos + chunk].copy_from_slice(&pes[offset..offset + chunk]);
            io.write_all(&pkt)?;

            offset += chunk;
            first = false;
        }
        Ok(())
    }
}

impl Default for MpegTsMuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Muxer for MpegTsMuxer {
    fn format_id(&self) -> FormatId {
        FormatId::MpegTs
    }

    fn stream_time_base(&self, _stream: &Stream) -> Rational {
        Rational::CLOCK_90K
    }

    fn set_option(&mut self, key: &str, value: &str) -> YunResult<bool> {
        let pid_in_range = |pid: u16| {
            if (0x0010..PID_NULL).contains(&pid) {
                Ok(pid)
            } else {
                Err(YunError::BadValue(format!("{key} 超出范围: {pid:#06x}")))
            }
        };
        match key {
            "psi_period" | "sdt_period" => {
                let period: u32 = parse_value(key, value)?;
                if period == 0 {
                    return Err(YunError::BadValue(format!("{key} 不能为 0")));
                }
                if key == "psi_period" {
                    self.config.psi_period = period;
                } else {
                    self.config.sdt_period = period;
                }
            }
            "transport_stream_id" => self.config.transport_stream_id = parse_value(key, value)?,
            "original_network_id" => self.config.original_network_id = parse_value(key, value)?,
            "service_id" => self.config.service_id = parse_value(key, value)?,
            "pmt_pid" => self.config.pmt_pid = pid_in_range(parse_value(key, value)?)?,
            "start_pid" => self.config.start_pid = pid_in_range(parse_value(key, value)?)?,
            "service_provider" | "service_name" => {
                if value.len() > 64 {
                    return Err(YunError::BadValue(format!("{key} 过长")));
                }
                if key == "service_provider" {
                    self.config.service_provider = value.to_string();
                } else {
                    self.config.service_name = value.to_string();
                }
            }
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn write_header(&mut self, _io: &mut IoContext, streams: &[Stream]) -> YunResult<()> {
        if streams.is_empty() {
            return Err(YunError::BadValue("MPEG-TS: 没有输入流".into()));
        }

        self.streams.clear();
        for (i, stream) in streams.iter().enumerate() {
            let stream_type = codec_to_stream_type(stream.codec_id).ok_or_else(|| {
                YunError::Unsupported(format!("MPEG-TS 不支持编解码器: {}", stream.codec_id))
            })?;
            let pid = self.config.start_pid + i as u16;
            if pid >= PID_NULL || pid == self.config.pmt_pid {
                return Err(YunError::BadValue(format!("MPEG-TS: 流 {i} 的 PID {pid:#06x} 冲突")));
            }
            let stream_id = match stream.media_type {
                MediaType::Video => 0xE0,
                MediaType::Audio => 0xC0,
                MediaType::Other => 0xBD,
            };
            self.streams.push(TsStream {
                pid,
                stream_type,
                stream_id,
                codec_id: stream.codec_id,
            });
        }
        self.pcr_index = streams
            .iter()
            .position(|s| s.media_type == MediaType::Video)
            .unwrap_or(0);

        // 计数器从 15 起跳, 第一个发出的包为 0
        self.counters.clear();
        self.counters.track(PID_PAT, CC_MASK);
        self.counters.track(PID_SDT, CC_MASK);
        self.counters.track(self.config.pmt_pid, CC_MASK);
        for stream in &self.streams {
            self.counters.track(stream.pid, CC_MASK);
        }
        self.psi_pending = true;
        self.since_psi = 0;
        self.since_sdt = 0;

        debug!(
            "MPEG-TS: {} 条流, PMT PID={:#06x}, PCR PID={:#06x}",
            self.streams.len(),
            self.config.pmt_pid,
            self.streams[self.pcr_index].pid
        );
        Ok(())
    }

    fn write_packet(&mut self, io: &mut IoContext, packet: &Packet) -> YunResult<()> {
        let idx = packet.stream_index;
        if idx >= self.streams.len() {
            return Err(YunError::StreamNotFound(idx));
        }

        if self.psi_pending || self.since_psi >= self.config.psi_period {
            let with_sdt = self.psi_pending || self.since_sdt >= self.config.sdt_period;
            self.write_tables(io, with_sdt)?;
        }
        self.since_psi += 1;
        self.since_sdt += 1;

        let (pid, stream_id) = (self.streams[idx].pid, self.streams[idx].stream_id);
        let pcr = if idx == self.pcr_index {
            [packet.dts, packet.pts]
                .into_iter()
                .find(|ts| *ts != NOPTS_VALUE)
        } else {
            None
        };

        let mut pes = Self::build_pes_header(stream_id, packet);
        pes.extend_from_slice(&packet.data);
        self.write_pes(io, pid, &pes, packet.is_keyframe(), pcr)
    }

    fn write_trailer(&mut self, io: &mut IoContext) -> YunResult<()> {
        // 没有任何数据包时仍输出一组 PSI, 保证文件可识别
        if self.psi_pending && !self.streams.is_empty() {
            self.write_tables(io, true)?;
        }
        io.flush()
    }

    fn continuity(&self) -> Option<&dyn ContinuityStore> {
        Some(&self.counters)
    }

    fn continuity_mut(&mut self) -> Option<&mut dyn ContinuityStore> {
        Some(&mut self.counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::continuity::ContinuityCounter;
    use crate::io::{MemoryBackend, MemoryHandle};
    use crate::ts::TsHeader;

    fn make_stream(index: usize, codec_id: CodecId) -> Stream {
        Stream::new(index, codec_id, Rational::CLOCK_90K)
    }

    fn make_packet(stream_index: usize, pts: i64, size: usize, key: bool) -> Packet {
        let mut pkt = Packet::from_data(vec![0xAB; size]);
        pkt.stream_index = stream_index;
        pkt.pts = pts;
        pkt.dts = pts;
        pkt.set_keyframe(key);
        pkt
    }

    fn open(streams: &[Stream]) -> (MpegTsMuxer, IoContext, MemoryHandle) {
        let backend = MemoryBackend::new();
        let handle = backend.handle();
        let mut io = IoContext::new(Box::new(backend));
        let mut muxer = MpegTsMuxer::new();
        muxer.write_header(&mut io, streams).unwrap();
        (muxer, io, handle)
    }

    fn headers(data: &[u8]) -> Vec<TsHeader> {
        assert_eq!(data.len() % TS_PACKET_SIZE, 0, "所有 TS 包应 188 字节对齐");
        data.chunks_exact(TS_PACKET_SIZE)
            .map(|c| {
                let pkt: &[u8; TS_PACKET_SIZE] = c.try_into().unwrap();
                assert_eq!(pkt[0], TS_SYNC_BYTE);
                TsHeader::parse(pkt)
            })
            .collect()
    }

    #[test]
    fn test_ts_头部推迟到第一个包() {
        let (mut muxer, mut io, handle) = open(&[make_stream(0, CodecId::H264)]);
        assert!(handle.is_empty());

        muxer.write_packet(&mut io, &make_packet(0, 0, 10, true)).unwrap();
        let pids: Vec<u16> = headers(&handle.contents()).iter().map(|h| h.pid).collect();
        assert_eq!(pids, vec![PID_SDT, PID_PAT, DEFAULT_PMT_PID, DEFAULT_START_PID]);
    }

    #[test]
    fn test_ts_计数器从零开始() {
        let (mut muxer, mut io, handle) = open(&[make_stream(0, CodecId::H264)]);
        muxer.write_packet(&mut io, &make_packet(0, 0, 10, true)).unwrap();
        muxer.write_packet(&mut io, &make_packet(0, 3000, 10, false)).unwrap();
        let hs = headers(&handle.contents());
        assert!(hs.iter().filter(|h| h.pid != DEFAULT_START_PID).all(|h| h.cc == 0));
        let es: Vec<u8> = hs.iter().filter(|h| h.pid == DEFAULT_START_PID).map(|h| h.cc).collect();
        assert_eq!(es, vec![0, 1]);
    }

    #[test]
    fn test_ts_注入计数器后继续() {
        let (mut muxer, mut io, handle) = open(&[make_stream(0, CodecId::H264)]);
        let applied = muxer
            .continuity_mut()
            .unwrap()
            .inject(&[ContinuityCounter::new(PID_PAT, 5)])
            .unwrap();
        assert_eq!(applied, 1);
        muxer.set_option("psi_period", "1").unwrap();

        for i in 0..12 {
            muxer.write_packet(&mut io, &make_packet(0, i * 3000, 10, i == 0)).unwrap();
        }
        let pat: Vec<u8> = headers(&handle.contents())
            .iter()
            .filter(|h| h.pid == PID_PAT)
            .map(|h| h.cc)
            .collect();
        assert_eq!(pat.len(), 12);
        assert_eq!(pat[0], 6);
        assert_eq!(pat[11], 1);
    }

    #[test]
    fn test_ts_周期重复_psi() {
        let (mut muxer, mut io, handle) = open(&[make_stream(0, CodecId::Aac)]);
        muxer.set_option("psi_period", "4").unwrap();
        for i in 0..9 {
            muxer.write_packet(&mut io, &make_packet(0, i * 1920, 20, true)).unwrap();
        }
        let pat_count = headers(&handle.contents()).iter().filter(|h| h.pid == PID_PAT).count();
        assert_eq!(pat_count, 3);
    }

    #[test]
    fn test_ts_大包拆分与填充() {
        let (mut muxer, mut io, handle) = open(&[make_stream(0, CodecId::H264)]);
        muxer.write_packet(&mut io, &make_packet(0, 0, 1000, true)).unwrap();
        let data = handle.contents();
        let es: Vec<&[u8]> = data
            .chunks_exact(TS_PACKET_SIZE)
            .filter(|c| TsHeader::parse((*c).try_into().unwrap()).pid == DEFAULT_START_PID)
            .collect();
        assert!(es.len() >= 6);
        // 第一个包: PUSI + adaptation (RAI + PCR)
        assert_eq!(es[0][1] & 0x40, 0x40);
        assert_eq!(es[0][3] & 0x30, 0x30);
        assert_eq!(es[0][5] & 0x50, 0x50);
        // 后续包不带 PUSI
        assert!(es[1..].iter().all(|c| c[1] & 0x40 == 0));
    }

    #[test]
    fn test_ts_写入_dts() {
        let (mut muxer, mut io, handle) = open(&[make_stream(0, CodecId::H264)]);
        let mut pkt = make_packet(0, 6000, 10, false);
        pkt.dts = 3000;
        muxer.write_packet(&mut io, &pkt).unwrap();
        let data = handle.contents();
        let es = &data[3 * TS_PACKET_SIZE..];
        // 非关键帧但为 PCR 流: adaptation 长度 7 (flags + PCR) + 填充
        let af_len = es[4] as usize;
        let pes = &es[5 + af_len..];
        assert_eq!(&pes[..4], &[0x00, 0x00, 0x01, 0xE0]);
        assert_eq!(pes[7], 0xC0);
        assert_eq!(crate::ts::decode_timestamp(&pes[9..14]), 6000);
        assert_eq!(crate::ts::decode_timestamp(&pes[14..19]), 3000);
    }

    #[test]
    fn test_ts_不支持的编解码器() {
        let backend = MemoryBackend::new();
        let mut io = IoContext::new(Box::new(backend));
        let mut muxer = MpegTsMuxer::new();
        let err = muxer.write_header(&mut io, &[make_stream(0, CodecId::Vp8)]).unwrap_err();
        assert!(matches!(err, YunError::Unsupported(_)));
        assert!(muxer.write_header(&mut io, &[]).is_err());
    }

    #[test]
    fn test_ts_空文件收尾仍写出_psi() {
        let (mut muxer, mut io, handle) = open(&[make_stream(0, CodecId::Aac)]);
        muxer.write_trailer(&mut io).unwrap();
        assert_eq!(handle.len(), 3 * TS_PACKET_SIZE);
    }

    #[test]
    fn test_ts_选项校验() {
        let mut muxer = MpegTsMuxer::new();
        assert!(muxer.set_option("pmt_pid", "0x1100").unwrap());
        assert!(!muxer.set_option("unknown", "1").unwrap());
        assert!(muxer.set_option("psi_period", "0").is_err());
        assert!(muxer.set_option("pmt_pid", "0x1FFF").is_err());
        assert!(muxer.set_option("service_id", "abc").is_err());
    }

    #[test]
    fn test_ts_psi_校验和() {
        let (mut muxer, mut io, handle) = open(&[make_stream(0, CodecId::H264), make_stream(1, CodecId::Opus)]);
        muxer.write_packet(&mut io, &make_packet(0, 0, 10, true)).unwrap();
        let data = handle.contents();
        for table in data.chunks_exact(TS_PACKET_SIZE).take(3) {
            let section = &table[5..];
            let len = ((usize::from(section[1]) & 0x0F) << 8) | usize::from(section[2]);
            assert_eq!(crc32_mpeg2(&section[..3 + len]), 0);
        }
    }
}
