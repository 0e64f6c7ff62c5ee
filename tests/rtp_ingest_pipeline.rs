//! RTP 归档集成测试.
//!
//! 录制的 VP8、Opus MJR 文件经重组后分别写成 yunraw 与 MPEG-TS, 再读回检查.

use std::path::{Path, PathBuf};

use yun::codec::CodecId;
use yun::core::{MediaType, Rational};
use yun::format::io::MemoryBackend;
use yun::format::{FormatHint, IoContext, MuxOptions};
use yun::remux::{
    DemuxSource, MuxFlags, MuxInput, NeverAbort, PacketSource, PendingSink, RemuxOptions, mux,
    mux_streams, remux,
};
use yun::rtp::{
    ArchivePart, ArchiveSet, MjrWriter, PayloadKind, RtpPacket, RtpSource, RtpSourceOptions,
    StreamDescription,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn write_mjr(path: &Path, media_type: MediaType, packets: &[RtpPacket]) {
    let mut writer = MjrWriter::create(IoContext::open_write(path).unwrap(), media_type).unwrap();
    for p in packets {
        writer.write_record(&p.to_bytes()).unwrap();
    }
    assert_eq!(writer.finish().unwrap(), packets.len() as u64);
}

/// 1 秒 25 fps 的 VP8: 每 5 帧一个关键帧, 每帧拆成两个 RTP 包
fn vp8_packets() -> Vec<RtpPacket> {
    let base = 0xFFFF_0000u32;
    let mut out = Vec::new();
    for i in 0..25u32 {
        let ts = base.wrapping_add(i * 3600);
        let mut start = vec![0x90, 0x80, (i & 0x7F) as u8];
        if i % 5 == 0 {
            start.extend_from_slice(&[0x10, 0x02, 0x00, 0x9D, 0x01, 0x2A]);
            start.extend_from_slice(&640u16.to_le_bytes());
            start.extend_from_slice(&480u16.to_le_bytes());
        } else {
            start.extend_from_slice(&[0x11, 0x02, 0x00]);
        }
        start.extend_from_slice(&[0x55; 100]);
        let first = RtpPacket::new(96, (2 * i) as u16, ts, 0x1111, start);
        // 描述符 0x00 之后 80 字节续传数据
        let mut second = RtpPacket::new(96, (2 * i + 1) as u16, ts, 0x1111, vec![0x00; 81]);
        second.marker = true;
        out.push(first);
        out.push(second);
    }
    out
}

/// 1 秒 20 ms 一包的立体声 Opus
fn opus_packets() -> Vec<RtpPacket> {
    (0..50u32)
        .map(|i| RtpPacket::new(111, i as u16, 1000 + i * 960, 0x2222, vec![0xFC, 0xAA, 0xBB]))
        .collect()
}

fn archives(dir: &Path) -> Vec<PathBuf> {
    let video = dir.join("room-video.mjr");
    let audio = dir.join("room-audio.mjr");
    write_mjr(&video, MediaType::Video, &vp8_packets());
    write_mjr(&audio, MediaType::Audio, &opus_packets());
    vec![video, audio]
}

fn open_sources(paths: &[PathBuf]) -> Vec<RtpSource> {
    let description: StreamDescription = "vp8!opus".parse().unwrap();
    description
        .bucket(paths)
        .unwrap()
        .into_iter()
        .map(|(kind, parts)| {
            let set = ArchiveSet::new(kind, parts.into_iter().map(ArchivePart::File).collect());
            RtpSource::open(&set, &RtpSourceOptions::default()).unwrap()
        })
        .collect()
}

#[test]
fn test_vp8_归档到_yunraw() {
    init_logger();
    let registry = yun::default_format_registry();
    let dir = tempfile::tempdir().unwrap();
    let mut sources = open_sources(&archives(dir.path()));
    let video = &mut sources[0];
    assert_eq!(video.kind(), PayloadKind::Vp8);

    let out_path = dir.path().join("room.yraw");
    let sink = PendingSink::create_file(&registry, &out_path, None, video.streams()).unwrap();
    let stats = remux(video, sink, None, &RemuxOptions::default(), &NeverAbort).unwrap();
    assert_eq!(stats.packets_written, 25);

    let mut back = DemuxSource::open_file(&registry, &out_path, None).unwrap();
    let stream = back.streams()[0].clone();
    assert_eq!(stream.codec_id, CodecId::Vp8);
    assert_eq!(stream.encoder(), "libvpx");
    let params = stream.video().unwrap();
    assert_eq!((params.width, params.height), (640, 480));
    assert_eq!(params.frame_rate, Rational::new(25, 1));

    let mut packets = Vec::new();
    while let Some(p) = back.next_packet().unwrap() {
        packets.push(p);
    }
    assert_eq!(packets.len(), 25);
    // 时间戳跨过 32 位回绕后仍然连续
    let steps: Vec<i64> = packets.windows(2).map(|w| w[1].pts - w[0].pts).collect();
    assert!(steps.iter().all(|&d| d == 1), "{steps:?}");
    let keys: Vec<bool> = packets.iter().map(|p| p.is_keyframe()).collect();
    assert_eq!(keys.iter().filter(|&&k| k).count(), 5);
    assert!(keys[0] && keys[5] && !keys[1]);
    // 描述符去掉, 两个包拼成一帧
    assert_eq!(packets[0].data.len(), 10 + 100 + 80);
    assert_eq!(packets[1].data.len(), 3 + 100 + 80);
}

#[test]
fn test_opus_归档交织封装为_ts() {
    init_logger();
    let registry = yun::default_format_registry();
    let dir = tempfile::tempdir().unwrap();
    let mut sources = open_sources(&archives(dir.path()));
    let audio = &mut sources[1];
    assert_eq!(audio.streams()[0].audio().unwrap().channel_layout, 0x3);

    let input = MuxInput::new(audio);
    let streams = mux_streams(None, Some(&input)).unwrap();
    assert_eq!(streams[0].codec_id, CodecId::Opus);
    let backend = MemoryBackend::new();
    let handle = backend.handle();
    let sink = PendingSink::open(
        &registry,
        IoContext::new(Box::new(backend)),
        &FormatHint::named("mpegts"),
        &streams,
    )
    .unwrap();
    let stats = mux(sink, None, Some(input), MuxFlags { monotonic: true }, &MuxOptions::new(), &NeverAbort).unwrap();
    assert_eq!(stats.audio_packets, 50);
    assert_eq!(stats.dropped, 0);

    let io = IoContext::new(Box::new(MemoryBackend::from_data(handle.contents())));
    let mut back = DemuxSource::open(&registry, io, &FormatHint::named("mpegts")).unwrap();
    assert_eq!(back.streams()[0].codec_id, CodecId::Opus);
    let mut pts = Vec::new();
    while let Some(p) = back.next_packet().unwrap() {
        pts.push(p.pts);
    }
    assert_eq!(pts.len(), 50);
    // 48 kHz 的 960 个采样 = 90 kHz 的 1800
    assert!(pts.windows(2).all(|w| w[1] - w[0] == 1800), "{pts:?}");
}
