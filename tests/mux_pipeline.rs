//! 交织封装集成测试.
//!
//! 视频、音频各写一个 yunraw 文件, 再交织封装为 MPEG-TS 并读回.

use std::path::Path;

use yun::codec::{CodecId, Packet};
use yun::core::Rational;
use yun::format::io::MemoryBackend;
use yun::format::stream::{AudioStreamParams, StreamParams, VideoStreamParams};
use yun::format::{FormatHint, FormatRegistry, IoContext, Stream};
use yun::remux::{
    DemuxSource, MuxFlags, MuxInput, NeverAbort, PacketSource, PendingSink, RemuxOptions,
    mux, mux_streams, packet_list, remux,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn video_stream() -> Stream {
    let mut stream = Stream::new(0, CodecId::H264, Rational::new(1, 25));
    stream.encoder_name = "libx264".into();
    stream.params = StreamParams::Video(VideoStreamParams {
        width: 640,
        height: 360,
        frame_rate: Rational::new(25, 1),
        ..Default::default()
    });
    stream
}

fn audio_stream() -> Stream {
    let mut stream = Stream::new(0, CodecId::Aac, Rational::new(1, 48000));
    stream.encoder_name = "aac".into();
    stream.params = StreamParams::Audio(AudioStreamParams {
        sample_rate: 48000,
        channel_layout: 0x3,
        bit_rate: 128_000,
    });
    stream
}

fn packets(pts: &[i64], keyframe_every: usize, size: usize) -> Vec<Packet> {
    pts.iter()
        .enumerate()
        .map(|(i, &t)| {
            let mut p = Packet::from_data(vec![i as u8; size]);
            p.pts = t;
            p.dts = t;
            p.set_keyframe(i % keyframe_every == 0);
            p
        })
        .collect()
}

/// 把一组数据包写成 yunraw 文件
fn write_raw(registry: &FormatRegistry, path: &Path, stream: Stream, pts: &[i64], size: usize) {
    let sink = PendingSink::create_file(registry, path, None, std::slice::from_ref(&stream)).unwrap();
    let mut source = packet_list(vec![stream], packets(pts, 12, size));
    let stats = remux(&mut source, sink, None, &RemuxOptions::default(), &NeverAbort).unwrap();
    assert_eq!(stats.packets_written, pts.len() as u64);
    assert!(stats.counters.is_none());
}

fn read_back(registry: &FormatRegistry, bytes: Vec<u8>) -> Vec<Packet> {
    let io = IoContext::new(Box::new(MemoryBackend::from_data(bytes)));
    let mut source = DemuxSource::open(registry, io, &FormatHint::named("mpegts")).unwrap();
    let mut out = Vec::new();
    while let Some(p) = source.next_packet().unwrap() {
        out.push(p);
    }
    out
}

#[test]
fn test_交织封装_原始文件到ts() {
    init_logger();
    let registry = yun::default_format_registry();
    let dir = tempfile::tempdir().unwrap();
    let video_path = dir.path().join("video.yraw");
    let audio_path = dir.path().join("audio.yraw");

    // 2 秒: 视频 50 帧, 音频 93 包 (1024 采样)
    let video_pts: Vec<i64> = (0..50).collect();
    let audio_pts: Vec<i64> = (0..93).map(|i| i * 1024).collect();
    write_raw(&registry, &video_path, video_stream(), &video_pts, 400);
    write_raw(&registry, &audio_path, audio_stream(), &audio_pts, 90);

    let mut video = DemuxSource::open_file(&registry, &video_path, None).unwrap();
    let mut audio = DemuxSource::open_file(&registry, &audio_path, None).unwrap();
    assert_eq!(video.streams()[0].time_base, Rational::new(1, 25));
    assert_eq!(audio.streams()[0].codec_id, CodecId::Aac);

    let video_in = MuxInput::new(&mut video);
    let audio_in = MuxInput::new(&mut audio);
    let streams = mux_streams(Some(&video_in), Some(&audio_in)).unwrap();
    assert_eq!(streams[0].codec_id, CodecId::H264);
    assert_eq!(streams[1].index, 1);

    let backend = MemoryBackend::new();
    let handle = backend.handle();
    let sink = PendingSink::open(
        &registry,
        IoContext::new(Box::new(backend)),
        &FormatHint::named("mpegts"),
        &streams,
    )
    .unwrap();
    let stats = mux(
        sink,
        Some(video_in),
        Some(audio_in),
        MuxFlags::default(),
        &yun::format::MuxOptions::new(),
        &NeverAbort,
    )
    .unwrap();
    assert_eq!(stats.video_packets, 50);
    assert_eq!(stats.audio_packets, 93);
    assert_eq!(stats.dropped, 0);

    let out = read_back(&registry, handle.contents());
    assert_eq!(out.len(), 143);
    // 写出顺序按时间交织, 相等时视频在前
    let times: Vec<i64> = out.iter().map(|p| p.pts).collect();
    assert!(times.windows(2).all(|w| w[0] <= w[1]), "{times:?}");
    assert_eq!(out[0].stream_index, 0);
    assert_eq!(out[1].stream_index, 1);
    assert_eq!(out[0].pts, 0);
    assert_eq!(out[1].pts, 0);
}

#[test]
fn test_交织封装_单调性过滤只看输出时间基() {
    init_logger();
    let registry = yun::default_format_registry();
    let dir = tempfile::tempdir().unwrap();
    let audio_path = dir.path().join("jitter.yraw");

    // 48000 -> 90000: 1024 与 1025 采样换算后不同, 回退的包被丢弃
    let audio_pts = [0, 1024, 1025, 1000, 2048, 2048, 3072];
    write_raw(&registry, &audio_path, audio_stream(), &audio_pts, 32);

    let mut audio = DemuxSource::open_file(&registry, &audio_path, None).unwrap();
    let audio_in = MuxInput::new(&mut audio);
    let streams = mux_streams(None, Some(&audio_in)).unwrap();
    let backend = MemoryBackend::new();
    let handle = backend.handle();
    let sink = PendingSink::open(
        &registry,
        IoContext::new(Box::new(backend)),
        &FormatHint::named("mpegts"),
        &streams,
    )
    .unwrap();
    let flags = MuxFlags { monotonic: true };
    let stats = mux(sink, None, Some(audio_in), flags, &yun::format::MuxOptions::new(), &NeverAbort).unwrap();
    assert_eq!(stats.audio_packets, 5);
    assert_eq!(stats.dropped, 2);

    let pts: Vec<i64> = read_back(&registry, handle.contents()).iter().map(|p| p.pts).collect();
    assert_eq!(pts, vec![0, 1920, 1922, 3840, 5760]);
}
