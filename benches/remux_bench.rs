//! Yun 转封装性能基准测试.
//!
//! 覆盖 MPEG-TS 封装、解封装扫描、时间戳重映射等数据通路.

use bytes::Bytes;
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use yun::codec::{CodecId, Packet};
use yun::core::Rational;
use yun::format::io::MemoryBackend;
use yun::format::{FormatHint, IoContext, Stream};
use yun::remux::{DemuxSource, NeverAbort, PendingSink, RemuxOptions, packet_list, remap, remux, scan};

/// 10 秒 25fps 视频 + 48kHz 音频
fn make_packets() -> (Vec<Stream>, Vec<Packet>) {
    let streams = vec![
        Stream::new(0, CodecId::H264, Rational::new(1, 25)),
        Stream::new(1, CodecId::Aac, Rational::new(1, 48000)),
    ];
    let video = Bytes::from(vec![0x5Au8; 8000]);
    let audio = Bytes::from(vec![0xA5u8; 400]);
    let mut packets = Vec::new();
    for i in 0..250i64 {
        let mut v = Packet::from_data(video.clone());
        v.stream_index = 0;
        v.pts = i;
        v.dts = i;
        v.set_keyframe(i % 25 == 0);
        packets.push(v);
        for j in 0..2 {
            let mut a = Packet::from_data(audio.clone());
            a.stream_index = 1;
            a.pts = (i * 2 + j) * 960;
            a.dts = a.pts;
            a.set_keyframe(true);
            packets.push(a);
        }
    }
    (streams, packets)
}

fn mux_to_memory(streams: &[Stream], packets: Vec<Packet>) -> Vec<u8> {
    let registry = yun::default_format_registry();
    let backend = MemoryBackend::new();
    let handle = backend.handle();
    let sink = PendingSink::open(
        &registry,
        IoContext::new(Box::new(backend)),
        &FormatHint::named("mpegts"),
        streams,
    )
    .unwrap();
    let mut source = packet_list(streams.to_vec(), packets);
    remux(&mut source, sink, None, &RemuxOptions::default(), &NeverAbort).unwrap();
    handle.contents()
}

fn bench_ts_mux(c: &mut Criterion) {
    c.bench_function("ts_mux_10s_750_packets", |b| {
        let (streams, packets) = make_packets();
        b.iter(|| {
            let bytes = mux_to_memory(&streams, packets.clone());
            black_box(bytes.len());
        });
    });
}

fn bench_ts_scan(c: &mut Criterion) {
    c.bench_function("ts_scan_10s", |b| {
        let (streams, packets) = make_packets();
        let bytes = mux_to_memory(&streams, packets);
        let registry = yun::default_format_registry();
        b.iter(|| {
            let io = IoContext::new(Box::new(MemoryBackend::from_data(bytes.clone())));
            let mut source = DemuxSource::open(&registry, io, &FormatHint::default()).unwrap();
            let report = scan(&mut source, 64, &NeverAbort).unwrap();
            black_box(report.packets);
        });
    });
}

fn bench_remap(c: &mut Criterion) {
    c.bench_function("remap_48000_to_90000", |b| {
        let (_, packets) = make_packets();
        let from = Rational::new(1, 48000);
        b.iter(|| {
            for p in &packets {
                let out = remap(p.clone(), from, Rational::CLOCK_90K, black_box(1024));
                black_box(out.pts);
            }
        });
    });
}

criterion_group!(benches, bench_ts_mux, bench_ts_scan, bench_remap);
criterion_main!(benches);
