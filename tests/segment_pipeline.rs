//! 分段集成测试.
//!
//! 音视频来源按时长切分为多个 MPEG-TS 文件, 验证切分点与连续性计数器的跨段衔接.

use std::collections::BTreeMap;
use std::path::Path;

use yun::codec::{CodecId, Packet};
use yun::core::Rational;
use yun::format::ts::{PID_PAT, TS_PACKET_SIZE, TsHeader};
use yun::format::{FormatHint, IoContext, Stream};
use yun::remux::{
    DemuxSource, NeverAbort, PacketSource, SegmentOptions, packet_list, segment_to_files,
};

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 4 秒音视频: 视频 1/30 每秒一个关键帧, 音频 1/48000 每包 1024 个采样
fn av_source() -> impl PacketSource {
    let streams = vec![
        Stream::new(0, CodecId::H264, Rational::new(1, 30)),
        Stream::new(1, CodecId::Aac, Rational::new(1, 48000)),
    ];
    let mut packets = Vec::new();
    let mut audio_pts = 0i64;
    for frame in 0..120i64 {
        let mut v = Packet::from_data(vec![0x10; 300]);
        v.stream_index = 0;
        v.pts = frame;
        v.dts = frame;
        v.set_keyframe(frame % 30 == 0);
        packets.push(v);

        // 音频追上视频的时间位置
        while audio_pts * 30 < (frame + 1) * 48000 {
            let mut a = Packet::from_data(vec![0x20; 120]);
            a.stream_index = 1;
            a.pts = audio_pts;
            a.dts = audio_pts;
            a.set_keyframe(true);
            packets.push(a);
            audio_pts += 1024;
        }
    }
    packet_list(streams, packets)
}

/// 每个 PID 的 (第一个, 最后一个) 计数器
fn cc_bounds(path: &Path) -> BTreeMap<u16, (u8, u8)> {
    let bytes = std::fs::read(path).unwrap();
    let mut bounds = BTreeMap::new();
    for chunk in bytes.chunks_exact(TS_PACKET_SIZE) {
        let h = TsHeader::parse(chunk.try_into().unwrap());
        if !h.has_payload() {
            continue;
        }
        bounds
            .entry(h.pid)
            .and_modify(|b: &mut (u8, u8)| b.1 = h.cc)
            .or_insert((h.cc, h.cc));
    }
    bounds
}

#[test]
fn test_分段_按秒切分音视频() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("seg-%03d.ts");
    let mut source = av_source();
    let options = SegmentOptions {
        duration: 1.0,
        ..Default::default()
    };
    let report = segment_to_files(
        &mut source,
        &yun::default_format_registry(),
        None,
        template.to_str().unwrap(),
        &options,
        &NeverAbort,
    )
    .unwrap();

    assert_eq!(report.ref_stream, 0);
    assert_eq!(report.interval, 90000);
    assert_eq!(report.segments.len(), 4);
    let starts: Vec<Option<i64>> = report.segments.iter().map(|s| s.start_pts).collect();
    assert_eq!(starts, vec![Some(0), Some(90000), Some(180000), Some(270000)]);
    let total: u64 = report.segments.iter().map(|s| s.packets).sum();
    assert_eq!(total, report.packets_read);
    assert!(report.counters.is_some());

    for i in 0..4 {
        assert!(dir.path().join(format!("seg-{i:03}.ts")).exists());
    }

    // 第二段的第一个视频包是 1 秒处的关键帧
    let registry = yun::default_format_registry();
    let io = IoContext::open_read(dir.path().join("seg-001.ts")).unwrap();
    let mut seg = DemuxSource::open(&registry, io, &FormatHint::default()).unwrap();
    let first_video = loop {
        let p = seg.next_packet().unwrap().unwrap();
        if p.stream_index == 0 {
            break p;
        }
    };
    assert_eq!(first_video.pts, 90000);
    assert!(first_video.is_keyframe());
}

#[test]
fn test_分段_计数器跨段衔接() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("part%d.ts");
    let mut source = av_source();
    let mut options = SegmentOptions {
        duration: 1.0,
        ..Default::default()
    };
    options.mux_options.set("psi_period", "7");
    let report = segment_to_files(
        &mut source,
        &yun::default_format_registry(),
        Some("mpegts"),
        template.to_str().unwrap(),
        &options,
        &NeverAbort,
    )
    .unwrap();
    assert_eq!(report.segments.len(), 4);

    let bounds: Vec<_> = (0..4)
        .map(|i| cc_bounds(&dir.path().join(format!("part{i}.ts"))))
        .collect();
    for pair in bounds.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        assert!(next.contains_key(&PID_PAT));
        for (pid, &(first, _)) in next {
            let (_, last) = prev[pid];
            assert_eq!(first, (last + 1) & 0x0F, "pid {pid:#06x}");
        }
    }

    // 收尾导出的计数器就是最后一段中各 PID 的最后计数
    let last_segment = &bounds[3];
    let exported = report.counters.unwrap();
    for (pid, &(_, last)) in last_segment {
        assert_eq!(exported.get(*pid), Some(last));
    }
}

#[test]
fn test_分段_首次轮询即中止() {
    init_logger();
    let dir = tempfile::tempdir().unwrap();
    let template = dir.path().join("abort-%d.ts");
    let mut source = av_source();
    let err = segment_to_files(
        &mut source,
        &yun::default_format_registry(),
        None,
        template.to_str().unwrap(),
        &SegmentOptions::default(),
        &|| true,
    )
    .unwrap_err();
    assert!(err.is_aborted());

    // 第 0 段已打开但没有数据包, 也没有写尾部
    let first = dir.path().join("abort-0.ts");
    assert_eq!(std::fs::metadata(first).unwrap().len(), 0);
    assert!(!dir.path().join("abort-1.ts").exists());
}
