//! 把一路 RTP 包切成多个 MJR 归档.
//!
//! 某段的包数达到上限, 或当前包距本段第一个包的时长达到上限时, 从当前包开始新的一段.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use yun_core::{YunError, YunResult};
use yun_format::IoContext;
use yun_remux::{AbortSignal, SegmentTemplate};

use crate::archive::MjrWriter;
use crate::depacketize::TimestampUnwrapper;
use crate::payload::PayloadKind;
use crate::reader::RtpPackets;

/// 每段的上限, 都不设置时只输出一段
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitOptions {
    /// 时长上限 (秒)
    pub duration: Option<f64>,
    /// 包数上限
    pub count: Option<u64>,
}

/// 一个输出分片
#[derive(Debug, Clone, Default, Serialize)]
pub struct SplitPart {
    pub file_name: String,
    pub packets: u64,
}

/// 切分结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct SplitReport {
    pub parts: Vec<SplitPart>,
    pub packets: u64,
}

struct OpenPart {
    writer: MjrWriter,
    info: SplitPart,
    epoch: i64,
}

/// 切分 `packets`, 第 n 段 (从 1 开始) 的名字由 `template` 展开, 由 `opener` 打开输出
pub fn split_archive<O>(
    packets: &mut RtpPackets,
    kind: PayloadKind,
    template: &SegmentTemplate,
    mut opener: O,
    options: &SplitOptions,
    abort: &dyn AbortSignal,
) -> YunResult<SplitReport>
where
    O: FnMut(&str) -> YunResult<IoContext>,
{
    if options.duration.is_some_and(|d| !d.is_finite() || d <= 0.0) {
        return Err(YunError::BadValue("切分时长必须为正".into()));
    }
    if options.count == Some(0) {
        return Err(YunError::BadValue("切分包数必须为正".into()));
    }
    let clock = f64::from(kind.clock_rate());
    let mut unwrapper = TimestampUnwrapper::default();
    let mut report = SplitReport::default();
    let mut current: Option<OpenPart> = None;

    loop {
        abort.check().inspect_err(|_| info!("切分已中止"))?;
        let Some(rtp) = packets.next_packet()? else {
            break;
        };
        let ts = unwrapper.unwrap(rtp.timestamp);

        let start_new = current.as_ref().is_none_or(|part| {
            options.count.is_some_and(|c| part.info.packets >= c)
                || options.duration.is_some_and(|d| (ts - part.epoch) as f64 / clock >= d)
        });
        if start_new {
            if let Some(done) = current.take() {
                close_part(done, &mut report)?;
            }
            let number = u32::try_from(report.parts.len() + 1)
                .map_err(|_| YunError::BadValue("分片数超出范围".into()))?;
            let file_name = template.expand(number)?;
            debug!("开始分片 {file_name}");
            let writer = MjrWriter::create(opener(&file_name)?, kind.media_type())?;
            current = Some(OpenPart {
                writer,
                info: SplitPart {
                    file_name,
                    packets: 0,
                },
                epoch: ts,
            });
        }
        if let Some(part) = current.as_mut() {
            part.writer.write_record(&rtp.to_bytes())?;
            part.info.packets += 1;
            report.packets += 1;
        }
    }
    if let Some(done) = current.take() {
        close_part(done, &mut report)?;
    }
    info!("切分完成: {} 个包, {} 个分片", report.packets, report.parts.len());
    Ok(report)
}

fn close_part(part: OpenPart, report: &mut SplitReport) -> YunResult<()> {
    part.writer.finish()?;
    debug!("分片 {} 写入 {} 个包", part.info.file_name, part.info.packets);
    report.parts.push(part.info);
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    use super::*;
    use crate::archive::{ArchiveReader, MjrReader};
    use crate::packet::RtpPacket;
    use crate::reader::RtpFilter;
    use crate::reader::tests::mjr_part;
    use yun_core::MediaType;
    use yun_format::io::{MemoryBackend, MemoryHandle};
    use yun_remux::NeverAbort;

    type Outputs = Rc<RefCell<BTreeMap<String, MemoryHandle>>>;

    /// 20 ms 一个 Opus 包
    fn audio(packets: u32) -> RtpPackets {
        let list: Vec<_> = (0..packets)
            .map(|i| RtpPacket::new(111, i as u16, i * 960, 5, vec![0xFC, 0x00]))
            .collect();
        RtpPackets::new(vec![mjr_part("a.mjr", MediaType::Audio, &list)], RtpFilter::default())
    }

    fn memory_opener(outputs: &Outputs) -> impl FnMut(&str) -> YunResult<IoContext> + use<> {
        let outputs = Rc::clone(outputs);
        move |name| {
            let backend = MemoryBackend::new();
            outputs.borrow_mut().insert(name.to_string(), backend.handle());
            Ok(IoContext::new(Box::new(backend)))
        }
    }

    fn count_records(handle: &MemoryHandle) -> usize {
        let io = IoContext::new(Box::new(MemoryBackend::from_data(handle.contents())));
        let mut reader = MjrReader::open(io).unwrap();
        std::iter::from_fn(|| reader.next_record().unwrap()).count()
    }

    #[test]
    fn test_按包数切分() {
        let outputs = Outputs::default();
        let template = SegmentTemplate::parse("part-%02d.mjr").unwrap();
        let options = SplitOptions { count: Some(4), ..Default::default() };
        let report = split_archive(&mut audio(10), PayloadKind::Opus, &template, memory_opener(&outputs), &options, &NeverAbort)
            .unwrap();
        assert_eq!(report.packets, 10);
        let counts: Vec<u64> = report.parts.iter().map(|p| p.packets).collect();
        assert_eq!(counts, vec![4, 4, 2]);
        assert_eq!(report.parts[0].file_name, "part-01.mjr");
        let outputs = outputs.borrow();
        assert_eq!(count_records(&outputs["part-03.mjr"]), 2);
    }

    #[test]
    fn test_按时长切分() {
        let outputs = Outputs::default();
        let template = SegmentTemplate::parse("t%d.mjr").unwrap();
        let options = SplitOptions { duration: Some(0.1), ..Default::default() };
        let report = split_archive(&mut audio(12), PayloadKind::Opus, &template, memory_opener(&outputs), &options, &NeverAbort)
            .unwrap();
        // 100 ms = 5 个包
        let counts: Vec<u64> = report.parts.iter().map(|p| p.packets).collect();
        assert_eq!(counts, vec![5, 5, 2]);
        assert_eq!(outputs.borrow().len(), 3);
    }

    #[test]
    fn test_切分参数与中止() {
        let outputs = Outputs::default();
        let template = SegmentTemplate::parse("x%d.mjr").unwrap();
        let zero = SplitOptions { count: Some(0), ..Default::default() };
        assert!(split_archive(&mut audio(1), PayloadKind::Opus, &template, memory_opener(&outputs), &zero, &NeverAbort).is_err());
        let negative = SplitOptions { duration: Some(-1.0), ..Default::default() };
        assert!(split_archive(&mut audio(1), PayloadKind::Opus, &template, memory_opener(&outputs), &negative, &NeverAbort).is_err());

        let err = split_archive(&mut audio(3), PayloadKind::Opus, &template, memory_opener(&outputs), &SplitOptions::default(), &|| true)
            .unwrap_err();
        assert!(err.is_aborted());
        assert!(outputs.borrow().is_empty());

        let report = split_archive(&mut audio(3), PayloadKind::Opus, &template, memory_opener(&outputs), &SplitOptions::default(), &NeverAbort)
            .unwrap();
        assert_eq!(report.parts.len(), 1);
    }
}
