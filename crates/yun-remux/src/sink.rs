//! 数据包输出 (Sink).
//!
//! 生命周期用类型状态表达:
//!
//! ```text
//! PendingSink ──write_header()──▶ ActiveSink ──finish()──▶ ClosedSink (已写尾部)
//!                                            └─detach()──▶ ClosedSink (仅 flush)
//! ```
//!
//! 每个方法都消耗 `self`, 所以"头部恰好一次""尾部恰好一次"由编译器保证.
//! 任何阶段被丢弃都会释放底层 I/O.

use std::path::Path;

use log::{debug, error, info};
use yun_codec::Packet;
use yun_core::{YunError, YunResult};
use yun_format::muxer::apply_options;
use yun_format::{
    ContinuityCounter, ContinuityStore, CounterSnapshot, FormatHint, FormatId, FormatRegistry,
    IoContext, MuxOptions, Muxer, Stream,
};

/// 把封装器层面的拒绝归为 `WriteFailed`, 传输层错误保持原样
fn write_failed(context: &str, err: YunError) -> YunError {
    match err {
        YunError::Io(_) | YunError::OutOfMemory(_) | YunError::Aborted => err,
        YunError::WriteFailed(_) => err,
        other => {
            error!("{context}: {other}");
            YunError::WriteFailed(format!("{context}: {other}"))
        }
    }
}

/// 已打开、尚未写头部的输出
pub struct PendingSink {
    muxer: Box<dyn Muxer>,
    io: IoContext,
    streams: Vec<Stream>,
}

impl PendingSink {
    /// 打开输出
    ///
    /// 为每个输入流分配一条输出流, 顺序与索引一一对应;
    /// 输出流的时间基由封装器决定.
    pub fn open(
        registry: &FormatRegistry,
        io: IoContext,
        hint: &FormatHint,
        streams: &[Stream],
    ) -> YunResult<Self> {
        let muxer = registry.create_muxer_for(hint)?;
        let streams = streams
            .iter()
            .enumerate()
            .map(|(index, stream)| {
                let mut out = stream.clone();
                out.index = index;
                out.time_base = muxer.stream_time_base(stream);
                out
            })
            .collect();
        Ok(Self {
            muxer,
            io,
            streams,
        })
    }

    /// 创建并打开输出文件, 文件名同时用于推断格式
    pub fn create_file(
        registry: &FormatRegistry,
        path: impl AsRef<Path>,
        format_name: Option<&str>,
        streams: &[Stream],
    ) -> YunResult<Self> {
        let path = path.as_ref();
        let hint = FormatHint {
            name: format_name.map(str::to_string),
            filename: Some(path.to_string_lossy().into_owned()),
        };
        // 先确定格式, 避免格式错误时留下空文件
        registry.create_muxer_for(&hint)?;
        let io = IoContext::open_write(path)?;
        Self::open(registry, io, &hint, streams)
    }

    /// 输出流 (携带实际使用的时间基)
    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    /// 输出格式
    pub fn format_id(&self) -> FormatId {
        self.muxer.format_id()
    }

    /// 应用选项并写入头部
    pub fn write_header(mut self, options: &MuxOptions) -> YunResult<ActiveSink> {
        apply_options(self.muxer.as_mut(), options)?;
        self.muxer
            .write_header(&mut self.io, &self.streams)
            .map_err(|e| write_failed("写入头部失败", e))?;
        debug!(
            "{} 输出已写入头部, {} 条流",
            self.muxer.name(),
            self.streams.len()
        );
        Ok(ActiveSink {
            muxer: self.muxer,
            io: self.io,
            streams: self.streams,
            written: 0,
        })
    }
}

/// 已写头部、可以写数据包的输出
pub struct ActiveSink {
    muxer: Box<dyn Muxer>,
    io: IoContext,
    streams: Vec<Stream>,
    written: u64,
}

impl ActiveSink {
    /// 输出流
    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    /// 输出格式
    pub fn format_id(&self) -> FormatId {
        self.muxer.format_id()
    }

    /// 已写出的数据包数
    pub fn packets_written(&self) -> u64 {
        self.written
    }

    /// 写入一个数据包, 时间戳须已换算到对应输出流的时间基
    pub fn write_packet(&mut self, packet: &Packet) -> YunResult<()> {
        if packet.stream_index >= self.streams.len() {
            return Err(write_failed(
                "写入数据包失败",
                YunError::StreamNotFound(packet.stream_index),
            ));
        }
        self.muxer
            .write_packet(&mut self.io, packet)
            .map_err(|e| write_failed("写入数据包失败", e))?;
        self.written += 1;
        Ok(())
    }

    /// 注入连续性计数器, 没有连续性状态的格式直接忽略
    ///
    /// 须在第一个数据包之前调用. 返回实际生效的条数.
    pub fn inject_continuity(&mut self, counters: &[ContinuityCounter]) -> YunResult<usize> {
        if counters.is_empty() {
            return Ok(0);
        }
        match self.muxer.continuity_mut() {
            Some(store) => {
                let applied = store.inject(counters)?;
                info!("注入 {applied}/{} 个连续性计数器", counters.len());
                Ok(applied)
            }
            None => {
                debug!("{} 没有连续性计数器, 跳过注入", self.muxer.name());
                Ok(0)
            }
        }
    }

    /// 当前连续性计数器
    pub fn continuity(&self) -> Option<&dyn ContinuityStore> {
        self.muxer.continuity()
    }

    /// 推出缓冲数据而不收尾
    pub fn flush(&mut self) -> YunResult<()> {
        self.muxer.flush(&mut self.io)
    }

    /// 写入尾部并关闭
    pub fn finish(mut self) -> YunResult<ClosedSink> {
        self.muxer
            .write_trailer(&mut self.io)
            .map_err(|e| write_failed("写入尾部失败", e))?;
        debug!("{} 输出已收尾, {} 个数据包", self.muxer.name(), self.written);
        Ok(self.close())
    }

    /// 推出缓冲数据后关闭, 不写尾部 (分段切换时使用)
    pub fn detach(mut self) -> YunResult<ClosedSink> {
        self.flush()?;
        Ok(self.close())
    }

    fn close(self) -> ClosedSink {
        // 丢弃 I/O 即关闭底层文件
        drop(self.io);
        ClosedSink {
            muxer: self.muxer,
            written: self.written,
        }
    }
}

/// 已关闭的输出, 仅保留统计与连续性计数器
pub struct ClosedSink {
    muxer: Box<dyn Muxer>,
    written: u64,
}

impl ClosedSink {
    /// 写出的数据包数
    pub fn packets_written(&self) -> u64 {
        self.written
    }

    /// 关闭时的连续性计数器
    pub fn continuity(&self) -> Option<&dyn ContinuityStore> {
        self.muxer.continuity()
    }

    /// 导出最多 `max` 条计数器
    pub fn extract_continuity(&self, max: usize) -> Option<CounterSnapshot> {
        self.continuity().map(|store| store.extract(max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yun_codec::CodecId;
    use yun_core::Rational;
    use yun_format::io::MemoryBackend;

    fn registry() -> FormatRegistry {
        let mut r = FormatRegistry::new();
        yun_format::register_all(&mut r);
        r
    }

    fn memory_io() -> (IoContext, yun_format::io::MemoryHandle) {
        let backend = MemoryBackend::new();
        let handle = backend.handle();
        (IoContext::new(Box::new(backend)), handle)
    }

    #[test]
    fn test_输出流时间基由封装器决定() {
        let (io, _) = memory_io();
        let streams = [Stream::new(0, CodecId::H264, Rational::new(1, 30))];
        let sink = PendingSink::open(&registry(), io, &FormatHint::named("mpegts"), &streams).unwrap();
        assert_eq!(sink.streams()[0].time_base, Rational::CLOCK_90K);
        assert_eq!(sink.format_id(), FormatId::MpegTs);
    }

    #[test]
    fn test_不支持的编解码器归为写入失败() {
        let (io, _) = memory_io();
        let streams = [Stream::new(0, CodecId::Vp8, Rational::new(1, 30))];
        let sink = PendingSink::open(&registry(), io, &FormatHint::named("mpegts"), &streams).unwrap();
        let err = sink.write_header(&MuxOptions::new()).err().unwrap();
        assert!(matches!(err, YunError::WriteFailed(_)));
    }

    #[test]
    fn test_越界流索引归为写入失败() {
        let (io, _) = memory_io();
        let streams = [Stream::new(0, CodecId::Aac, Rational::new(1, 48000))];
        let sink = PendingSink::open(&registry(), io, &FormatHint::named("mpegts"), &streams).unwrap();
        let mut active = sink.write_header(&MuxOptions::new()).unwrap();
        let mut pkt = Packet::from_data(vec![0; 8]);
        pkt.stream_index = 3;
        assert!(matches!(active.write_packet(&pkt), Err(YunError::WriteFailed(_))));
    }

    #[test]
    fn test_非法选项值() {
        let (io, _) = memory_io();
        let streams = [Stream::new(0, CodecId::Aac, Rational::new(1, 48000))];
        let sink = PendingSink::open(&registry(), io, &FormatHint::named("mpegts"), &streams).unwrap();
        let options: MuxOptions = [("service_id", "x")].into_iter().collect();
        assert!(matches!(sink.write_header(&options), Err(YunError::BadValue(_))));
    }

    #[test]
    fn test_收尾与分离() {
        let streams = [Stream::new(0, CodecId::Aac, Rational::new(1, 48000))];
        let (io, handle) = memory_io();
        let sink = PendingSink::open(&registry(), io, &FormatHint::named("mpegts"), &streams).unwrap();
        let mut active = sink.write_header(&MuxOptions::new()).unwrap();
        assert_eq!(
            active.inject_continuity(&[ContinuityCounter::new(0x0100, 7)]).unwrap(),
            1
        );
        let mut pkt = Packet::from_data(vec![0; 8]);
        pkt.pts = 0;
        active.write_packet(&pkt).unwrap();
        let closed = active.detach().unwrap();
        assert_eq!(closed.packets_written(), 1);
        let snap = closed.extract_continuity(16).unwrap();
        assert_eq!(snap.get(0x0100), Some(8));
        assert_eq!(handle.len(), 4 * 188);
    }
}
