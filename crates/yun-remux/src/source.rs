//! 数据包来源.
//!
//! 来源是一次性的惰性序列: `next_packet()` 返回 `Ok(None)` 表示结束.
//! 出错后来源即关闭, 之后的调用返回 `BadValue`.

use std::path::Path;

use log::{debug, error};
use yun_codec::Packet;
use yun_core::{YunError, YunResult};
use yun_format::{ContinuityStore, Demuxer, FormatHint, FormatId, FormatRegistry, IoContext, Stream};

/// 数据包来源
pub trait PacketSource {
    /// 来源中的流, 打开后即可用
    fn streams(&self) -> &[Stream];

    /// 取下一个数据包, `Ok(None)` 表示已结束
    fn next_packet(&mut self) -> YunResult<Option<Packet>>;

    /// 连续性计数器 (仅 MPEG-TS 来源提供)
    fn continuity(&self) -> Option<&dyn ContinuityStore> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceState {
    Open,
    Finished,
    Failed,
}

fn closed_error() -> YunError {
    YunError::BadValue("来源已关闭".into())
}

/// 由解封装器驱动的来源
pub struct DemuxSource {
    demuxer: Box<dyn Demuxer>,
    io: IoContext,
    state: SourceState,
    packets: u64,
}

impl DemuxSource {
    /// 打开输入, 按提示选择或探测格式
    pub fn open(registry: &FormatRegistry, mut io: IoContext, hint: &FormatHint) -> YunResult<Self> {
        let demuxer = registry.open_input(&mut io, hint)?;
        debug!(
            "打开输入: 格式 {}, {} 条流",
            demuxer.name(),
            demuxer.streams().len()
        );
        Ok(Self {
            demuxer,
            io,
            state: SourceState::Open,
            packets: 0,
        })
    }

    /// 打开输入文件, 文件名同时作为探测提示
    pub fn open_file(
        registry: &FormatRegistry,
        path: impl AsRef<Path>,
        format_name: Option<&str>,
    ) -> YunResult<Self> {
        let path = path.as_ref();
        let hint = FormatHint {
            name: format_name.map(str::to_string),
            filename: Some(path.to_string_lossy().into_owned()),
        };
        let io = IoContext::open_read(path)?;
        Self::open(registry, io, &hint)
    }

    /// 输入格式
    pub fn format_id(&self) -> FormatId {
        self.demuxer.format_id()
    }

    /// 已读出的数据包数
    pub fn packets_read(&self) -> u64 {
        self.packets
    }
}

impl PacketSource for DemuxSource {
    fn streams(&self) -> &[Stream] {
        self.demuxer.streams()
    }

    fn next_packet(&mut self) -> YunResult<Option<Packet>> {
        match self.state {
            SourceState::Open => {}
            SourceState::Finished => return Ok(None),
            SourceState::Failed => return Err(closed_error()),
        }
        match self.demuxer.read_packet(&mut self.io) {
            Ok(mut packet) => {
                if let Some(stream) = self.demuxer.streams().get(packet.stream_index) {
                    if !packet.time_base.is_valid() {
                        packet.time_base = stream.time_base;
                    }
                }
                self.packets += 1;
                Ok(Some(packet))
            }
            Err(YunError::Eof) => {
                debug!("输入结束, 共 {} 个数据包", self.packets);
                self.state = SourceState::Finished;
                Ok(None)
            }
            Err(e) => {
                error!("读取数据包失败: {e}");
                self.state = SourceState::Failed;
                Err(e)
            }
        }
    }

    fn continuity(&self) -> Option<&dyn ContinuityStore> {
        self.demuxer.continuity()
    }
}

/// 由回调驱动的来源
///
/// 调用方声明流描述, 并提供产生数据包的回调 (如实时编码器的输出).
pub struct FnSource<F> {
    streams: Vec<Stream>,
    next: F,
    state: SourceState,
}

impl<F> FnSource<F>
where
    F: FnMut() -> YunResult<Option<Packet>>,
{
    /// 创建回调来源
    pub fn new(streams: Vec<Stream>, next: F) -> Self {
        Self {
            streams,
            next,
            state: SourceState::Open,
        }
    }
}

impl<F> PacketSource for FnSource<F>
where
    F: FnMut() -> YunResult<Option<Packet>>,
{
    fn streams(&self) -> &[Stream] {
        &self.streams
    }

    fn next_packet(&mut self) -> YunResult<Option<Packet>> {
        match self.state {
            SourceState::Open => {}
            SourceState::Finished => return Ok(None),
            SourceState::Failed => return Err(closed_error()),
        }
        match (self.next)() {
            Ok(Some(mut packet)) => {
                let Some(stream) = self.streams.get(packet.stream_index) else {
                    self.state = SourceState::Failed;
                    return Err(YunError::StreamNotFound(packet.stream_index));
                };
                if !packet.time_base.is_valid() {
                    packet.time_base = stream.time_base;
                }
                Ok(Some(packet))
            }
            Ok(None) => {
                self.state = SourceState::Finished;
                Ok(None)
            }
            Err(e) => {
                self.state = SourceState::Failed;
                Err(e)
            }
        }
    }
}

/// 按顺序产出一组现成数据包的来源
pub fn packet_list(streams: Vec<Stream>, packets: Vec<Packet>) -> FnSource<impl FnMut() -> YunResult<Option<Packet>>> {
    let mut iter = packets.into_iter();
    FnSource::new(streams, move || Ok(iter.next()))
}
