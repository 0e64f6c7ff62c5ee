//! # yun-remux
//!
//! 不解码的转封装流水线.
//!
//! - [`remux`]: 来源 → 过滤器 → 时间戳重映射 → 输出, 单次完成
//! - [`segment`]: 在参考流的关键帧处把输入切成多个文件, 连续性计数器跨段衔接
//! - [`mux`]: 视频、音频两路实时交织写入同一个输出
//! - [`scan`] / [`stat`]: 读取输入的计数器与流信息
//!
//! 所有操作都是同步的, 每处理一个数据包前轮询一次 [`AbortSignal`].

pub mod abort;
pub mod filter;
pub mod interleave;
pub mod mux;
pub mod remap;
pub mod remux;
pub mod scan;
pub mod segment;
pub mod sink;
pub mod source;
pub mod template;

pub use abort::{AbortSignal, NeverAbort};
pub use filter::{FilterAction, FrameRange, MonotonicFilter, PacketFilter};
pub use interleave::{Interleaver, Lane};
pub use mux::{MuxFlags, MuxInput, MuxStats, mux, mux_streams};
pub use remap::remap;
pub use remux::{DEFAULT_MAX_COUNTERS, RemuxOptions, RemuxStats, remux};
pub use scan::{ScanReport, StatReport, StreamInfo, StreamScan, scan, stat};
pub use segment::{SegmentInfo, SegmentOptions, SegmentReport, segment, segment_to_files};
pub use sink::{ActiveSink, ClosedSink, PendingSink};
pub use source::{DemuxSource, FnSource, PacketSource, packet_list};
pub use template::SegmentTemplate;
