//! # yun-format
//!
//! 容器格式库: I/O 抽象、流描述、封装器/解封装器接口、连续性计数器存储,
//! 以及内置的 MPEG-TS 与 yunraw 两种封装.

pub mod continuity;
pub mod demuxer;
pub mod demuxers;
pub mod format_id;
pub mod io;
pub mod muxer;
pub mod muxers;
pub mod options;
pub mod probe;
pub mod raw;
pub mod registry;
pub mod stream;
pub mod ts;

// 重导出常用类型
pub use continuity::{ContinuityCounter, ContinuityStore, CounterSnapshot};
pub use demuxer::Demuxer;
pub use format_id::FormatId;
pub use io::{IoContext, Whence};
pub use muxer::Muxer;
pub use options::MuxOptions;
pub use probe::ProbeResult;
pub use registry::{FormatHint, FormatRegistry};
pub use stream::Stream;

/// 注册所有内置容器格式
pub fn register_all(registry: &mut FormatRegistry) {
    demuxers::register_all_demuxers(registry);
    muxers::register_all_muxers(registry);
}
