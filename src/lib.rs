//! # Yun (运)
//!
//! 纯 Rust 实现的不解码转封装框架.
//!
//! 数据包的负载原样搬运, 只改写时间戳、容器结构和 MPEG-TS 连续性计数器:
//! - **转封装**: 单个输入到单个输出, 支持过滤与时间戳偏移
//! - **分段**: 在参考流的关键帧处按时长切分, 计数器跨段衔接
//! - **交织封装**: 视频、音频两路实时输入按时间交织写入同一输出
//! - **RTP 归档**: 录制的 VP8/Opus RTP 包重组后作为上述操作的输入
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use yun::remux::{DemuxSource, NeverAbort, PacketSource, PendingSink, RemuxOptions, remux};
//!
//! let registry = yun::default_format_registry();
//! let mut source = DemuxSource::open_file(&registry, "in.ts", None)?;
//! let sink = PendingSink::create_file(&registry, "out.ts", None, source.streams())?;
//! let stats = remux(&mut source, sink, None, &RemuxOptions::default(), &NeverAbort)?;
//! println!("写出 {} 个数据包", stats.packets_written);
//! # Ok::<(), yun::core::YunError>(())
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `yun-core` | 错误、有理数、时间戳换算 |
//! | `yun-codec` | 数据包与编解码器标识 |
//! | `yun-format` | I/O、封装器/解封装器、连续性计数器 |
//! | `yun-remux` | 转封装、分段、交织封装流水线 |
//! | `yun-rtp` | MJR/pcap 归档中的 VP8、Opus 流作为数据包来源 |

/// 核心类型与工具
pub use yun_core as core;

/// 数据包与编解码器标识
pub use yun_codec as codec;

/// 容器格式框架
pub use yun_format as format;

/// 转封装流水线
pub use yun_remux as remux;

/// RTP 归档读取
pub use yun_rtp as rtp;

/// 获取 Yun 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// 创建已注册所有内置容器格式的注册表
pub fn default_format_registry() -> yun_format::FormatRegistry {
    let mut registry = yun_format::FormatRegistry::new();
    yun_format::register_all(&mut registry);
    registry
}
