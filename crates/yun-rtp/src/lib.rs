//! # yun-rtp
//!
//! 从 RTP 归档 (Janus 的 MJR 录制文件, pcap 抓包文件) 中读出 VP8、Opus
//! 负载, 重组为数据包后作为 [`yun_remux::PacketSource`] 交给转封装流水线.
//!
//! - [`archive`]: 归档格式, 按记录顺序交出原始 RTP 包
//! - [`RtpPackets`]: 依次读取多个分片, 按负载类型与 SSRC 过滤
//! - [`RtpSource`]: 去负载、重组帧、补全流参数
//! - [`split_archive`]: 按时长或包数把 RTP 包切成多个 MJR 归档

pub mod archive;
pub mod depacketize;
pub mod description;
pub mod infer;
pub mod opus;
pub mod packet;
pub mod payload;
pub mod reader;
pub mod source;
pub mod split;
pub mod vp8;

pub use archive::{ArchiveFormat, ArchiveReader, MjrReader, MjrWriter, PcapReader, open_archive};
pub use depacketize::{TimestampUnwrapper, Vp8Assembler, opus_packet};
pub use description::{ArchiveOrder, StreamDescription};
pub use packet::{RtpPacket, is_media_payload_type};
pub use payload::PayloadKind;
pub use reader::{ArchivePart, RtpFilter, RtpPackets};
pub use source::{ArchiveSet, RtpSource, RtpSourceOptions, StreamProfile};
pub use split::{SplitOptions, SplitPart, SplitReport, split_archive};
