//! # yun-codec
//!
//! 数据包 (Packet) 与编解码器标识.
//!
//! 本框架从不解码: 负载字节原样穿过整条流水线, 编解码器只作为
//! 不透明的标识在容器之间传递.

pub mod codec_id;
pub mod packet;

// 重导出常用类型
pub use codec_id::CodecId;
pub use packet::{Packet, PacketFlags};
