//! 封装器实现模块.

pub mod mpegts;
pub mod yunraw;

use crate::format_id::FormatId;
use crate::registry::FormatRegistry;

/// 注册所有内置封装器
pub fn register_all_muxers(registry: &mut FormatRegistry) {
    registry.register_muxer(FormatId::MpegTs, "mpegts", mpegts::MpegTsMuxer::create);
    registry.register_muxer(FormatId::YunRaw, "yunraw", yunraw::YunRawMuxer::create);
}
