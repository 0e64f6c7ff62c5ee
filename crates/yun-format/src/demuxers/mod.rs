//! 解封装器实现模块.

pub mod mpegts;
pub mod yunraw;

use crate::format_id::FormatId;
use crate::registry::FormatRegistry;

/// 注册所有内置解封装器
pub fn register_all_demuxers(registry: &mut FormatRegistry) {
    registry.register_demuxer(FormatId::MpegTs, "mpegts", mpegts::TsDemuxer::create);
    registry.register_probe(Box::new(mpegts::TsProbe));

    registry.register_demuxer(FormatId::YunRaw, "yunraw", yunraw::YunRawDemuxer::create);
    registry.register_probe(Box::new(yunraw::YunRawProbe));
}
