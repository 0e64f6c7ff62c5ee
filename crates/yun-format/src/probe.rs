//! 格式探测.
//!
//! 通过文件头部字节和文件扩展名识别容器格式.

use crate::format_id::FormatId;

/// 探测置信度, 数值越高越可信
pub type ProbeScore = u32;

/// 仅根据扩展名
pub const SCORE_EXTENSION: ProbeScore = 50;

/// 魔数完全匹配
pub const SCORE_MAX: ProbeScore = 100;

/// 探测时预读的字节数
pub const PROBE_SIZE: usize = 4096;

/// 探测结果
#[derive(Debug, Clone)]
pub struct ProbeResult {
    /// 识别出的格式
    pub format_id: FormatId,
    /// 置信度分数
    pub score: ProbeScore,
}

/// 格式探测器 trait
pub trait FormatProbe {
    /// 根据头部数据 (及可选的文件名) 探测, `None` 表示不是此格式
    fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeScore>;

    /// 此探测器对应的格式
    fn format_id(&self) -> FormatId;
}

/// 扩展名匹配时的通用打分
pub(crate) fn score_extension(format_id: FormatId, filename: Option<&str>) -> Option<ProbeScore> {
    filename
        .and_then(FormatId::from_filename)
        .filter(|f| *f == format_id)
        .map(|_| SCORE_EXTENSION)
}
