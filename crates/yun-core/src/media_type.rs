//! 媒体类型定义.

use std::fmt;

use serde::{Deserialize, Serialize};

/// 媒体流类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// 视频流
    Video,
    /// 音频流
    Audio,
    /// 其他 (数据、字幕等, 只透传)
    Other,
}

impl MediaType {
    /// 原始记录头中使用的类型名
    pub fn tag(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Video => "视频",
            Self::Audio => "音频",
            Self::Other => "其他",
        };
        write!(f, "{name}")
    }
}
