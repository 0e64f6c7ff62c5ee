//! 编解码器标识符.
//!
//! 框架不解码任何数据, 这里的标识只用于在容器之间传递流的身份
//! (例如 MPEG-TS 的 stream_type) 以及原始记录头中的编码器名.

use std::fmt;

use serde::{Deserialize, Serialize};
use yun_core::MediaType;

/// 编解码器标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum CodecId {
    /// 未知编解码器
    None,

    // 视频
    /// H.264 / AVC
    H264,
    /// H.265 / HEVC
    H265,
    /// VP8
    Vp8,
    /// VP9
    Vp9,
    /// MPEG-2 Video
    Mpeg2Video,
    /// MPEG-4 Part 2
    Mpeg4,

    // 音频
    /// AAC
    Aac,
    /// MP3
    Mp3,
    /// MP2
    Mp2,
    /// Opus
    Opus,
    /// AC-3
    Ac3,
}

impl CodecId {
    /// 获取编解码器对应的媒体类型
    pub const fn media_type(&self) -> MediaType {
        match self {
            Self::H264 | Self::H265 | Self::Vp8 | Self::Vp9 | Self::Mpeg2Video | Self::Mpeg4 => {
                MediaType::Video
            }
            Self::Aac | Self::Mp3 | Self::Mp2 | Self::Opus | Self::Ac3 => MediaType::Audio,
            Self::None => MediaType::Other,
        }
    }

    /// 获取编解码器短名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::H264 => "h264",
            Self::H265 => "hevc",
            Self::Vp8 => "vp8",
            Self::Vp9 => "vp9",
            Self::Mpeg2Video => "mpeg2video",
            Self::Mpeg4 => "mpeg4",
            Self::Aac => "aac",
            Self::Mp3 => "mp3",
            Self::Mp2 => "mp2",
            Self::Opus => "opus",
            Self::Ac3 => "ac3",
        }
    }

    /// 由编码器名推断编解码器
    ///
    /// 接受短名称本身, 以及常见的编码器实现名 (如 `libx264`, `libvpx`).
    /// 无法识别时返回 `CodecId::None`.
    pub fn from_encoder_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "h264" | "libx264" | "libopenh264" | "h264_nvenc" => Self::H264,
            "hevc" | "h265" | "libx265" => Self::H265,
            "vp8" | "libvpx" => Self::Vp8,
            "vp9" | "libvpx-vp9" => Self::Vp9,
            "mpeg2video" => Self::Mpeg2Video,
            "mpeg4" | "libxvid" => Self::Mpeg4,
            "aac" | "libfdk_aac" => Self::Aac,
            "mp3" | "libmp3lame" => Self::Mp3,
            "mp2" => Self::Mp2,
            "opus" | "libopus" => Self::Opus,
            "ac3" => Self::Ac3,
            _ => Self::None,
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
