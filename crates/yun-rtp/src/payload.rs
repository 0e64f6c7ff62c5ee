//! 归档中的负载种类.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use yun_codec::CodecId;
use yun_core::{MediaType, Rational, YunError, YunResult};

/// RTP 负载种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    /// VP8 视频 (RFC 7741)
    Vp8,
    /// Opus 音频 (RFC 7587)
    Opus,
}

impl PayloadKind {
    /// RTP 时钟频率
    pub const fn clock_rate(self) -> i32 {
        match self {
            Self::Vp8 => 90_000,
            Self::Opus => 48_000,
        }
    }

    /// 时间基: 1/时钟频率
    pub const fn time_base(self) -> Rational {
        Rational::new(1, self.clock_rate())
    }

    pub const fn codec_id(self) -> CodecId {
        match self {
            Self::Vp8 => CodecId::Vp8,
            Self::Opus => CodecId::Opus,
        }
    }

    pub const fn media_type(self) -> MediaType {
        match self {
            Self::Vp8 => MediaType::Video,
            Self::Opus => MediaType::Audio,
        }
    }

    /// 缺省的编码器名称
    pub const fn encoder_name(self) -> &'static str {
        match self {
            Self::Vp8 => "libvpx",
            Self::Opus => "libopus",
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Vp8 => "vp8",
            Self::Opus => "opus",
        }
    }
}

impl FromStr for PayloadKind {
    type Err = YunError;

    fn from_str(s: &str) -> YunResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vp8" => Ok(Self::Vp8),
            "opus" => Ok(Self::Opus),
            other => Err(YunError::BadValue(format!("未知的负载种类 \"{other}\""))),
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_负载种类() {
        assert_eq!("VP8".parse::<PayloadKind>().unwrap(), PayloadKind::Vp8);
        assert_eq!(" opus".parse::<PayloadKind>().unwrap(), PayloadKind::Opus);
        assert!("h264".parse::<PayloadKind>().is_err());
        assert_eq!(PayloadKind::Opus.time_base(), Rational::new(1, 48000));
        assert_eq!(PayloadKind::Vp8.media_type(), MediaType::Video);
        assert_eq!(CodecId::from_encoder_name(PayloadKind::Vp8.encoder_name()), CodecId::Vp8);
    }
}
