//! 容器格式标识符.

use std::fmt;

/// 容器格式标识符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum FormatId {
    /// MPEG Transport Stream
    MpegTs,
    /// 原始基本流记录 (每个文件一条流)
    YunRaw,
}

impl FormatId {
    /// 所有内置格式
    pub const ALL: &'static [FormatId] = &[FormatId::MpegTs, FormatId::YunRaw];

    /// 格式短名称, 即调用方传入的格式名
    pub const fn name(&self) -> &'static str {
        match self {
            Self::MpegTs => "mpegts",
            Self::YunRaw => "yunraw",
        }
    }

    /// 常见文件扩展名
    pub const fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::MpegTs => &["ts", "m2ts", "mts"],
            Self::YunRaw => &["yraw"],
        }
    }

    /// 是否携带连续性计数器状态
    pub const fn has_continuity(&self) -> bool {
        matches!(self, Self::MpegTs)
    }

    /// 按短名称查找
    pub fn from_name(name: &str) -> Option<FormatId> {
        Self::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// 按扩展名查找 (不区分大小写)
    pub fn from_extension(ext: &str) -> Option<FormatId> {
        let ext = ext.to_ascii_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.extensions().contains(&ext.as_str()))
    }

    /// 按文件名的扩展名查找
    pub fn from_filename(filename: &str) -> Option<FormatId> {
        let (_, ext) = filename.rsplit_once('.')?;
        Self::from_extension(ext)
    }
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
