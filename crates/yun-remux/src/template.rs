//! 分段文件名模板.
//!
//! 模板中恰好有一个整数占位符 `%d` 或 `%0Nd` (`%Nd` 以空格补齐),
//! `%%` 表示字面的百分号. 展开结果达到 `模板长度 + 32` 字节时报错, 不截断.

use std::fmt;
use std::str::FromStr;

use yun_core::{YunError, YunResult};

/// 展开缓冲区相对模板多出的字节数, 含结尾的 NUL
const MAX_EXPANSION: usize = 32;

/// 解析后的文件名模板
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentTemplate {
    source: String,
    prefix: String,
    suffix: String,
    width: usize,
    zero_pad: bool,
}

impl SegmentTemplate {
    /// 解析模板
    pub fn parse(template: &str) -> YunResult<Self> {
        let bad = |why: &str| YunError::BadValue(format!("文件名模板 {template:?} {why}"));

        let mut prefix = String::new();
        let mut suffix = String::new();
        let mut conv: Option<(usize, bool)> = None;
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            let out = if conv.is_some() { &mut suffix } else { &mut prefix };
            if c != '%' {
                out.push(c);
                continue;
            }
            if chars.peek() == Some(&'%') {
                chars.next();
                out.push('%');
                continue;
            }
            let mut digits = String::new();
            while let Some(&d) = chars.peek() {
                if !d.is_ascii_digit() {
                    break;
                }
                digits.push(d);
                chars.next();
            }
            if chars.next() != Some('d') {
                return Err(bad("含有不支持的占位符"));
            }
            if conv.is_some() {
                return Err(bad("含有多个占位符"));
            }
            let zero_pad = digits.starts_with('0');
            let width = if digits.is_empty() {
                0
            } else {
                digits.parse().map_err(|_| bad("的宽度无效"))?
            };
            if width > template.len() + MAX_EXPANSION {
                return Err(bad("的宽度过大"));
            }
            conv = Some((width, zero_pad));
        }

        let (width, zero_pad) = conv.ok_or_else(|| bad("缺少整数占位符"))?;
        Ok(Self {
            source: template.to_string(),
            prefix,
            suffix,
            width,
            zero_pad,
        })
    }

    /// 用分段序号展开
    pub fn expand(&self, number: u32) -> YunResult<String> {
        let width = self.width;
        let number = if self.zero_pad {
            format!("{number:0width$}")
        } else {
            format!("{number:width$}")
        };
        let name = format!("{}{number}{}", self.prefix, self.suffix);
        if name.len() >= self.source.len() + MAX_EXPANSION {
            return Err(YunError::BadValue(format!(
                "文件名模板 {:?} 展开后过长 ({} 字节)",
                self.source,
                name.len()
            )));
        }
        Ok(name)
    }

    /// 原始模板字符串
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for SegmentTemplate {
    type Err = YunError;

    fn from_str(s: &str) -> YunResult<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SegmentTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
