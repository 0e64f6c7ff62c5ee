//! 流描述: 命令行上按什么顺序给出各路流的归档.
//!
//! - `vp8,opus`: 前一半归档属于 vp8, 后一半属于 opus
//! - `vp8!opus`: 归档交替排列, 第 1、3、5… 个属于 vp8
//! - `opus`: 所有归档属于同一路

use std::str::FromStr;

use yun_core::{YunError, YunResult};

use crate::payload::PayloadKind;

/// 归档的排列方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveOrder {
    /// 按流分组, 各组依次排列
    Concat,
    /// 各路流的归档交替排列
    Interleave,
}

/// 流描述
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescription {
    pub kinds: Vec<PayloadKind>,
    pub order: ArchiveOrder,
}

impl StreamDescription {
    /// 把归档分给各路流, 每路内部保持给定顺序
    pub fn bucket<T: Clone>(&self, archives: &[T]) -> YunResult<Vec<(PayloadKind, Vec<T>)>> {
        let streams = self.kinds.len();
        if streams == 0 || archives.is_empty() || archives.len() % streams != 0 {
            return Err(YunError::BadValue(format!(
                "{} 个归档无法平均分给 {streams} 路流",
                archives.len()
            )));
        }
        let buckets = match self.order {
            ArchiveOrder::Interleave => self
                .kinds
                .iter()
                .enumerate()
                .map(|(i, &kind)| (kind, archives.iter().skip(i).step_by(streams).cloned().collect()))
                .collect(),
            ArchiveOrder::Concat => self
                .kinds
                .iter()
                .zip(archives.chunks(archives.len() / streams))
                .map(|(&kind, chunk)| (kind, chunk.to_vec()))
                .collect(),
        };
        Ok(buckets)
    }
}

impl FromStr for StreamDescription {
    type Err = YunError;

    fn from_str(s: &str) -> YunResult<Self> {
        let (order, separator) = if s.contains(',') {
            (ArchiveOrder::Concat, ',')
        } else {
            (ArchiveOrder::Interleave, '!')
        };
        let kinds = s
            .split(separator)
            .map(str::parse)
            .collect::<YunResult<Vec<PayloadKind>>>()?;
        Ok(Self { kinds, order })
    }
}

/// 解析 `key=value,key=value`, 空串得到空列表
pub(crate) fn key_values(s: &str) -> YunResult<Vec<(&str, &str)>> {
    s.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| {
            item.split_once('=')
                .map(|(k, v)| (k.trim(), v.trim()))
                .ok_or_else(|| YunError::BadValue(format!("\"{item}\" 不是 key=value 形式")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_解析描述() {
        let d: StreamDescription = "vp8,opus".parse().unwrap();
        assert_eq!(d.kinds, vec![PayloadKind::Vp8, PayloadKind::Opus]);
        assert_eq!(d.order, ArchiveOrder::Concat);
        let d: StreamDescription = "opus!vp8".parse().unwrap();
        assert_eq!(d.order, ArchiveOrder::Interleave);
        assert_eq!(d.kinds[0], PayloadKind::Opus);
        assert_eq!("opus".parse::<StreamDescription>().unwrap().kinds.len(), 1);
        assert!("vp8,h264".parse::<StreamDescription>().is_err());
    }

    #[test]
    fn test_分配归档() {
        let archives = ["v1", "a1", "v2", "a2"];
        let interleave: StreamDescription = "vp8!opus".parse().unwrap();
        assert_eq!(
            interleave.bucket(&archives).unwrap(),
            vec![(PayloadKind::Vp8, vec!["v1", "v2"]), (PayloadKind::Opus, vec!["a1", "a2"])]
        );
        let concat: StreamDescription = "vp8,opus".parse().unwrap();
        assert_eq!(
            concat.bucket(&archives).unwrap(),
            vec![(PayloadKind::Vp8, vec!["v1", "a1"]), (PayloadKind::Opus, vec!["v2", "a2"])]
        );
        assert!(concat.bucket(&archives[..3]).is_err());
        assert!(concat.bucket::<&str>(&[]).is_err());
    }

    #[test]
    fn test_键值列表() {
        assert_eq!(key_values(" a=1 , b = x ").unwrap(), vec![("a", "1"), ("b", "x")]);
        assert!(key_values("").unwrap().is_empty());
        assert!(key_values("a").is_err());
    }
}
