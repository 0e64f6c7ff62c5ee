//! 容器格式注册表.
//!
//! 管理所有已注册的解封装器/封装器, 支持按格式标识或名称查找, 以及自动探测.

use std::collections::HashMap;

use log::debug;
use yun_core::{YunError, YunResult};

use crate::demuxer::Demuxer;
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::muxer::Muxer;
use crate::probe::{FormatProbe, PROBE_SIZE, ProbeResult};

/// 解封装器工厂函数类型
pub type DemuxerFactory = fn() -> YunResult<Box<dyn Demuxer>>;

/// 封装器工厂函数类型
pub type MuxerFactory = fn() -> YunResult<Box<dyn Muxer>>;

/// 打开输入/输出时的格式提示
///
/// `name` 指定格式短名称时直接使用; 否则由 `filename` 的扩展名
/// 与头部数据探测.
#[derive(Debug, Clone, Default)]
pub struct FormatHint {
    /// 格式短名称 (如 `"mpegts"`)
    pub name: Option<String>,
    /// 文件名, 用于扩展名匹配
    pub filename: Option<String>,
}

impl FormatHint {
    /// 按格式名称
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            filename: None,
        }
    }

    /// 按文件名
    pub fn file(filename: impl Into<String>) -> Self {
        Self {
            name: None,
            filename: Some(filename.into()),
        }
    }

    /// 解析显式给出的格式名, 未知名称为 `BadValue`
    pub fn format_id(&self) -> YunResult<Option<FormatId>> {
        match &self.name {
            Some(name) => FormatId::from_name(name)
                .map(Some)
                .ok_or_else(|| YunError::BadValue(format!("未知的容器格式: {name}"))),
            None => Ok(None),
        }
    }
}

/// 容器格式注册表
pub struct FormatRegistry {
    /// 解封装器工厂映射
    demuxers: HashMap<FormatId, DemuxerEntry>,
    /// 封装器工厂映射
    muxers: HashMap<FormatId, MuxerEntry>,
    /// 格式探测器列表
    probes: Vec<Box<dyn FormatProbe + Send + Sync>>,
}

/// 解封装器注册条目
struct DemuxerEntry {
    name: String,
    factory: DemuxerFactory,
}

/// 封装器注册条目
struct MuxerEntry {
    name: String,
    factory: MuxerFactory,
}

impl FormatRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self {
            demuxers: HashMap::new(),
            muxers: HashMap::new(),
            probes: Vec::new(),
        }
    }

    /// 注册一个解封装器
    pub fn register_demuxer(
        &mut self,
        format_id: FormatId,
        name: impl Into<String>,
        factory: DemuxerFactory,
    ) {
        self.demuxers.insert(
            format_id,
            DemuxerEntry {
                name: name.into(),
                factory,
            },
        );
    }

    /// 注册一个封装器
    pub fn register_muxer(&mut self, format_id: FormatId, name: impl Into<String>, factory: MuxerFactory) {
        self.muxers.insert(
            format_id,
            MuxerEntry {
                name: name.into(),
                factory,
            },
        );
    }

    /// 注册一个格式探测器
    pub fn register_probe(&mut self, probe: Box<dyn FormatProbe + Send + Sync>) {
        self.probes.push(probe);
    }

    /// 创建指定格式的解封装器实例
    pub fn create_demuxer(&self, format_id: FormatId) -> YunResult<Box<dyn Demuxer>> {
        let entry = self
            .demuxers
            .get(&format_id)
            .ok_or_else(|| YunError::FormatNotFound(format!("未找到 {format_id} 的解封装器")))?;
        (entry.factory)()
    }

    /// 创建指定格式的封装器实例
    pub fn create_muxer(&self, format_id: FormatId) -> YunResult<Box<dyn Muxer>> {
        let entry = self
            .muxers
            .get(&format_id)
            .ok_or_else(|| YunError::FormatNotFound(format!("未找到 {format_id} 的封装器")))?;
        (entry.factory)()
    }

    /// 按提示创建封装器
    ///
    /// 优先使用格式名称, 其次文件扩展名; 两者都无法确定时为 `BadValue`.
    pub fn create_muxer_for(&self, hint: &FormatHint) -> YunResult<Box<dyn Muxer>> {
        let format_id = match hint.format_id()? {
            Some(id) => id,
            None => hint
                .filename
                .as_deref()
                .and_then(FormatId::from_filename)
                .ok_or_else(|| YunError::BadValue("无法确定输出格式".into()))?,
        };
        self.create_muxer(format_id)
    }

    /// 探测数据的容器格式
    ///
    /// 遍历所有已注册的探测器, 返回置信度最高的结果.
    pub fn probe(&self, data: &[u8], filename: Option<&str>) -> Option<ProbeResult> {
        let mut best: Option<ProbeResult> = None;
        for probe in &self.probes {
            if let Some(score) = probe.probe(data, filename) {
                let is_better = best.as_ref().is_none_or(|b| score > b.score);
                if is_better {
                    best = Some(ProbeResult {
                        format_id: probe.format_id(),
                        score,
                    });
                }
            }
        }
        best
    }

    /// 获取所有已注册的解封装器名称
    pub fn list_demuxers(&self) -> Vec<(FormatId, &str)> {
        let mut list: Vec<(FormatId, &str)> = self
            .demuxers
            .iter()
            .map(|(id, entry)| (*id, entry.name.as_str()))
            .collect();
        list.sort_by_key(|(_, name)| *name);
        list
    }

    /// 获取所有已注册的封装器名称
    pub fn list_muxers(&self) -> Vec<(FormatId, &str)> {
        let mut list: Vec<(FormatId, &str)> = self
            .muxers
            .iter()
            .map(|(id, entry)| (*id, entry.name.as_str()))
            .collect();
        list.sort_by_key(|(_, name)| *name);
        list
    }

    /// 探测输入格式 (不打开解封装器)
    ///
    /// 通过预读获取头部数据, 不消耗输入, 因此不要求输入可 seek.
    pub fn probe_input(&self, io: &mut IoContext, filename: Option<&str>) -> YunResult<ProbeResult> {
        let head = io.peek(PROBE_SIZE)?;
        self.probe(head, filename)
            .ok_or_else(|| YunError::FormatNotFound("无法识别输入格式".into()))
    }

    /// 按提示创建并打开解封装器
    ///
    /// 给出格式名称时直接使用, 否则自动探测.
    pub fn open_input(&self, io: &mut IoContext, hint: &FormatHint) -> YunResult<Box<dyn Demuxer>> {
        let format_id = match hint.format_id()? {
            Some(id) => id,
            None => {
                let result = self.probe_input(io, hint.filename.as_deref())?;
                debug!("探测到输入格式 {} (分数 {})", result.format_id, result.score);
                result.format_id
            }
        };
        let mut demuxer = self.create_demuxer(format_id)?;
        demuxer.open(io)?;
        Ok(demuxer)
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryBackend;

    fn registry() -> FormatRegistry {
        let mut r = FormatRegistry::new();
        crate::register_all(&mut r);
        r
    }

    #[test]
    fn test_注册表_包含内置格式() {
        let r = registry();
        assert!(r.create_muxer(FormatId::MpegTs).is_ok());
        assert!(r.create_demuxer(FormatId::YunRaw).is_ok());
        let names: Vec<&str> = r.list_muxers().into_iter().map(|(_, n)| n).collect();
        assert_eq!(names, vec!["mpegts", "yunraw"]);
    }

    #[test]
    fn test_未知格式名() {
        let r = registry();
        let err = r.create_muxer_for(&FormatHint::named("avi")).err().unwrap();
        assert!(matches!(err, YunError::BadValue(_)));
        let muxer = r.create_muxer_for(&FormatHint::file("out-%03d.ts")).unwrap();
        assert_eq!(muxer.format_id(), FormatId::MpegTs);
        assert!(r.create_muxer_for(&FormatHint::default()).is_err());
    }

    #[test]
    fn test_探测不消耗输入() {
        let r = registry();
        let mut data = Vec::new();
        for _ in 0..4 {
            let mut pkt = [0xFFu8; 188];
            pkt[0] = 0x47;
            data.extend_from_slice(&pkt);
        }
        let mut io = IoContext::new(Box::new(MemoryBackend::from_data(data)));
        let result = r.probe_input(&mut io, None).unwrap();
        assert_eq!(result.format_id, FormatId::MpegTs);
        assert_eq!(io.read_u8().unwrap(), 0x47);
    }

    #[test]
    fn test_无法识别的输入() {
        let r = registry();
        let mut io = IoContext::new(Box::new(MemoryBackend::from_data(vec![0u8; 64])));
        let err = r.open_input(&mut io, &FormatHint::default()).err().unwrap();
        assert!(matches!(err, YunError::FormatNotFound(_)));
    }
}
