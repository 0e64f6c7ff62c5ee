//! 命令行取值解析.

use std::fs;
use std::path::Path;

use anyhow::{Context, bail};
use serde::de::DeserializeOwned;
use yun_format::{ContinuityCounter, CounterSnapshot, MuxOptions};
use yun_remux::FrameRange;

/// 解析 `INDEX=TICKS` 形式的时间戳偏移
pub fn parse_offset(s: &str) -> anyhow::Result<(usize, i64)> {
    let (index, ticks) = s
        .split_once('=')
        .with_context(|| format!("偏移应为 INDEX=TICKS: {s:?}"))?;
    let index = index.trim().parse().with_context(|| format!("流索引无效: {s:?}"))?;
    let ticks = ticks.trim().parse().with_context(|| format!("偏移量无效: {s:?}"))?;
    Ok((index, ticks))
}

/// 把偏移写入按流索引排列的列表, 空缺处补 0
pub fn apply_offsets(offsets: &mut Vec<i64>, items: &[String]) -> anyhow::Result<()> {
    for item in items {
        let (index, ticks) = parse_offset(item)?;
        if offsets.len() <= index {
            offsets.resize(index + 1, 0);
        }
        offsets[index] = ticks;
    }
    Ok(())
}

/// 解析 `INDEX:BEGIN:END` 形式的帧序号窗口, 两端可留空
pub fn parse_range(s: &str) -> anyhow::Result<FrameRange> {
    let parts: Vec<&str> = s.split(':').collect();
    let [index, begin, end] = parts.as_slice() else {
        bail!("帧窗口应为 INDEX:BEGIN:END: {s:?}");
    };
    let bound = |v: &str| -> anyhow::Result<Option<i64>> {
        match v.trim() {
            "" => Ok(None),
            v => Ok(Some(v.parse().with_context(|| format!("帧序号无效: {v:?}"))?)),
        }
    };
    let index = index.trim().parse().with_context(|| format!("流索引无效: {s:?}"))?;
    Ok(FrameRange::new(index, bound(*begin)?, bound(*end)?))
}

/// 合并 `-o key=value` 封装器选项
pub fn apply_mux_options(options: &mut MuxOptions, pairs: &[String]) -> anyhow::Result<()> {
    for pair in pairs {
        options.parse_pair(pair)?;
    }
    Ok(())
}

/// 读取 JSON 配置文件, 未指定时取默认值
pub fn load_config<T: DeserializeOwned + Default>(path: Option<&Path>) -> anyhow::Result<T> {
    let Some(path) = path else {
        return Ok(T::default());
    };
    let text =
        fs::read_to_string(path).with_context(|| format!("读取配置文件 {} 失败", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("解析配置文件 {} 失败", path.display()))
}

/// 从 JSON 文本读取连续性计数器
///
/// 接受计数器快照本身, 也接受带 `counters` 字段的 scan/remux/segment 结果.
pub fn counters_from_json(text: &str) -> anyhow::Result<Vec<ContinuityCounter>> {
    let mut value: serde_json::Value = serde_json::from_str(text).context("计数器文件不是合法的 JSON")?;
    while let Some(inner) = value.get("counters").filter(|v| v.is_object()).cloned() {
        value = inner;
    }
    if value.get("counters").is_some_and(|v| v.is_null()) {
        bail!("计数器文件不含连续性计数器 (输出不是 MPEG-TS?)");
    }
    let snapshot: CounterSnapshot = serde_json::from_value(value).context("计数器快照格式错误")?;
    Ok(snapshot.counters)
}

/// 读取 `--cc-file` 指定的计数器文件
pub fn load_counters(path: &Path) -> anyhow::Result<Vec<ContinuityCounter>> {
    let text =
        fs::read_to_string(path).with_context(|| format!("读取计数器文件 {} 失败", path.display()))?;
    counters_from_json(&text)
}

/// 切分输出的缺省模板: 与输入同目录的 `<输入名>-%02d.mjr`
pub fn default_split_template(input: &Path) -> String {
    let stem = input
        .file_stem()
        .map_or_else(|| "part".to_string(), |s| s.to_string_lossy().replace('%', "%%"));
    input
        .with_file_name(format!("{stem}-%02d.mjr"))
        .to_string_lossy()
        .into_owned()
}
