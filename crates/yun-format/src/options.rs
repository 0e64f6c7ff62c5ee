//! 封装器选项.
//!
//! 选项是字符串键值对, 由各封装器自行解释. 未知键记录警告后忽略,
//! 取值格式错误返回 `BadValue`.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use yun_core::{YunError, YunResult};

/// 封装器选项集合
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MuxOptions(BTreeMap<String, String>);

impl MuxOptions {
    /// 创建空选项集
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置一个选项
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// 读取一个选项
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// 遍历所有选项
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 解析 `key=value` 形式的一项并加入
    pub fn parse_pair(&mut self, pair: &str) -> YunResult<()> {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| YunError::BadValue(format!("选项应为 key=value: {pair:?}")))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(YunError::BadValue(format!("选项键为空: {pair:?}")));
        }
        self.set(key, value.trim());
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MuxOptions {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// 解析选项取值, 失败时返回 `BadValue`
pub fn parse_value<T: FromStr>(key: &str, value: &str) -> YunResult<T> {
    let parse = |s: &str| s.parse::<T>().ok();
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16)
            .ok()
            .and_then(|v| parse(&v.to_string())),
        None => parse(value),
    };
    parsed.ok_or_else(|| YunError::BadValue(format!("选项 {key} 取值无效: {value:?}")))
}

/// 解析布尔选项 (`0/1/true/false`)
pub fn parse_bool(key: &str, value: &str) -> YunResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(YunError::BadValue(format!("选项 {key} 取值无效: {value:?}"))),
    }
}
