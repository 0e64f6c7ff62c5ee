//! 统一错误类型定义.
//!
//! 所有 Yun crate 共用的错误类型. 前五类 (`Io`, `OutOfMemory`, `BadValue`,
//! `WriteFailed`, `Aborted`) 是对外操作 (remux/segment/mux/scan) 的结果分类,
//! 其余变体由容器层使用, 在到达调用方之前通常会被归并.

use thiserror::Error;

/// Yun 统一错误类型
#[derive(Debug, Error)]
pub enum YunError {
    /// I/O 回调失败
    #[error("I/O 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 内存分配失败
    #[error("内存分配失败: {0}")]
    OutOfMemory(String),

    /// 无效参数或取值 (未知格式名、模板溢出、参考流索引越界等)
    #[error("无效取值: {0}")]
    BadValue(String),

    /// 封装器拒绝写入
    #[error("写入失败: {0}")]
    WriteFailed(String),

    /// 协作式取消
    #[error("操作已中止")]
    Aborted,

    /// 无效数据 (损坏的容器字节等)
    #[error("无效数据: {0}")]
    InvalidData(String),

    /// 不支持的操作
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// 未找到指定的容器格式
    #[error("未找到容器格式: {0}")]
    FormatNotFound(String),

    /// 未找到指定的流
    #[error("未找到流: 索引 {0}")]
    StreamNotFound(usize),

    /// 已到达流末尾
    #[error("已到达流末尾")]
    Eof,
}

impl YunError {
    /// 是否为协作式取消
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// 是否为流末尾
    pub fn is_eof(&self) -> bool {
        matches!(self, Self::Eof)
    }
}

/// Yun 统一 Result 类型
pub type YunResult<T> = Result<T, YunError>;
