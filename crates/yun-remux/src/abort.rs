//! 协作式取消.
//!
//! 每个循环 (转封装、分段、交织封装、扫描) 在每次迭代开始时查询一次
//! 取消信号, 一旦触发即停止并返回 `YunError::Aborted`.

use std::sync::atomic::{AtomicBool, Ordering};

use yun_core::{YunError, YunResult};

/// 取消信号
pub trait AbortSignal {
    /// 是否应当中止
    fn is_aborted(&self) -> bool;

    /// 已触发时返回 `Aborted`
    fn check(&self) -> YunResult<()> {
        if self.is_aborted() {
            Err(YunError::Aborted)
        } else {
            Ok(())
        }
    }
}

impl<F> AbortSignal for F
where
    F: Fn() -> bool,
{
    fn is_aborted(&self) -> bool {
        self()
    }
}

impl AbortSignal for AtomicBool {
    fn is_aborted(&self) -> bool {
        self.load(Ordering::Relaxed)
    }
}

/// 永不触发的取消信号
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverAbort;

impl AbortSignal for NeverAbort {
    fn is_aborted(&self) -> bool {
        false
    }
}
