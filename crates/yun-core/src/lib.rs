//! # yun-core
//!
//! Yun 转封装框架核心库, 提供错误类型、时间基与时间戳换算等基础设施.
//!
//! 时间戳的一切比较与换算都经过 [`timestamp`] 中的 128 位交叉乘法完成,
//! 不做朴素除法.

pub mod crc;
pub mod error;
pub mod media_type;
pub mod rational;
pub mod timestamp;

// 重导出常用类型
pub use error::{YunError, YunResult};
pub use media_type::MediaType;
pub use rational::Rational;
pub use timestamp::{NOPTS_VALUE, Rounding, Timestamp, compare_ts, rescale, rescale_rnd};
