//! 时间戳与时间基换算.
//!
//! 所有换算都用 128 位整数做交叉乘法:
//! `value * from.num * to.den / (from.den * to.num)`.

use std::cmp::Ordering;
use std::fmt;

use crate::rational::Rational;

/// 表示"未定义"的时间戳值
pub const NOPTS_VALUE: i64 = i64::MIN;

/// 换算时的取整方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// 向零截断
    Zero,
    /// 四舍五入, 恰好一半时远离零
    NearInf,
}

/// 截断换算 (用于 duration)
///
/// `NOPTS_VALUE` 原样返回, 结果饱和到 i64 范围.
pub fn rescale(value: i64, from: Rational, to: Rational) -> i64 {
    rescale_impl(value, from, to, Rounding::Zero)
}

/// 带取整方式的换算 (用于 pts/dts)
///
/// `NOPTS_VALUE`、`i64::MAX` 与 `i64::MIN + 1` 这类极值原样透传,
/// 其余结果钳制在 `[-i64::MAX, i64::MAX]` 内, 不会回绕.
pub fn rescale_rnd(value: i64, from: Rational, to: Rational, rounding: Rounding) -> i64 {
    if value == i64::MAX || value == -i64::MAX {
        return value;
    }
    rescale_impl(value, from, to, rounding)
}

fn rescale_impl(value: i64, from: Rational, to: Rational, rounding: Rounding) -> i64 {
    if value == NOPTS_VALUE {
        return value;
    }
    if from == to {
        return value;
    }
    let mut num = i128::from(value) * i128::from(from.num) * i128::from(to.den);
    let mut den = i128::from(from.den) * i128::from(to.num);
    if den == 0 {
        return NOPTS_VALUE;
    }
    if den < 0 {
        num = -num;
        den = -den;
    }
    let q = match rounding {
        Rounding::Zero => num / den,
        Rounding::NearInf => {
            let half = den / 2;
            if num >= 0 {
                (num + half) / den
            } else {
                -((-num + half) / den)
            }
        }
    };
    q.clamp(-i128::from(i64::MAX), i128::from(i64::MAX)) as i64
}

/// 比较两个不同时间基下的时间戳
///
/// 不经过换算, 直接比较 `a * tb_a` 与 `b * tb_b`.
pub fn compare_ts(a: i64, tb_a: Rational, b: i64, tb_b: Rational) -> Ordering {
    let lhs = i128::from(a) * i128::from(tb_a.num) * i128::from(tb_b.den);
    let rhs = i128::from(b) * i128::from(tb_b.num) * i128::from(tb_a.den);
    // 时间基分母统一为正时两边同号缩放, 比较结果不变
    let sign = (tb_a.den.signum() * tb_b.den.signum()) as i128;
    (lhs * sign).cmp(&(rhs * sign))
}

/// 带时间基的时间戳, 主要用于日志输出
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    /// 时间戳值, `NOPTS_VALUE` 表示未定义
    pub pts: i64,
    /// 时间基
    pub time_base: Rational,
}

impl Timestamp {
    /// 创建新的时间戳
    pub const fn new(pts: i64, time_base: Rational) -> Self {
        Self { pts, time_base }
    }

    /// 判断时间戳是否有效
    pub const fn is_valid(&self) -> bool {
        self.pts != NOPTS_VALUE && self.time_base.is_valid()
    }

    /// 转换为秒, 无效时间戳返回 `f64::NAN`
    pub fn to_seconds(&self) -> f64 {
        if !self.is_valid() {
            return f64::NAN;
        }
        self.pts as f64 * self.time_base.to_f64()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            write!(f, "NOPTS")
        } else {
            write!(f, "{}({:.6}s)", self.pts, self.to_seconds())
        }
    }
}
