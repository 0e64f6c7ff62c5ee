//! 时间戳重映射.
//!
//! 偏移量以*源*时间基为单位, 在换算之前加到 pts/dts 上;
//! 换算后再加偏移会在两个时间基不同时得到不同的结果.

use yun_codec::Packet;
use yun_core::{NOPTS_VALUE, Rational, Rounding, rescale, rescale_rnd};

/// 把数据包从 `from` 时间基换算到 `to` 时间基
///
/// - pts/dts: 先加 `offset` (源时间基), 再四舍五入换算, 结果钳制不回绕;
///   `NOPTS_VALUE` 与极值不加偏移, 原样透传
/// - duration: 截断换算, 不加偏移
/// - pos: 重置为未知
pub fn remap(mut packet: Packet, from: Rational, to: Rational, offset: i64) -> Packet {
    packet.pts = remap_ts(packet.pts, from, to, offset);
    packet.dts = remap_ts(packet.dts, from, to, offset);
    packet.duration = rescale(packet.duration, from, to);
    packet.pos = -1;
    packet.time_base = to;
    packet
}

fn remap_ts(ts: i64, from: Rational, to: Rational, offset: i64) -> i64 {
    if ts == NOPTS_VALUE || ts == i64::MAX || ts == -i64::MAX {
        return ts;
    }
    let shifted = ts.saturating_add(offset);
    rescale_rnd(shifted, from, to, Rounding::NearInf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(pts: i64, dts: i64, duration: i64) -> Packet {
        let mut p = Packet::from_data(vec![0u8; 4]);
        p.pts = pts;
        p.dts = dts;
        p.duration = duration;
        p.pos = 1234;
        p
    }

    #[test]
    fn test_先偏移后换算() {
        // 1/1000 -> 1/90000, 偏移 10 个源单位 (10ms)
        let out = remap(packet(100, 90, 33), Rational::new(1, 1000), Rational::CLOCK_90K, 10);
        assert_eq!(out.pts, 9900);
        assert_eq!(out.dts, 9000);
        assert_eq!(out.duration, 2970);
        assert_eq!(out.pos, -1);
        assert_eq!(out.time_base, Rational::CLOCK_90K);
    }

    #[test]
    fn test_偏移顺序影响结果() {
        // 1/90000 -> 1/1000: 先加 45 再换算得 1, 先换算再加则得 45
        let out = remap(packet(0, 0, 0), Rational::CLOCK_90K, Rational::new(1, 1000), 45);
        assert_eq!(out.pts, 1);
    }

    #[test]
    fn test_四舍五入与截断() {
        let out = remap(packet(1, -1, 2), Rational::new(1, 2), Rational::new(1, 1), 0);
        // 0.5 远离零
        assert_eq!(out.pts, 1);
        assert_eq!(out.dts, -1);
        // duration 截断: 2/2 = 1
        assert_eq!(out.duration, 1);
        let out = remap(packet(3, 3, 3), Rational::new(1, 2), Rational::new(1, 1), 0);
        assert_eq!(out.pts, 2);
        assert_eq!(out.duration, 1);
    }

    #[test]
    fn test_未定义与极值透传() {
        let out = remap(
            packet(NOPTS_VALUE, i64::MAX, 0),
            Rational::new(1, 1000),
            Rational::CLOCK_90K,
            50,
        );
        assert_eq!(out.pts, NOPTS_VALUE);
        assert_eq!(out.dts, i64::MAX);
    }

    #[test]
    fn test_溢出钳制() {
        let out = remap(
            packet(i64::MAX - 10, 0, 0),
            Rational::new(1, 1),
            Rational::CLOCK_90K,
            0,
        );
        assert_eq!(out.pts, i64::MAX);
    }
}
