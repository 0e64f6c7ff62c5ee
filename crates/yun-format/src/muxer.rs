//! 封装器 (Muxer) trait 定义.

use log::warn;
use yun_codec::Packet;
use yun_core::{Rational, YunResult};

use crate::continuity::ContinuityStore;
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::options::MuxOptions;
use crate::stream::Stream;

/// 封装器 trait
///
/// 使用流程:
/// 1. 可选: `set_option()` 配置封装器
/// 2. `write_header()` 恰好一次
/// 3. 循环 `write_packet()`, 数据包时间戳须已换算到 `stream_time_base()`
/// 4. 分段时 `flush()` 后直接丢弃; 否则 `write_trailer()` 收尾
pub trait Muxer: Send {
    /// 获取格式标识
    fn format_id(&self) -> FormatId;

    /// 获取格式名称
    fn name(&self) -> &str {
        self.format_id().name()
    }

    /// 输出流实际使用的时间基
    ///
    /// 默认沿用输入流的时间基; 有固定时钟的格式 (如 MPEG-TS) 会覆盖它.
    fn stream_time_base(&self, stream: &Stream) -> Rational {
        stream.time_base
    }

    /// 设置一个选项, 未知键返回 `Ok(false)`
    fn set_option(&mut self, _key: &str, _value: &str) -> YunResult<bool> {
        Ok(false)
    }

    /// 写入容器头部
    fn write_header(&mut self, io: &mut IoContext, streams: &[Stream]) -> YunResult<()>;

    /// 写入一个数据包
    fn write_packet(&mut self, io: &mut IoContext, packet: &Packet) -> YunResult<()>;

    /// 推出缓冲数据而不收尾
    fn flush(&mut self, io: &mut IoContext) -> YunResult<()> {
        io.flush()
    }

    /// 写入容器尾部, 完成封装
    fn write_trailer(&mut self, io: &mut IoContext) -> YunResult<()>;

    /// 连续性计数器 (仅 MPEG-TS 提供)
    fn continuity(&self) -> Option<&dyn ContinuityStore> {
        None
    }

    /// 可写的连续性计数器 (仅 MPEG-TS 提供)
    fn continuity_mut(&mut self) -> Option<&mut dyn ContinuityStore> {
        None
    }
}

/// 把选项集逐项应用到封装器, 未知键记录警告后忽略
pub fn apply_options(muxer: &mut dyn Muxer, options: &MuxOptions) -> YunResult<()> {
    for (key, value) in options.iter() {
        if !muxer.set_option(key, value)? {
            warn!("{} 封装器不认识选项 {key}={value}, 已忽略", muxer.name());
        }
    }
    Ok(())
}
