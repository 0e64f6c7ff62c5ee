//! 解封装器 (Demuxer) trait 定义.

use yun_codec::Packet;
use yun_core::YunResult;

use crate::continuity::ContinuityStore;
use crate::format_id::FormatId;
use crate::io::IoContext;
use crate::stream::Stream;

/// 解封装器 trait
///
/// 使用流程:
/// 1. 调用 `open()` 解析容器头部, 发现所有流
/// 2. 调用 `streams()` 获取流信息
/// 3. 循环调用 `read_packet()` 直到返回 `YunError::Eof`
pub trait Demuxer: Send {
    /// 获取格式标识
    fn format_id(&self) -> FormatId;

    /// 获取格式名称
    fn name(&self) -> &str {
        self.format_id().name()
    }

    /// 打开容器并解析头部信息
    fn open(&mut self, io: &mut IoContext) -> YunResult<()>;

    /// 获取所有流信息
    fn streams(&self) -> &[Stream];

    /// 读取下一个数据包
    ///
    /// # 返回
    /// - `Ok(packet)`: 成功读取一个数据包
    /// - `Err(YunError::Eof)`: 已到达末尾
    fn read_packet(&mut self, io: &mut IoContext) -> YunResult<Packet>;

    /// 连续性计数器 (仅 MPEG-TS 提供)
    fn continuity(&self) -> Option<&dyn ContinuityStore> {
        None
    }
}
