//! 流信息定义.
//!
//! 描述容器中的一条流. 编解码器参数对流水线是不透明的,
//! 只在容器之间原样传递.

use serde::Serialize;
use yun_codec::CodecId;
use yun_core::{MediaType, Rational};

/// 流信息
#[derive(Debug, Clone, Serialize)]
pub struct Stream {
    /// 流索引 (在容器中的位置, 从 0 开始)
    pub index: usize,
    /// 媒体类型
    pub media_type: MediaType,
    /// 编解码器标识
    pub codec_id: CodecId,
    /// 时间基
    pub time_base: Rational,
    /// 流时长 (以 time_base 为单位, -1 表示未知)
    pub duration: i64,
    /// 编码器名称 (原始记录头中携带, 可能为空)
    pub encoder_name: String,
    /// 编解码器私有数据
    #[serde(skip)]
    pub extra_data: Vec<u8>,
    /// 流特定参数
    pub params: StreamParams,
}

/// 流特定参数
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamParams {
    /// 视频流参数
    Video(VideoStreamParams),
    /// 音频流参数
    Audio(AudioStreamParams),
    /// 其他
    Other,
}

/// 视频流参数
#[derive(Debug, Clone, Default, Serialize)]
pub struct VideoStreamParams {
    /// 宽度 (像素)
    pub width: u32,
    /// 高度 (像素)
    pub height: u32,
    /// 像素格式代码 (不透明, 由编码引擎定义)
    pub pixel_format: i32,
    /// 帧率
    pub frame_rate: Rational,
    /// 码率 (bps, 0 表示未知)
    pub bit_rate: u64,
}

/// 音频流参数
#[derive(Debug, Clone, Default, Serialize)]
pub struct AudioStreamParams {
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 声道布局位掩码
    pub channel_layout: u64,
    /// 码率 (bps, 0 表示未知)
    pub bit_rate: u64,
}

impl Stream {
    /// 创建流, 媒体类型由编解码器推断, 参数取默认值
    pub fn new(index: usize, codec_id: CodecId, time_base: Rational) -> Self {
        let media_type = codec_id.media_type();
        let params = match media_type {
            MediaType::Video => StreamParams::Video(VideoStreamParams::default()),
            MediaType::Audio => StreamParams::Audio(AudioStreamParams::default()),
            MediaType::Other => StreamParams::Other,
        };
        Self {
            index,
            media_type,
            codec_id,
            time_base,
            duration: -1,
            encoder_name: String::new(),
            extra_data: Vec::new(),
            params,
        }
    }

    /// 编码器名称, 为空时退回编解码器短名
    pub fn encoder(&self) -> &str {
        if self.encoder_name.is_empty() {
            self.codec_id.name()
        } else {
            &self.encoder_name
        }
    }

    /// 视频参数
    pub fn video(&self) -> Option<&VideoStreamParams> {
        match &self.params {
            StreamParams::Video(v) => Some(v),
            _ => None,
        }
    }

    /// 音频参数
    pub fn audio(&self) -> Option<&AudioStreamParams> {
        match &self.params {
            StreamParams::Audio(a) => Some(a),
            _ => None,
        }
    }
}
