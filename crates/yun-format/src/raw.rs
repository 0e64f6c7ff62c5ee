//! yunraw 原始基本流记录格式的公共定义.
//!
//! 所有整数均为小端序.
//!
//! ```text
//! 文件头:
//!   [u8 类型长度]["video" | "audio"][u8 名称长度][编码器名称]
//!   视频: i32 pix_fmt, i32 width, i32 height, i32 bit_rate, i32 frame_rate
//!   音频: i32 bit_rate, i32 sample_rate, u64 channel_layout
//!
//! 记录 (重复):
//!   [i64 pts][i32 flags][i32 size][size 字节负载]
//!   data_only 模式只写负载
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use yun_codec::CodecId;
use yun_core::{MediaType, Rational, YunError, YunResult};

use crate::io::IoContext;
use crate::stream::{AudioStreamParams, Stream, StreamParams, VideoStreamParams};

/// 视频类型标记
pub const TYPE_VIDEO: &str = "video";
/// 音频类型标记
pub const TYPE_AUDIO: &str = "audio";
/// 记录头大小 (pts + flags + size)
pub const RECORD_HEADER_SIZE: usize = 16;

/// 流在 yunraw 中使用的时间基: 视频 1/帧率, 音频 1/采样率
pub fn raw_time_base(stream: &Stream) -> YunResult<Rational> {
    let rate = match &stream.params {
        StreamParams::Video(v) => frame_rate_to_i32(v.frame_rate),
        StreamParams::Audio(a) => i32::try_from(a.sample_rate).unwrap_or(0),
        StreamParams::Other => {
            return Err(YunError::Unsupported(
                "yunraw 只支持视频或音频流".into(),
            ));
        }
    };
    if rate <= 0 {
        return Err(YunError::BadValue(format!(
            "yunraw: 流 {} 的帧率/采样率无效",
            stream.index
        )));
    }
    Ok(Rational::new(1, rate))
}

/// 帧率取整到整数
fn frame_rate_to_i32(rate: Rational) -> i32 {
    if !rate.is_valid() {
        return 0;
    }
    if rate.den == 1 {
        rate.num
    } else {
        rate.to_f64().round() as i32
    }
}

fn clamp_i32(v: u64) -> i32 {
    i32::try_from(v).unwrap_or(i32::MAX)
}

fn push_tag(out: &mut Vec<u8>, tag: &str) -> YunResult<()> {
    let len = u8::try_from(tag.len())
        .map_err(|_| YunError::BadValue(format!("yunraw: 名称过长: {tag}")))?;
    out.push(len);
    out.extend_from_slice(tag.as_bytes());
    Ok(())
}

/// 编码文件头
pub fn encode_header(stream: &Stream) -> YunResult<Vec<u8>> {
    let mut out = Vec::with_capacity(64);
    match &stream.params {
        StreamParams::Video(v) => {
            push_tag(&mut out, TYPE_VIDEO)?;
            push_tag(&mut out, stream.encoder())?;
            out.write_i32::<LittleEndian>(v.pixel_format)?;
            out.write_i32::<LittleEndian>(clamp_i32(u64::from(v.width)))?;
            out.write_i32::<LittleEndian>(clamp_i32(u64::from(v.height)))?;
            out.write_i32::<LittleEndian>(clamp_i32(v.bit_rate))?;
            out.write_i32::<LittleEndian>(frame_rate_to_i32(v.frame_rate))?;
        }
        StreamParams::Audio(a) => {
            push_tag(&mut out, TYPE_AUDIO)?;
            push_tag(&mut out, stream.encoder())?;
            out.write_i32::<LittleEndian>(clamp_i32(a.bit_rate))?;
            out.write_i32::<LittleEndian>(clamp_i32(u64::from(a.sample_rate)))?;
            out.write_u64::<LittleEndian>(a.channel_layout)?;
        }
        StreamParams::Other => {
            return Err(YunError::Unsupported(
                "yunraw 只支持视频或音频流".into(),
            ));
        }
    }
    Ok(out)
}

fn read_tag(io: &mut IoContext) -> YunResult<String> {
    let len = io.read_u8()? as usize;
    let bytes = io.read_bytes(len)?;
    String::from_utf8(bytes).map_err(|_| YunError::InvalidData("yunraw: 名称不是 UTF-8".into()))
}

/// 读取并解析文件头
pub fn decode_header(io: &mut IoContext) -> YunResult<Stream> {
    let kind = read_tag(io)?;
    let encoder_name = read_tag(io)?;
    let codec_id = CodecId::from_encoder_name(&encoder_name);

    let (media_type, params, rate) = match kind.as_str() {
        TYPE_VIDEO => {
            let fields = io.read_bytes(20)?;
            let mut cur = fields.as_slice();
            let pixel_format = cur.read_i32::<LittleEndian>()?;
            let width = cur.read_i32::<LittleEndian>()?;
            let height = cur.read_i32::<LittleEndian>()?;
            let bit_rate = cur.read_i32::<LittleEndian>()?;
            let frame_rate = cur.read_i32::<LittleEndian>()?;
            let params = VideoStreamParams {
                width: width.max(0) as u32,
                height: height.max(0) as u32,
                pixel_format,
                frame_rate: Rational::new(frame_rate, 1),
                bit_rate: bit_rate.max(0) as u64,
            };
            (MediaType::Video, StreamParams::Video(params), frame_rate)
        }
        TYPE_AUDIO => {
            let fields = io.read_bytes(16)?;
            let mut cur = fields.as_slice();
            let bit_rate = cur.read_i32::<LittleEndian>()?;
            let sample_rate = cur.read_i32::<LittleEndian>()?;
            let channel_layout = cur.read_u64::<LittleEndian>()?;
            let params = AudioStreamParams {
                sample_rate: sample_rate.max(0) as u32,
                channel_layout,
                bit_rate: bit_rate.max(0) as u64,
            };
            (MediaType::Audio, StreamParams::Audio(params), sample_rate)
        }
        other => {
            return Err(YunError::InvalidData(format!(
                "yunraw: 未知的流类型 {other:?}"
            )));
        }
    };
    if rate <= 0 {
        return Err(YunError::InvalidData(format!(
            "yunraw: 帧率/采样率无效: {rate}"
        )));
    }

    let mut stream = Stream::new(0, codec_id, Rational::new(1, rate));
    stream.media_type = media_type;
    stream.params = params;
    stream.encoder_name = encoder_name;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryBackend;

    #[test]
    fn test_音频头布局() {
        let mut stream = Stream::new(0, CodecId::Opus, Rational::new(1, 48000));
        stream.encoder_name = "libopus".into();
        stream.params = StreamParams::Audio(AudioStreamParams {
            sample_rate: 48000,
            channel_layout: 0x3,
            bit_rate: 64000,
        });
        let header = encode_header(&stream).unwrap();
        let mut expected = vec![5];
        expected.extend_from_slice(b"audio");
        expected.push(7);
        expected.extend_from_slice(b"libopus");
        expected.extend_from_slice(&64000i32.to_le_bytes());
        expected.extend_from_slice(&48000i32.to_le_bytes());
        expected.extend_from_slice(&3u64.to_le_bytes());
        assert_eq!(header, expected);

        let mut io = IoContext::new(Box::new(MemoryBackend::from_data(header)));
        let parsed = decode_header(&mut io).unwrap();
        assert_eq!(parsed.codec_id, CodecId::Opus);
        assert_eq!(parsed.time_base, Rational::new(1, 48000));
        assert_eq!(parsed.audio().unwrap().channel_layout, 3);
    }

    #[test]
    fn test_非整数帧率取整() {
        let mut stream = Stream::new(0, CodecId::H264, Rational::new(1, 90000));
        stream.params = StreamParams::Video(VideoStreamParams {
            frame_rate: Rational::new(30000, 1001),
            ..Default::default()
        });
        assert_eq!(raw_time_base(&stream).unwrap(), Rational::new(1, 30));
    }

    #[test]
    fn test_零采样率无效() {
        let mut header = vec![5];
        header.extend_from_slice(b"audio");
        header.push(0);
        header.extend_from_slice(&[0u8; 16]);
        let mut io = IoContext::new(Box::new(MemoryBackend::from_data(header)));
        assert!(matches!(decode_header(&mut io), Err(YunError::InvalidData(_))));
    }
}
