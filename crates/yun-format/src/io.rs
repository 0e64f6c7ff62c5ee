//! I/O 抽象层.
//!
//! 解封装器与封装器只通过 [`IoContext`] 读写字节. 后端可以是文件、
//! 内存缓冲区, 或由调用方提供的 read/write/seek 回调 ([`CallbackBackend`]).

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::{Arc, Mutex, PoisonError};

use yun_core::{YunError, YunResult};

/// I/O 上下文
///
/// 封装底层后端, 提供带读缓冲的读取、预读 (peek) 与写入接口.
pub struct IoContext {
    /// 内部 I/O 实现
    inner: Box<dyn IoBackend>,
    /// 读缓冲区
    buffer: Vec<u8>,
    /// 缓冲区中的有效数据长度
    buf_len: usize,
    /// 缓冲区当前读取位置
    buf_pos: usize,
}

/// I/O 后端 trait
pub trait IoBackend: Send {
    /// 读取数据, 返回 0 表示 EOF
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    /// 写入数据
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;
    /// 全部写入
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut rest = buf;
        while !rest.is_empty() {
            match self.write(rest)? {
                0 => return Err(io::Error::new(io::ErrorKind::WriteZero, "写入 0 字节")),
                n => rest = &rest[n..],
            }
        }
        Ok(())
    }
    /// 定位 (seek)
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64>;
    /// 获取当前位置
    fn position(&mut self) -> io::Result<u64>;
    /// 获取总大小 (如果可知)
    fn size(&self) -> Option<u64>;
    /// 是否支持 seek
    fn is_seekable(&self) -> bool;
    /// 将已写入的数据推送到底层
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// 默认缓冲区大小 (32 KB)
const DEFAULT_BUFFER_SIZE: usize = 32 * 1024;

impl IoContext {
    /// 从 I/O 后端创建上下文
    pub fn new(backend: Box<dyn IoBackend>) -> Self {
        Self {
            inner: backend,
            buffer: vec![0u8; DEFAULT_BUFFER_SIZE],
            buf_len: 0,
            buf_pos: 0,
        }
    }

    /// 从文件路径打开 (只读)
    pub fn open_read(path: impl AsRef<std::path::Path>) -> YunResult<Self> {
        let file = std::fs::File::open(path)?;
        Ok(Self::new(Box::new(FileBackend::new(file))))
    }

    /// 从文件路径打开 (写入, 截断已有内容)
    pub fn open_write(path: impl AsRef<std::path::Path>) -> YunResult<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(Box::new(FileBackend::new(file))))
    }

    // ========================
    // 读取方法
    // ========================

    /// 读取指定字节数, 数据不足时返回 `YunError::Eof`
    pub fn read_exact(&mut self, buf: &mut [u8]) -> YunResult<()> {
        let mut total_read = 0;
        while total_read < buf.len() {
            let buffered = self.buf_len - self.buf_pos;
            if buffered > 0 {
                let to_copy = buffered.min(buf.len() - total_read);
                buf[total_read..total_read + to_copy]
                    .copy_from_slice(&self.buffer[self.buf_pos..self.buf_pos + to_copy]);
                self.buf_pos += to_copy;
                total_read += to_copy;
            } else {
                self.buf_pos = 0;
                self.buf_len = self.inner.read(&mut self.buffer)?;
                if self.buf_len == 0 {
                    return Err(YunError::Eof);
                }
            }
        }
        Ok(())
    }

    /// 读取 1 个字节
    pub fn read_u8(&mut self) -> YunResult<u8> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    /// 读取指定数量的字节
    pub fn read_bytes(&mut self, count: usize) -> YunResult<Vec<u8>> {
        let mut buf = vec![0u8; count];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// 预读最多 `len` 字节而不消耗
    ///
    /// 返回的切片短于 `len` 说明已到达 EOF. 不依赖 seek,
    /// 因此对只有 read 回调的输入同样可用.
    pub fn peek(&mut self, len: usize) -> YunResult<&[u8]> {
        if self.buf_len - self.buf_pos < len {
            self.buffer.copy_within(self.buf_pos..self.buf_len, 0);
            self.buf_len -= self.buf_pos;
            self.buf_pos = 0;
            if self.buffer.len() < len {
                self.buffer.resize(len, 0);
            }
            while self.buf_len < len {
                let n = self.inner.read(&mut self.buffer[self.buf_len..])?;
                if n == 0 {
                    break;
                }
                self.buf_len += n;
            }
        }
        let end = (self.buf_pos + len).min(self.buf_len);
        Ok(&self.buffer[self.buf_pos..end])
    }

    /// 跳过指定字节数
    pub fn skip(&mut self, count: usize) -> YunResult<()> {
        let buffered = self.buf_len - self.buf_pos;
        if count <= buffered {
            self.buf_pos += count;
            return Ok(());
        }
        let mut left = count - buffered;
        self.buf_pos = 0;
        self.buf_len = 0;
        while left > 0 {
            let to_read = left.min(self.buffer.len());
            let n = self.inner.read(&mut self.buffer[..to_read])?;
            if n == 0 {
                return Err(YunError::Eof);
            }
            left -= n;
        }
        Ok(())
    }

    // ========================
    // 写入方法
    // ========================

    /// 写入全部数据
    pub fn write_all(&mut self, buf: &[u8]) -> YunResult<()> {
        self.inner.write_all(buf)?;
        Ok(())
    }

    /// 将已写入的数据推送到底层
    pub fn flush(&mut self) -> YunResult<()> {
        self.inner.flush()?;
        Ok(())
    }

    // ========================
    // 定位方法
    // ========================

    /// 定位 (seek), 会清空读缓冲区
    pub fn seek(&mut self, pos: SeekFrom) -> YunResult<u64> {
        self.buf_pos = 0;
        self.buf_len = 0;
        Ok(self.inner.seek(pos)?)
    }

    /// 获取当前逻辑位置 (扣除读缓冲区中尚未消耗的数据)
    pub fn position(&mut self) -> YunResult<u64> {
        let raw_pos = self.inner.position()?;
        let buffered = (self.buf_len - self.buf_pos) as u64;
        Ok(raw_pos.saturating_sub(buffered))
    }

    /// 是否支持随机访问
    pub fn is_seekable(&self) -> bool {
        self.inner.is_seekable()
    }

    /// 获取总大小
    pub fn size(&self) -> Option<u64> {
        self.inner.size()
    }
}

/// 文件 I/O 后端
struct FileBackend {
    file: std::fs::File,
    size: Option<u64>,
}

impl FileBackend {
    fn new(file: std::fs::File) -> Self {
        let size = file.metadata().ok().map(|m| m.len());
        Self { file, size }
    }
}

impl IoBackend for FileBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file.seek(pos)
    }

    fn position(&mut self) -> io::Result<u64> {
        self.file.stream_position()
    }

    fn size(&self) -> Option<u64> {
        self.size
    }

    fn is_seekable(&self) -> bool {
        true
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// 内存缓冲区 I/O 后端
///
/// 数据放在共享缓冲区里, 后端交给 [`IoContext`] 之后, 仍可以通过
/// [`MemoryBackend::handle`] 得到的句柄读取写入结果.
pub struct MemoryBackend {
    data: Arc<Mutex<Vec<u8>>>,
    pos: usize,
}

/// [`MemoryBackend`] 缓冲区的共享句柄
#[derive(Clone, Default)]
pub struct MemoryHandle(Arc<Mutex<Vec<u8>>>);

impl MemoryHandle {
    /// 复制当前内容
    pub fn contents(&self) -> Vec<u8> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// 当前内容长度
    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 基于同一缓冲区创建新的后端 (位置从 0 开始)
    pub fn backend(&self) -> MemoryBackend {
        MemoryBackend {
            data: Arc::clone(&self.0),
            pos: 0,
        }
    }
}

impl MemoryBackend {
    /// 从已有数据创建 (用于读取)
    pub fn from_data(data: Vec<u8>) -> Self {
        Self {
            data: Arc::new(Mutex::new(data)),
            pos: 0,
        }
    }

    /// 创建空缓冲区 (用于写入)
    pub fn new() -> Self {
        Self::from_data(Vec::new())
    }

    /// 获取共享句柄
    pub fn handle(&self) -> MemoryHandle {
        MemoryHandle(Arc::clone(&self.data))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl IoBackend for MemoryBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        let available = data.len().saturating_sub(self.pos);
        let to_read = buf.len().min(available);
        buf[..to_read].copy_from_slice(&data[self.pos..self.pos + to_read]);
        self.pos += to_read;
        Ok(to_read)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        if self.pos > data.len() {
            data.resize(self.pos, 0);
        }
        let overlap = (data.len() - self.pos).min(buf.len());
        data[self.pos..self.pos + overlap].copy_from_slice(&buf[..overlap]);
        data.extend_from_slice(&buf[overlap..]);
        self.pos += buf.len();
        Ok(buf.len())
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.data.lock().unwrap_or_else(PoisonError::into_inner).len();
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(offset) => len as i64 + offset,
            SeekFrom::Current(offset) => self.pos as i64 + offset,
        };
        if new_pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek 位置不能为负",
            ));
        }
        self.pos = new_pos as usize;
        Ok(self.pos as u64)
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(self.pos as u64)
    }

    fn size(&self) -> Option<u64> {
        Some(self.data.lock().unwrap_or_else(PoisonError::into_inner).len() as u64)
    }

    fn is_seekable(&self) -> bool {
        true
    }
}

// ========================
// 回调后端
// ========================

/// seek 的参照点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    /// 从开头
    Start,
    /// 从当前位置
    Current,
    /// 从末尾
    End,
    /// 查询总大小 (不支持, 总是报错)
    Size,
}

type ReadFn = Box<dyn FnMut(&mut [u8]) -> io::Result<usize> + Send>;
type WriteFn = Box<dyn FnMut(&[u8]) -> io::Result<usize> + Send>;
type SeekFn = Box<dyn FnMut(i64, Whence) -> io::Result<u64> + Send>;

/// 由调用方回调驱动的 I/O 后端
///
/// 未提供的回调在被调用时返回 `Unsupported`. 大小查询模式
/// ([`Whence::Size`]) 永远不会转发给回调.
#[derive(Default)]
pub struct CallbackBackend {
    read: Option<ReadFn>,
    write: Option<WriteFn>,
    seek: Option<SeekFn>,
    pos: u64,
}

impl CallbackBackend {
    /// 创建没有任何回调的后端
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置 read 回调, 返回 0 表示 EOF
    pub fn with_read(mut self, f: impl FnMut(&mut [u8]) -> io::Result<usize> + Send + 'static) -> Self {
        self.read = Some(Box::new(f));
        self
    }

    /// 设置 write 回调
    pub fn with_write(mut self, f: impl FnMut(&[u8]) -> io::Result<usize> + Send + 'static) -> Self {
        self.write = Some(Box::new(f));
        self
    }

    /// 设置 seek 回调
    pub fn with_seek(mut self, f: impl FnMut(i64, Whence) -> io::Result<u64> + Send + 'static) -> Self {
        self.seek = Some(Box::new(f));
        self
    }

    /// 按 whence 定位
    pub fn seek_whence(&mut self, offset: i64, whence: Whence) -> io::Result<u64> {
        if whence == Whence::Size {
            return Err(io::Error::new(io::ErrorKind::Unsupported, "不支持查询大小"));
        }
        let seek = self
            .seek
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Unsupported, "未提供 seek 回调"))?;
        let pos = seek(offset, whence)?;
        self.pos = pos;
        Ok(pos)
    }
}

impl IoBackend for CallbackBackend {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self
            .read
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Unsupported, "未提供 read 回调"))?;
        let n = read(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let write = self
            .write
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Unsupported, "未提供 write 回调"))?;
        let n = write(buf)?;
        self.pos += n as u64;
        Ok(n)
    }

    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Start(offset) => self.seek_whence(offset as i64, Whence::Start),
            SeekFrom::Current(offset) => self.seek_whence(offset, Whence::Current),
            SeekFrom::End(offset) => self.seek_whence(offset, Whence::End),
        }
    }

    fn position(&mut self) -> io::Result<u64> {
        Ok(self.pos)
    }

    fn size(&self) -> Option<u64> {
        None
    }

    fn is_seekable(&self) -> bool {
        self.seek.is_some()
    }
}
