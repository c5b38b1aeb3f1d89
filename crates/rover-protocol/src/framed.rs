//! 阻塞式分帧读写器
//!
//! 在任意 `Read`/`Write`（通常是设置了超时的 `TcpStream`）之上组合编解码器。
//!
//! 读取结果显式区分三类情况：
//!
//! | 情况 | 结果 | 会话行为 |
//! |------|------|----------|
//! | 读超时 | `Ok(Received::Timeout)` | 继续循环 |
//! | 协议违规 / 中途断开 | `Err(InvalidLength / Truncated / LineTooLong)` | 中止会话 |
//! | 对端在消息边界关闭 | `Err(Closed)` | 正常结束会话 |

use crate::ProtocolError;
use crate::codec::{Decoder, Encoder, LengthPrefixedCodec, LineCodec};
use crate::constants::READ_CHUNK_SIZE;
use bytes::BytesMut;
use std::io::{self, Read, Write};

/// 一次接收的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received<T> {
    /// 完整的一条消息
    Message(T),
    /// 读超时，没有完整消息（部分数据保留在缓冲区）
    Timeout,
}

impl<T> Received<T> {
    pub fn message(self) -> Option<T> {
        match self {
            Received::Message(item) => Some(item),
            Received::Timeout => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Received::Timeout)
    }
}

/// 判断 IO 错误是否为读写超时
///
/// 不同平台上 `set_read_timeout` 到期分别报告 `WouldBlock`（Unix）或 `TimedOut`（Windows）。
pub fn is_timeout_kind(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}

/// 分帧读取器
pub struct FramedReader<R, D> {
    inner: R,
    decoder: D,
    buffer: BytesMut,
}

impl<R: Read, D: Decoder> FramedReader<R, D> {
    pub fn new(inner: R, decoder: D) -> Self {
        Self {
            inner,
            decoder,
            buffer: BytesMut::with_capacity(READ_CHUNK_SIZE),
        }
    }

    /// 接收一条完整消息
    ///
    /// 反复执行部分读取直到解码器给出完整消息。底层读超时返回
    /// `Received::Timeout`，已收到的部分字节保留到下一次调用。
    ///
    /// # Errors
    /// - `ProtocolError::Closed`: 对端在消息边界关闭
    /// - `ProtocolError::Truncated`: 对端在消息中途关闭，部分数据被丢弃
    /// - `ProtocolError::InvalidLength` / `LineTooLong`: 协议违规
    /// - `ProtocolError::Io`: 其他传输错误（如连接重置）
    pub fn recv(&mut self) -> Result<Received<D::Item>, ProtocolError> {
        loop {
            if let Some(item) = self.decoder.decode(&mut self.buffer)? {
                return Ok(Received::Message(item));
            }

            let start = self.buffer.len();
            self.buffer.resize(start + READ_CHUNK_SIZE, 0);
            let result = self.inner.read(&mut self.buffer[start..]);
            let n = *result.as_ref().unwrap_or(&0);
            self.buffer.truncate(start + n);

            match result {
                Ok(0) => {
                    return Err(match self.decoder.partial(&self.buffer) {
                        Some((expected, received)) => {
                            self.buffer.clear();
                            ProtocolError::Truncated { expected, received }
                        },
                        None => ProtocolError::Closed,
                    });
                },
                Ok(_) => {},
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) if is_timeout_kind(e.kind()) => return Ok(Received::Timeout),
                Err(e) => return Err(ProtocolError::Io(e)),
            }
        }
    }

    /// 当前缓冲的未解码字节数
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// 分帧写入器
pub struct FramedWriter<W, E> {
    inner: W,
    encoder: E,
    buffer: BytesMut,
}

impl<W: Write, E> FramedWriter<W, E> {
    pub fn new(inner: W, encoder: E) -> Self {
        Self {
            inner,
            encoder,
            buffer: BytesMut::new(),
        }
    }

    /// 编码并完整发送一条消息
    ///
    /// 对部分写入循环重试，直到全部字节发出或传输层报告硬错误。
    pub fn send<I>(&mut self, item: &I) -> Result<(), ProtocolError>
    where
        I: ?Sized,
        E: Encoder<I>,
    {
        self.buffer.clear();
        self.encoder.encode(item, &mut self.buffer)?;
        write_fully(&mut self.inner, &self.buffer)?;
        self.inner.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

/// 写出全部字节
///
/// `Interrupted` 时重试；写超时、`Ok(0)` 和其他错误均视为硬错误。
pub fn write_fully<W: Write + ?Sized>(writer: &mut W, mut buf: &[u8]) -> Result<(), ProtocolError> {
    while !buf.is_empty() {
        match writer.write(buf) {
            Ok(0) => {
                return Err(ProtocolError::Io(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "transport accepted zero bytes",
                )));
            },
            Ok(n) => buf = &buf[n..],
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
            Err(e) => return Err(ProtocolError::Io(e)),
        }
    }
    Ok(())
}

/// 文本命令读取器
pub type CommandReader<R> = FramedReader<R, LineCodec>;
/// 文本命令写入器
pub type CommandWriter<W> = FramedWriter<W, LineCodec>;
/// 长度前缀帧读取器
pub type FrameReader<R> = FramedReader<R, LengthPrefixedCodec>;
/// 长度前缀帧写入器
pub type FrameWriter<W> = FramedWriter<W, LengthPrefixedCodec>;
