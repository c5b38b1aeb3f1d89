//! # Rover Protocol
//!
//! 机器人与控制端（PC / 车载检测进程）之间的线协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `command`: 运动命令枚举及线上名称
//! - `constants`: 协议常量（长度上限、分隔符等）
//! - `codec`: 文本命令 / 长度前缀两种分帧的增量编解码器
//! - `framed`: 基于 `Read`/`Write` 的阻塞式分帧读写器
//!
//! ## 分帧
//!
//! ```text
//! 文本命令:   FORWARD\n
//! 长度前缀:   [00 00 1F 40][8000 字节 JPEG]
//! ```
//!
//! 长度前缀使用大端字节序（网络字节序）。

pub mod codec;
pub mod command;
pub mod constants;
pub mod framed;

pub use codec::{Decoder, Encoder, FramingMode, LengthPrefixedCodec, LineCodec};
pub use command::Command;
pub use constants::*;
pub use framed::{
    CommandReader, CommandWriter, FrameReader, FrameWriter, FramedReader, FramedWriter, Received,
    is_timeout_kind, write_fully,
};

use std::io;
use thiserror::Error;

/// 协议错误类型
///
/// 除 `Io` 中的超时外，所有变体对当前会话都是致命的；
/// 超时在 [`FramedReader::recv`] 中已转换为 [`Received::Timeout`]。
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Connection closed by peer")]
    Closed,

    #[error("Connection closed mid-message: expected {expected} bytes, received {received}")]
    Truncated { expected: usize, received: usize },

    #[error("Invalid frame length: {length} (allowed 1..=20000000)")]
    InvalidLength { length: u64 },

    #[error("Command line too long: {length} bytes without delimiter")]
    LineTooLong { length: usize },

    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
}

impl ProtocolError {
    /// 是否为读写超时
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProtocolError::Io(e) if is_timeout_kind(e.kind()))
    }

    /// 对端是否在消息边界正常关闭
    pub fn is_closed(&self) -> bool {
        matches!(self, ProtocolError::Closed)
    }

    /// 是否为协议违规（而非传输错误）
    pub fn is_violation(&self) -> bool {
        matches!(
            self,
            ProtocolError::Truncated { .. }
                | ProtocolError::InvalidLength { .. }
                | ProtocolError::LineTooLong { .. }
        )
    }

    /// 是否应当中止会话
    pub fn is_fatal(&self) -> bool {
        !self.is_timeout()
    }
}
