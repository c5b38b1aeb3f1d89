//! 帧编解码
//!
//! 两种互不混用的分帧方式：
//!
//! - **文本命令**：`<COMMAND>\n`，见 [`LineCodec`]
//! - **长度前缀**：`[4 字节大端长度 L][L 字节负载]`，见 [`LengthPrefixedCodec`]
//!
//! 解码器是增量式的：每次调用只消费已经完整到达的消息，未完成的字节
//! 留在缓冲区中，等下一次读取后继续。这样读超时发生在消息中途时不会丢失同步。

use crate::ProtocolError;
use crate::command::Command;
use crate::constants::*;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::warn;

/// 分帧模式
///
/// 每个端点角色固定使用一种模式，连接建立后不再协商。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingMode {
    /// 换行分隔的文本命令
    TextCommand,
    /// 4 字节大端长度前缀 + 二进制负载（JPEG 帧）
    LengthPrefixed,
}

impl FramingMode {
    pub fn as_str(self) -> &'static str {
        match self {
            FramingMode::TextCommand => "text",
            FramingMode::LengthPrefixed => "length-prefixed",
        }
    }
}

/// 增量解码器
pub trait Decoder {
    type Item;

    /// 尝试从缓冲区解出一条完整消息
    ///
    /// - `Ok(Some(item))`: 解出一条消息，对应字节已从 `src` 中移除
    /// - `Ok(None)`: 数据不足，需要继续读取
    /// - `Err(_)`: 协议违规，会话应当中止
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, ProtocolError>;

    /// 连接关闭时是否存在未完成的消息
    ///
    /// 返回 `(期望字节数, 已收到字节数)`；消息边界处关闭返回 `None`。
    fn partial(&self, src: &BytesMut) -> Option<(usize, usize)>;
}

/// 编码器
pub trait Encoder<Item: ?Sized> {
    fn encode(&mut self, item: &Item, dst: &mut BytesMut) -> Result<(), ProtocolError>;
}

// ============================================================================
// 文本命令
// ============================================================================

/// 文本命令编解码器
///
/// 接收端按 `\n` 切分，跨 TCP 分段的命令会先拼接完整再解析；
/// 未识别的命令解析为 [`Command::Unknown`] 并记录警告，不视为错误。
#[derive(Debug, Default, Clone)]
pub struct LineCodec {
    /// 已扫描过、确认不含分隔符的字节数（避免重复扫描）
    scanned: usize,
}

impl LineCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for LineCodec {
    type Item = Command;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Command>, ProtocolError> {
        let start = self.scanned.min(src.len());
        match src[start..].iter().position(|b| *b == LINE_DELIMITER) {
            Some(offset) => {
                let line = src.split_to(start + offset + 1);
                self.scanned = 0;

                let text = String::from_utf8_lossy(&line[..line.len() - 1]);
                let command = Command::parse(&text);
                if command == Command::Unknown {
                    warn!("Unknown command: {:?}", text.trim());
                }
                Ok(Some(command))
            },
            None => {
                if src.len() > MAX_LINE_LEN {
                    return Err(ProtocolError::LineTooLong { length: src.len() });
                }
                self.scanned = src.len();
                Ok(None)
            },
        }
    }

    fn partial(&self, src: &BytesMut) -> Option<(usize, usize)> {
        if src.is_empty() {
            None
        } else {
            Some((src.len() + 1, src.len()))
        }
    }
}

impl Encoder<Command> for LineCodec {
    fn encode(&mut self, item: &Command, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let name = item.as_str();
        dst.reserve(name.len() + 1);
        dst.put_slice(name.as_bytes());
        dst.put_u8(LINE_DELIMITER);
        Ok(())
    }
}

// ============================================================================
// 长度前缀帧
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// 等待 4 字节长度头
    Header,
    /// 已读长度头，等待指定字节数的负载
    Payload(usize),
}

/// 长度前缀编解码器
///
/// 长度头在收到的第一时间就做校验：`L` 不在 `[1, 20_000_000]` 内时立刻返回
/// [`ProtocolError::InvalidLength`]，不会继续消费后续字节。
#[derive(Debug, Clone)]
pub struct LengthPrefixedCodec {
    state: DecodeState,
}

impl LengthPrefixedCodec {
    pub fn new() -> Self {
        Self {
            state: DecodeState::Header,
        }
    }

    /// 校验负载长度是否合法
    pub fn check_length(length: u64) -> Result<usize, ProtocolError> {
        if (u64::from(MIN_FRAME_LEN)..=u64::from(MAX_FRAME_LEN)).contains(&length) {
            Ok(length as usize)
        } else {
            Err(ProtocolError::InvalidLength { length })
        }
    }
}

impl Default for LengthPrefixedCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LengthPrefixedCodec {
    type Item = Bytes;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>, ProtocolError> {
        if self.state == DecodeState::Header {
            if src.len() < LENGTH_PREFIX_LEN {
                return Ok(None);
            }
            let header = [src[0], src[1], src[2], src[3]];
            let length = Self::check_length(u64::from(u32::from_be_bytes(header)))?;

            src.advance(LENGTH_PREFIX_LEN);
            // 一次性预留，避免大帧逐块扩容
            src.reserve(length.saturating_sub(src.len()));
            self.state = DecodeState::Payload(length);
        }

        match self.state {
            DecodeState::Payload(length) if src.len() >= length => {
                self.state = DecodeState::Header;
                Ok(Some(src.split_to(length).freeze()))
            },
            _ => Ok(None),
        }
    }

    fn partial(&self, src: &BytesMut) -> Option<(usize, usize)> {
        match self.state {
            DecodeState::Header if src.is_empty() => None,
            DecodeState::Header => Some((LENGTH_PREFIX_LEN, src.len())),
            DecodeState::Payload(length) => Some((length, src.len())),
        }
    }
}

impl Encoder<[u8]> for LengthPrefixedCodec {
    fn encode(&mut self, item: &[u8], dst: &mut BytesMut) -> Result<(), ProtocolError> {
        let length = Self::check_length(item.len() as u64)?;
        dst.reserve(LENGTH_PREFIX_LEN + length);
        dst.put_u32(length as u32);
        dst.put_slice(item);
        Ok(())
    }
}

impl Encoder<Bytes> for LengthPrefixedCodec {
    fn encode(&mut self, item: &Bytes, dst: &mut BytesMut) -> Result<(), ProtocolError> {
        Encoder::<[u8]>::encode(self, item.as_ref(), dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_line(cmd: Command) -> BytesMut {
        let mut buf = BytesMut::new();
        LineCodec::new().encode(&cmd, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_line_encode_is_canonical() {
        assert_eq!(&encode_line(Command::Forward)[..], b"FORWARD\n");
        assert_eq!(&encode_line(Command::Back)[..], b"BACK\n");
        assert_eq!(&encode_line(Command::Cleanup)[..], b"CLEANUP\n");
    }

    #[test]
    fn test_line_roundtrip_all_commands() {
        let mut codec = LineCodec::new();
        for cmd in Command::WIRE_COMMANDS {
            let mut buf = encode_line(cmd);
            assert_eq!(codec.decode(&mut buf).unwrap(), Some(cmd));
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_line_split_across_segments() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"FOR"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(codec.partial(&buf), Some((4, 3)));

        buf.extend_from_slice(b"WARD\nle");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Command::Forward));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(&buf[..], b"le");

        buf.extend_from_slice(b"ft\r\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Command::Left));
        assert_eq!(codec.partial(&buf), None);
    }

    #[test]
    fn test_line_multiple_commands_in_one_read() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"stop\nRIGHT\n  back  \n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Command::Stop));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Command::Right));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Command::Back));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_line_unknown_is_not_error() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&b"DANCE\n\n\xff\xfe\n"[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Command::Unknown));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Command::Unknown));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Command::Unknown));
    }

    #[test]
    fn test_line_too_long() {
        let mut codec = LineCodec::new();
        let mut buf = BytesMut::from(&vec![b'A'; MAX_LINE_LEN + 1][..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::LineTooLong { .. })
        ));
    }

    #[test]
    fn test_length_prefixed_encode_layout() {
        let mut buf = BytesMut::new();
        LengthPrefixedCodec::new().encode(&b"abc"[..], &mut buf).unwrap();
        assert_eq!(&buf[..], &[0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_length_prefixed_encode_rejects_empty() {
        let mut buf = BytesMut::new();
        let err = LengthPrefixedCodec::new().encode(&b""[..], &mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidLength { length: 0 }));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_length_prefixed_incremental_decode() {
        let mut codec = LengthPrefixedCodec::new();
        let mut buf = BytesMut::from(&[0u8, 0][..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(codec.partial(&buf), Some((4, 2)));

        buf.extend_from_slice(&[0, 5, 1, 2]);
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
        assert_eq!(codec.partial(&buf), Some((5, 2)));

        buf.extend_from_slice(&[3, 4, 5, 0, 0]);
        let payload = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&payload[..], &[1, 2, 3, 4, 5]);
        // 下一帧的部分长度头保留在缓冲区
        assert_eq!(&buf[..], &[0, 0]);
    }

    #[test]
    fn test_zero_length_is_violation() {
        let mut codec = LengthPrefixedCodec::new();
        let mut buf = BytesMut::from(&[0u8, 0, 0, 0, 9, 9][..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidLength { length: 0 }));
        // 长度头未被消费
        assert_eq!(buf.len(), 6);
    }

    #[test]
    fn test_oversized_length_is_violation() {
        let mut codec = LengthPrefixedCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32(MAX_FRAME_LEN + 1);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidLength { length } if length == u64::from(MAX_FRAME_LEN) + 1
        ));

        let mut buf = BytesMut::from(&[0xFFu8, 0xFF, 0xFF, 0xFF][..]);
        assert!(LengthPrefixedCodec::new().decode(&mut buf).is_err());
    }

    #[test]
    fn test_max_length_accepted() {
        let payload = vec![0xABu8; MAX_FRAME_LEN as usize];
        let mut buf = BytesMut::new();
        LengthPrefixedCodec::new().encode(&payload[..], &mut buf).unwrap();

        let mut codec = LengthPrefixedCodec::new();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.len(), MAX_FRAME_LEN as usize);
        assert_eq!(decoded[0], 0xAB);
        assert!(buf.is_empty());
    }
}
