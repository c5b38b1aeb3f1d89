//! 编解码器的属性测试
//!
//! 使用 proptest 验证分帧在任意 TCP 分段下的正确性。

use bytes::BytesMut;
use proptest::prelude::*;
use rover_protocol::*;
use std::io::{self, Read};

/// 按给定分段大小依次返回数据的读取器
struct SegmentedReader {
    data: Vec<u8>,
    pos: usize,
    segments: Vec<usize>,
    next: usize,
}

impl Read for SegmentedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.data.len() {
            return Ok(0);
        }
        let segment = self.segments[self.next % self.segments.len()].max(1);
        self.next += 1;
        let n = segment.min(buf.len()).min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

fn command_strategy() -> impl Strategy<Value = Command> {
    prop::sample::select(Command::WIRE_COMMANDS.to_vec())
}

proptest! {
    /// 任意负载经任意分段传输后逐字节还原
    #[test]
    fn payloads_survive_arbitrary_segmentation(
        payloads in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..2048), 1..8),
        segments in prop::collection::vec(1usize..700, 1..16),
    ) {
        let mut wire = BytesMut::new();
        let mut codec = LengthPrefixedCodec::new();
        for payload in &payloads {
            codec.encode(&payload[..], &mut wire).unwrap();
        }

        let reader = SegmentedReader { data: wire.to_vec(), pos: 0, segments, next: 0 };
        let mut framed = FrameReader::new(reader, LengthPrefixedCodec::new());
        for payload in &payloads {
            let received = framed.recv().unwrap().message().unwrap();
            prop_assert_eq!(received.len(), payload.len());
            prop_assert_eq!(&received[..], &payload[..]);
        }
        prop_assert!(framed.recv().unwrap_err().is_closed());
    }

    /// 命令序列经任意分段传输后按序还原
    #[test]
    fn commands_survive_arbitrary_segmentation(
        commands in prop::collection::vec(command_strategy(), 1..32),
        segments in prop::collection::vec(1usize..12, 1..8),
    ) {
        let mut wire = BytesMut::new();
        let mut codec = LineCodec::new();
        for cmd in &commands {
            codec.encode(cmd, &mut wire).unwrap();
        }

        let reader = SegmentedReader { data: wire.to_vec(), pos: 0, segments, next: 0 };
        let mut framed = CommandReader::new(reader, LineCodec::new());
        for cmd in &commands {
            prop_assert_eq!(framed.recv().unwrap(), Received::Message(*cmd));
        }
    }

    /// 任意文本行都能解码，绝不报错
    #[test]
    fn any_line_decodes_without_error(line in "[^\n]{0,64}") {
        let mut buf = BytesMut::from(line.as_bytes());
        buf.extend_from_slice(b"\n");
        let decoded = LineCodec::new().decode(&mut buf).unwrap().unwrap();
        prop_assert_eq!(decoded, Command::parse(&line));
        prop_assert!(buf.is_empty());
    }

    /// 非法长度头总被拒绝，且不消费长度头之后的字节
    #[test]
    fn invalid_length_prefix_rejected(
        length in prop_oneof![Just(0u32), (MAX_FRAME_LEN + 1)..=u32::MAX],
        tail in prop::collection::vec(any::<u8>(), 0..64),
    ) {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&length.to_be_bytes());
        buf.extend_from_slice(&tail);
        let before = buf.len();

        let err = LengthPrefixedCodec::new().decode(&mut buf).unwrap_err();
        let is_invalid_length = matches!(err, ProtocolError::InvalidLength { .. });
        prop_assert!(is_invalid_length);
        prop_assert_eq!(buf.len(), before);
    }
}
