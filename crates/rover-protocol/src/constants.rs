//! 协议常量定义
//!
//! 集中定义线协议相关的常量，避免在代码中散落"魔法数"。

/// 长度前缀字节数（大端 u32）
pub const LENGTH_PREFIX_LEN: usize = 4;

/// 二进制帧最小负载长度
///
/// 长度为 0 的帧不是合法的空帧，而是协议违规。
pub const MIN_FRAME_LEN: u32 = 1;

/// 二进制帧最大负载长度（20 MB）
///
/// 损坏的长度字段不能导致无界内存增长，超出即中止会话。
pub const MAX_FRAME_LEN: u32 = 20_000_000;

/// 文本命令行终止符
pub const LINE_DELIMITER: u8 = b'\n';

/// 未终止文本行的最大缓冲长度
///
/// 合法命令最长 8 字节，1 KiB 足以容纳任何带空白的命令行。
pub const MAX_LINE_LEN: usize = 1024;

/// 单次 socket 读取的块大小
pub const READ_CHUNK_SIZE: usize = 4 * 1024;
