//! 运动命令定义
//!
//! 线上传输的命令名与 [`Command`] 枚举之间的双向映射。

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// 运动命令
///
/// 由命令映射器根据检测结果生成，或从线上字节解析得到；由运动状态机消费。
/// 构造后不可变。
///
/// 未识别的命令文本不会报错，而是解析为 [`Command::Unknown`]，
/// 由状态机按 STOP 处理。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    /// 前进
    Forward,
    /// 后退（线上名称 `BACK`，接收时也接受 `BACKWARD`）
    Back,
    /// 原地左转
    Left,
    /// 原地右转
    Right,
    /// 停止
    Stop,
    /// 停止并释放执行器资源（对会话而言是终态）
    Cleanup,
    /// 无法识别的命令
    Unknown,
}

impl Command {
    /// 所有可在线上发送的命令（不含 `Unknown`）
    pub const WIRE_COMMANDS: [Command; 6] = [
        Command::Forward,
        Command::Back,
        Command::Left,
        Command::Right,
        Command::Stop,
        Command::Cleanup,
    ];

    /// 解析一行命令文本
    ///
    /// 去除首尾空白并转为大写后匹配；任何无法识别的文本都得到 `Unknown`。
    ///
    /// # Example
    ///
    /// ```
    /// use rover_protocol::Command;
    ///
    /// assert_eq!(Command::parse(" forward\r"), Command::Forward);
    /// assert_eq!(Command::parse("backward"), Command::Back);
    /// assert_eq!(Command::parse("jump"), Command::Unknown);
    /// ```
    pub fn parse(text: &str) -> Self {
        match text.trim().to_ascii_uppercase().as_str() {
            "FORWARD" => Command::Forward,
            "BACK" | "BACKWARD" => Command::Back,
            "LEFT" => Command::Left,
            "RIGHT" => Command::Right,
            "STOP" => Command::Stop,
            "CLEANUP" => Command::Cleanup,
            _ => Command::Unknown,
        }
    }

    /// 规范的大写线上名称
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Forward => "FORWARD",
            Command::Back => "BACK",
            Command::Left => "LEFT",
            Command::Right => "RIGHT",
            Command::Stop => "STOP",
            Command::Cleanup => "CLEANUP",
            Command::Unknown => "UNKNOWN",
        }
    }

    /// 是否为驱动电机的命令（前进/后退/转向）
    pub fn is_drive(self) -> bool {
        matches!(
            self,
            Command::Forward | Command::Back | Command::Left | Command::Right
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Command::parse(s))
    }
}
