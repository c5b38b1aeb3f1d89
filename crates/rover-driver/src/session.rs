//! 每连接会话循环
//!
//! 状态：`Connecting → Active → Closing → Closed`（终态）。
//!
//! - 文本命令模式（机器人端）：收到的命令直接交给 [`MotionController`]
//! - 长度前缀模式（检测端）：收到 JPEG 帧 → 检测 → 映射 → 回复文本命令
//!
//! 读超时不是错误：记为一次空闲，循环继续。任何硬错误（IO、协议违规、发送失败）
//! 都进入 `Closing`：关闭 socket，如果本会话拥有执行权则强制停车，然后 `Closed`。
//! 会话从不重试，重连由对端负责。

use crate::fps_stats::{DEFAULT_ALPHA, FpsEstimator};
use crate::mapper::CommandMapper;
use crate::motion::{MotionController, MotionOutcome};
use crate::DriverError;
use rover_hal::{Actuator, Detector, Frame, jpeg};
use rover_protocol::{
    Command, CommandReader, CommandWriter, FrameReader, FramingMode, LengthPrefixedCodec, LineCodec,
    Received,
};
use std::fmt;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn};

/// 多会话共享的运动控制器
pub type SharedMotion = Arc<MotionController<Box<dyn Actuator>>>;
/// 多会话共享的检测器
pub type SharedDetector = Arc<dyn Detector>;

/// 默认读超时
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);
/// 默认写超时
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);
/// 每处理多少个单元输出一次帧率
const FPS_LOG_EVERY: u64 = 30;

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SessionState {
    #[default]
    Connecting = 0,
    Active = 1,
    Closing = 2,
    Closed = 3,
}

impl SessionState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn is_terminal(self) -> bool {
        self == Self::Closed
    }
}

/// 会话状态（原子版本，可在其他线程观察）
#[derive(Debug, Default)]
pub struct AtomicSessionState {
    inner: AtomicU8,
}

impl AtomicSessionState {
    pub fn new(state: SessionState) -> Self {
        Self {
            inner: AtomicU8::new(state.as_u8()),
        }
    }

    pub fn get(&self) -> SessionState {
        SessionState::from_u8(self.inner.load(Ordering::Acquire))
    }

    pub(crate) fn set(&self, state: SessionState) {
        self.inner.store(state.as_u8(), Ordering::Release);
    }
}

/// 会话结束原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// 对端在消息边界关闭
    PeerClosed,
    /// 本地停止标志
    Stopped,
    /// 收到 CLEANUP，执行器已释放
    Cleanup,
    /// 协议违规（长度越界、行过长、消息中途断开）
    ProtocolViolation(String),
    /// 传输层错误（重置、写失败、写超时）
    Transport(String),
    /// 执行器错误或已被释放
    Actuator(String),
}

impl CloseReason {
    pub fn from_error(err: &DriverError) -> Self {
        match err {
            DriverError::Protocol(e) if e.is_closed() => CloseReason::PeerClosed,
            DriverError::Protocol(e) if e.is_violation() => {
                CloseReason::ProtocolViolation(e.to_string())
            },
            DriverError::Hal(_) | DriverError::ActuatorReleased => {
                CloseReason::Actuator(err.to_string())
            },
            _ => CloseReason::Transport(err.to_string()),
        }
    }

    /// 是否为正常结束
    pub fn is_clean(&self) -> bool {
        matches!(
            self,
            CloseReason::PeerClosed | CloseReason::Stopped | CloseReason::Cleanup
        )
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => write!(f, "peer closed"),
            CloseReason::Stopped => write!(f, "stopped"),
            CloseReason::Cleanup => write!(f, "cleanup"),
            CloseReason::ProtocolViolation(msg) => write!(f, "protocol violation: {}", msg),
            CloseReason::Transport(msg) => write!(f, "transport error: {}", msg),
            CloseReason::Actuator(msg) => write!(f, "actuator error: {}", msg),
        }
    }
}

/// 会话结束报告
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub peer: Option<SocketAddr>,
    pub mode: FramingMode,
    /// 处理的单元数（帧或命令）
    pub units: u64,
    /// 发出的命令数
    pub commands_sent: u64,
    /// 读超时次数
    pub idle_timeouts: u64,
    /// 丢弃的过期回复（只有 Streamer 会产生）
    pub stale_replies: u64,
    /// 结束时的平滑帧率
    pub fps: f64,
    pub close_reason: CloseReason,
}

/// 会话参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub fps_alpha: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            fps_alpha: DEFAULT_ALPHA,
        }
    }
}

impl SessionConfig {
    pub(crate) fn apply(&self, stream: &TcpStream) -> std::io::Result<()> {
        stream.set_read_timeout(Some(self.read_timeout))?;
        stream.set_write_timeout(Some(self.write_timeout))?;
        stream.set_nodelay(true)
    }
}

/// 会话处理收到的单元的方式（随部署角色固定）
#[derive(Clone)]
pub enum SessionRole {
    /// 文本命令进，驱动电机
    Robot { motion: SharedMotion },
    /// JPEG 帧进，文本命令出
    Detection {
        detector: SharedDetector,
        mapper: CommandMapper,
    },
}

impl SessionRole {
    pub fn mode(&self) -> FramingMode {
        match self {
            SessionRole::Robot { .. } => FramingMode::TextCommand,
            SessionRole::Detection { .. } => FramingMode::LengthPrefixed,
        }
    }
}

/// 创建会话所需的全部共享状态
#[derive(Clone)]
pub struct SessionContext {
    pub role: SessionRole,
    pub config: SessionConfig,
}

impl SessionContext {
    pub fn robot(motion: SharedMotion) -> Self {
        Self {
            role: SessionRole::Robot { motion },
            config: SessionConfig::default(),
        }
    }

    pub fn detection(detector: SharedDetector, mapper: CommandMapper) -> Self {
        Self {
            role: SessionRole::Detection { detector, mapper },
            config: SessionConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }
}

/// 单元处理后的去向
enum Flow {
    Continue,
    End(CloseReason),
}

#[derive(Default)]
struct Counters {
    units: u64,
    commands_sent: u64,
    idle_timeouts: u64,
}

pub struct Session {
    context: SessionContext,
    state: Arc<AtomicSessionState>,
    stop: Arc<AtomicBool>,
}

impl Session {
    pub fn new(context: SessionContext, stop: Arc<AtomicBool>) -> Self {
        Self {
            context,
            state: Arc::new(AtomicSessionState::default()),
            stop,
        }
    }

    /// 可在其他线程观察的状态句柄
    pub fn state_handle(&self) -> Arc<AtomicSessionState> {
        self.state.clone()
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// 运行会话直到结束；消耗连接
    pub fn run(&self, stream: TcpStream) -> SessionReport {
        let mode = self.context.role.mode();
        let peer = stream.peer_addr().ok();
        let peer_label = peer.map(|p| p.to_string()).unwrap_or_else(|| "?".into());
        let span = info_span!("session", peer = %peer_label, mode = mode.as_str());
        let _enter = span.enter();

        self.state.set(SessionState::Connecting);
        let mut counters = Counters::default();
        let mut fps = FpsEstimator::new(self.context.config.fps_alpha);

        let close_reason = match self.context.config.apply(&stream) {
            Ok(()) => {
                self.state.set(SessionState::Active);
                info!("Session active");
                match &self.context.role {
                    SessionRole::Robot { motion } => {
                        self.run_robot(&stream, motion, &mut counters, &mut fps)
                    },
                    SessionRole::Detection { detector, mapper } => {
                        self.run_detection(&stream, detector.as_ref(), mapper, &mut counters, &mut fps)
                    },
                }
            },
            Err(e) => CloseReason::Transport(format!("socket setup failed: {}", e)),
        };

        self.close(&stream, &close_reason);

        let report = SessionReport {
            peer,
            mode,
            units: counters.units,
            commands_sent: counters.commands_sent,
            idle_timeouts: counters.idle_timeouts,
            stale_replies: 0,
            fps: fps.fps(),
            close_reason,
        };
        if report.close_reason.is_clean() {
            info!(
                "Session closed ({}): {} units, {:.1} fps",
                report.close_reason, report.units, report.fps
            );
        } else {
            error!(
                "Session aborted ({}): {} units, {:.1} fps",
                report.close_reason, report.units, report.fps
            );
        }
        report
    }

    fn close(&self, stream: &TcpStream, reason: &CloseReason) {
        self.state.set(SessionState::Closing);
        if let Err(e) = stream.shutdown(Shutdown::Both) {
            debug!("Socket shutdown: {}", e);
        }
        // 机器人端会话拥有执行权：无论何种退出都回到 NEUTRAL
        if let SessionRole::Robot { motion } = &self.context.role
            && *reason != CloseReason::Cleanup
            && let Err(e) = motion.stop()
        {
            warn!("Failed to stop motors on session close: {}", e);
        }
        self.state.set(SessionState::Closed);
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn run_robot(
        &self,
        stream: &TcpStream,
        motion: &SharedMotion,
        counters: &mut Counters,
        fps: &mut FpsEstimator,
    ) -> CloseReason {
        let mut reader = CommandReader::new(stream, LineCodec::new());
        while !self.stopped() {
            let command = match reader.recv() {
                Ok(Received::Message(command)) => command,
                Ok(Received::Timeout) => {
                    counters.idle_timeouts += 1;
                    continue;
                },
                Err(e) => return CloseReason::from_error(&DriverError::from(e)),
            };

            match self.drive(motion, command, counters, fps) {
                Flow::Continue => {},
                Flow::End(reason) => return reason,
            }
        }
        CloseReason::Stopped
    }

    fn drive(
        &self,
        motion: &SharedMotion,
        command: Command,
        counters: &mut Counters,
        fps: &mut FpsEstimator,
    ) -> Flow {
        counters.units += 1;
        let rate = fps.tick(Instant::now());
        if counters.units % FPS_LOG_EVERY == 0 {
            debug!("{} commands, {:.1} cmd/s", counters.units, rate);
        }

        match motion.apply(command) {
            Ok(MotionOutcome::Released) => Flow::End(CloseReason::Cleanup),
            Ok(outcome) => {
                debug!("{} -> {:?}", command, outcome);
                Flow::Continue
            },
            Err(e) => Flow::End(CloseReason::from_error(&e)),
        }
    }

    fn run_detection(
        &self,
        stream: &TcpStream,
        detector: &dyn Detector,
        mapper: &CommandMapper,
        counters: &mut Counters,
        fps: &mut FpsEstimator,
    ) -> CloseReason {
        let mut reader = FrameReader::new(stream, LengthPrefixedCodec::new());
        let mut writer = CommandWriter::new(stream, LineCodec::new());
        let mut sequence = 0u64;

        while !self.stopped() {
            let payload = match reader.recv() {
                Ok(Received::Message(payload)) => payload,
                Ok(Received::Timeout) => {
                    counters.idle_timeouts += 1;
                    continue;
                },
                Err(e) => return CloseReason::from_error(&DriverError::from(e)),
            };

            sequence += 1;
            let (width, height) = match jpeg::decode_dimensions(&payload) {
                Ok(dims) => dims,
                Err(e) => {
                    debug!("Frame #{}: unknown dimensions ({})", sequence, e);
                    (0, 0)
                },
            };
            let frame = Frame::jpeg(width, height, payload).with_sequence(sequence);

            let command = match detector.infer(&frame) {
                Ok(detections) => mapper.map_detections(&detections, frame.width),
                Err(e) => {
                    warn!("Detection failed on frame #{}: {}", sequence, e);
                    Command::Stop
                },
            };

            if let Err(e) = writer.send(&command) {
                return CloseReason::from_error(&DriverError::from(e));
            }
            counters.commands_sent += 1;
            counters.units += 1;

            let rate = fps.tick(Instant::now());
            if counters.units % FPS_LOG_EVERY == 0 {
                info!("{} frames, {:.1} fps", counters.units, rate);
            }
            debug!("Frame #{} ({} bytes) -> {}", sequence, frame.data.len(), command);
        }
        CloseReason::Stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_protocol::ProtocolError;

    #[test]
    fn test_state_roundtrip() {
        let state = AtomicSessionState::default();
        assert_eq!(state.get(), SessionState::Connecting);
        for s in [SessionState::Active, SessionState::Closing, SessionState::Closed] {
            state.set(s);
            assert_eq!(state.get(), s);
        }
        assert!(SessionState::Closed.is_terminal());
        assert_eq!(SessionState::from_u8(200), SessionState::Closed);
    }

    #[test]
    fn test_close_reason_classification() {
        let closed = DriverError::from(ProtocolError::Closed);
        assert_eq!(CloseReason::from_error(&closed), CloseReason::PeerClosed);

        let violation = DriverError::from(ProtocolError::InvalidLength { length: 0 });
        assert!(matches!(
            CloseReason::from_error(&violation),
            CloseReason::ProtocolViolation(_)
        ));

        let reset = DriverError::from(ProtocolError::Io(std::io::Error::from(
            std::io::ErrorKind::ConnectionReset,
        )));
        let reason = CloseReason::from_error(&reset);
        assert!(matches!(reason, CloseReason::Transport(_)));
        assert!(!reason.is_clean());

        assert!(matches!(
            CloseReason::from_error(&DriverError::ActuatorReleased),
            CloseReason::Actuator(_)
        ));
    }

    #[test]
    fn test_role_fixes_framing_mode() {
        let role = SessionRole::Detection {
            detector: Arc::new(rover_hal::NullDetector),
            mapper: CommandMapper::default(),
        };
        assert_eq!(role.mode(), FramingMode::LengthPrefixed);
    }
}
