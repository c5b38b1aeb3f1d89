//! Streamer：机器人端采集并发送 JPEG 帧，执行检测端回复的命令
//!
//! 每帧一问一答：发送长度前缀帧，然后在读超时内等待一行命令。
//! 超时视为 UNKNOWN（回到 NEUTRAL），循环继续。任何硬错误都先停车再退出。
//!
//! 对端按顺序对每帧回复一行。超时帧的回复之后仍会到达，记为未决；
//! 读到的回复先抵消未决数再作为当前帧的命令，使命令始终对应最新发送的帧。
//! CLEANUP 不会被当作过期回复丢弃。

use crate::capture::CaptureThread;
use crate::client::ClientConfig;
use crate::fps_stats::FpsEstimator;
use crate::motion::MotionOutcome;
use crate::session::{AtomicSessionState, CloseReason, SessionReport, SessionState, SharedMotion};
use crate::DriverError;
use rover_hal::jpeg;
use rover_protocol::{Command, CommandReader, FrameWriter, FramingMode, LengthPrefixedCodec, LineCodec, Received};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn};

const FPS_LOG_EVERY: u64 = 30;

/// JPEG 编码参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSettings {
    /// 1-100
    pub quality: u8,
    /// 长边上限（0 = 不缩放）
    pub max_side: u32,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            quality: jpeg::DEFAULT_QUALITY,
            max_side: 320,
        }
    }
}

/// 离开作用域时强制停车（已释放的控制器上是空操作）
struct StopOnDrop<'a>(&'a SharedMotion);

impl Drop for StopOnDrop<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.0.stop() {
            warn!("Failed to stop motors: {}", e);
        }
    }
}

pub struct Streamer {
    capture: CaptureThread,
    motion: SharedMotion,
    encode: EncodeSettings,
    config: ClientConfig,
    stop: Arc<AtomicBool>,
    state: Arc<AtomicSessionState>,
}

impl Streamer {
    pub fn new(
        capture: CaptureThread,
        motion: SharedMotion,
        encode: EncodeSettings,
        config: ClientConfig,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            capture,
            motion,
            encode,
            config,
            stop,
            state: Arc::new(AtomicSessionState::default()),
        }
    }

    pub fn state_handle(&self) -> Arc<AtomicSessionState> {
        self.state.clone()
    }

    pub fn run(mut self, stream: TcpStream) -> SessionReport {
        let peer = stream.peer_addr().ok();
        let peer_label = peer.map(|p| p.to_string()).unwrap_or_else(|| "?".into());
        let span = info_span!("stream", peer = %peer_label);
        let _enter = span.enter();

        let mut fps = FpsEstimator::new(self.config.session.fps_alpha);
        let mut report = SessionReport {
            peer,
            mode: FramingMode::LengthPrefixed,
            units: 0,
            commands_sent: 0,
            idle_timeouts: 0,
            stale_replies: 0,
            fps: 0.0,
            close_reason: CloseReason::Stopped,
        };

        {
            let _guard = StopOnDrop(&self.motion);
            report.close_reason = match self.config.session.apply(&stream) {
                Ok(()) => {
                    self.state.set(SessionState::Active);
                    self.stream_loop(&stream, &mut fps, &mut report)
                },
                Err(e) => CloseReason::Transport(format!("socket setup failed: {}", e)),
            };
            self.state.set(SessionState::Closing);
        }

        let _ = stream.shutdown(Shutdown::Both);
        if let Err(e) = self.capture.stop() {
            warn!("Capture shutdown: {}", e);
        }
        self.state.set(SessionState::Closed);

        report.fps = fps.fps();
        if report.close_reason.is_clean() {
            info!("Streamer finished ({}): {} frames sent", report.close_reason, report.units);
        } else {
            error!("Streamer aborted ({}): {} frames sent", report.close_reason, report.units);
        }
        report
    }

    fn stream_loop(&self, stream: &TcpStream, fps: &mut FpsEstimator, report: &mut SessionReport) -> CloseReason {
        let mut writer = FrameWriter::new(stream, LengthPrefixedCodec::new());
        let mut reader = CommandReader::new(stream, LineCodec::new());
        let buffer = self.capture.buffer().clone();
        let mut seen = 0;
        // 已超时、回复尚未到达的帧数
        let mut outstanding: u64 = 0;

        while !self.stop.load(Ordering::Acquire) {
            let Some((pushed, frame)) = buffer.pop_newer(seen, self.config.frame_timeout) else {
                warn!("No frame received within {:?}", self.config.frame_timeout);
                report.idle_timeouts += 1;
                thread::sleep(self.config.retry_delay);
                continue;
            };
            seen = pushed;

            let payload = match jpeg::encode(&frame, self.encode.quality, self.encode.max_side) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!("JPEG encode failed on frame #{}: {}", frame.sequence, e);
                    continue;
                },
            };
            if let Err(e) = writer.send(&payload) {
                return CloseReason::from_error(&DriverError::from(e));
            }
            report.units += 1;

            let command = loop {
                match reader.recv() {
                    Ok(Received::Message(stale)) if outstanding > 0 && stale != Command::Cleanup => {
                        outstanding -= 1;
                        report.stale_replies += 1;
                        debug!("Discarded late reply {} ({} still outstanding)", stale, outstanding);
                    },
                    Ok(Received::Message(command)) => break command,
                    Ok(Received::Timeout) => {
                        warn!("No command reply within {:?}", self.config.session.read_timeout);
                        report.idle_timeouts += 1;
                        outstanding += 1;
                        break Command::Unknown;
                    },
                    Err(e) => return CloseReason::from_error(&DriverError::from(e)),
                }
            };

            match self.motion.apply(command) {
                Ok(MotionOutcome::Released) => return CloseReason::Cleanup,
                Ok(outcome) => debug!("Frame #{} ({} bytes) -> {} {:?}", frame.sequence, payload.len(), command, outcome),
                Err(e) => return CloseReason::from_error(&e),
            }

            let rate = fps.tick(Instant::now());
            if report.units % FPS_LOG_EVERY == 0 {
                info!("{} frames, {:.1} fps", report.units, rate);
            }
        }
        CloseReason::Stopped
    }
}
