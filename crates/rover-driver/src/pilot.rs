//! Pilot：本地采集 + 本地检测，向机器人发送文本命令

use crate::capture::CaptureThread;
use crate::client::ClientConfig;
use crate::fps_stats::FpsEstimator;
use crate::mapper::CommandMapper;
use crate::session::{AtomicSessionState, CloseReason, SessionReport, SessionState, SharedDetector};
use crate::DriverError;
use rover_protocol::{Command, CommandWriter, FramingMode, LineCodec};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn};

const FPS_LOG_EVERY: u64 = 30;

pub struct Pilot {
    capture: CaptureThread,
    detector: SharedDetector,
    mapper: CommandMapper,
    config: ClientConfig,
    stop: Arc<AtomicBool>,
    state: Arc<AtomicSessionState>,
}

impl Pilot {
    pub fn new(
        capture: CaptureThread,
        detector: SharedDetector,
        mapper: CommandMapper,
        config: ClientConfig,
        stop: Arc<AtomicBool>,
    ) -> Self {
        Self {
            capture,
            detector,
            mapper,
            config,
            stop,
            state: Arc::new(AtomicSessionState::default()),
        }
    }

    pub fn state_handle(&self) -> Arc<AtomicSessionState> {
        self.state.clone()
    }

    /// 运行直到停止标志置位或发送失败；结束时停止采集并关闭连接
    pub fn run(mut self, stream: TcpStream) -> SessionReport {
        let peer = stream.peer_addr().ok();
        let peer_label = peer.map(|p| p.to_string()).unwrap_or_else(|| "?".into());
        let span = info_span!("pilot", peer = %peer_label);
        let _enter = span.enter();

        let mut fps = FpsEstimator::new(self.config.session.fps_alpha);
        let mut report = SessionReport {
            peer,
            mode: FramingMode::TextCommand,
            units: 0,
            commands_sent: 0,
            idle_timeouts: 0,
            stale_replies: 0,
            fps: 0.0,
            close_reason: CloseReason::Stopped,
        };

        report.close_reason = match self.config.session.apply(&stream) {
            Ok(()) => {
                self.state.set(SessionState::Active);
                self.drive_loop(&stream, &mut fps, &mut report)
            },
            Err(e) => CloseReason::Transport(format!("socket setup failed: {}", e)),
        };

        self.state.set(SessionState::Closing);
        let _ = stream.shutdown(Shutdown::Both);
        if let Err(e) = self.capture.stop() {
            warn!("Capture shutdown: {}", e);
        }
        self.state.set(SessionState::Closed);

        report.fps = fps.fps();
        if report.close_reason.is_clean() {
            info!("Pilot finished ({}): {} commands sent", report.close_reason, report.commands_sent);
        } else {
            error!("Pilot aborted ({}): {} commands sent", report.close_reason, report.commands_sent);
        }
        report
    }

    fn drive_loop(&self, stream: &TcpStream, fps: &mut FpsEstimator, report: &mut SessionReport) -> CloseReason {
        let mut writer = CommandWriter::new(stream, LineCodec::new());
        let buffer = self.capture.buffer().clone();
        let mut seen = 0;

        while !self.stop.load(Ordering::Acquire) {
            let Some((pushed, frame)) = buffer.pop_newer(seen, self.config.frame_timeout) else {
                warn!("No frame received within {:?}", self.config.frame_timeout);
                report.idle_timeouts += 1;
                thread::sleep(self.config.retry_delay);
                continue;
            };
            seen = pushed;

            let command = match self.detector.infer(&frame) {
                Ok(detections) => self.mapper.map_detections(&detections, frame.width),
                Err(e) => {
                    warn!("Detection failed on frame #{}: {}", frame.sequence, e);
                    Command::Stop
                },
            };

            if let Err(e) = writer.send(&command) {
                return CloseReason::from_error(&DriverError::from(e));
            }
            report.commands_sent += 1;
            report.units += 1;

            let rate = fps.tick(Instant::now());
            if report.units % FPS_LOG_EVERY == 0 {
                info!("{} frames, {:.1} fps, last command {}", report.units, rate, command);
            }
            debug!("Frame #{} -> {}", frame.sequence, command);
        }
        CloseReason::Stopped
    }
}
