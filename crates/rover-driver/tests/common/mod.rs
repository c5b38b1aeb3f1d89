//! 集成测试公共工具
#![allow(dead_code)]

use bytes::Bytes;
use rover_driver::{
    MotionConfig, MotionController, Server, ServerStats, SessionConfig, SessionContext, SessionReport,
    SharedMotion, ShutdownHandle,
};
use rover_hal::mock::MockActuator;
use rover_hal::{Actuator, Frame, FrameEncoding, jpeg};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// 条件在 2 秒内成立，否则测试失败
pub fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for: {}", what);
        thread::sleep(Duration::from_millis(5));
    }
}

pub fn raw_frame(seq: u64, width: u32, height: u32) -> Frame {
    Frame::new(width, height, FrameEncoding::Bgr8, vec![90u8; (width * height * 3) as usize]).with_sequence(seq)
}

/// 一张小 JPEG
pub fn jpeg_payload(width: u32, height: u32) -> Bytes {
    jpeg::encode(&raw_frame(0, width, height), 80, 0).unwrap()
}

pub fn fast_session_config() -> SessionConfig {
    SessionConfig {
        read_timeout: Duration::from_millis(100),
        write_timeout: Duration::from_millis(500),
        ..SessionConfig::default()
    }
}

/// 使用 MockActuator 的共享运动控制器
pub fn mock_motion() -> (MockActuator, SharedMotion) {
    let observer = MockActuator::new();
    let actuator: Box<dyn Actuator> = Box::new(observer.clone());
    let motion = MotionController::new(actuator, MotionConfig::default()).unwrap();
    observer.clear_calls();
    (observer, Arc::new(motion))
}

pub struct RunningServer {
    pub addr: SocketAddr,
    pub shutdown: ShutdownHandle,
    pub reports: crossbeam_channel::Receiver<SessionReport>,
    pub stats: Arc<ServerStats>,
    handle: Option<JoinHandle<()>>,
}

impl RunningServer {
    pub fn start(context: SessionContext) -> Self {
        let server = Server::bind("127.0.0.1:0", context).unwrap();
        let addr = server.local_addr();
        let shutdown = server.shutdown_handle();
        let reports = server.reports();
        let stats = server.stats();
        let handle = thread::spawn(move || server.run().unwrap());
        Self {
            addr,
            shutdown,
            reports,
            stats,
            handle: Some(handle),
        }
    }

    pub fn next_report(&self) -> SessionReport {
        self.reports
            .recv_timeout(Duration::from_secs(3))
            .expect("session report")
    }

    pub fn stop(mut self) {
        self.shutdown.shutdown();
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.shutdown.shutdown();
    }
}
