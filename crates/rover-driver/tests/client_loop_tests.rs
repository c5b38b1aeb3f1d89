//! Pilot / Streamer 端到端测试

mod common;

use common::{RunningServer, fast_session_config, mock_motion, wait_until};
use rover_driver::{
    CaptureThread, ClientConfig, CloseReason, CommandMapper, Direction, EncodeSettings, FrameBuffer,
    Pilot, SessionContext, SessionState, Streamer, connect,
};
use rover_hal::mock::ScriptedDetector;
use rover_hal::{BoundingBox, Detection, PwmChannel, SyntheticSource};
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

fn client_config() -> ClientConfig {
    ClientConfig {
        frame_timeout: Duration::from_millis(200),
        retry_delay: Duration::from_millis(10),
        connect_timeout: Duration::from_secs(1),
        session: fast_session_config(),
    }
}

fn synthetic_capture() -> CaptureThread {
    let buffer = Arc::new(FrameBuffer::new(1).unwrap());
    CaptureThread::spawn(SyntheticSource::new(64, 48, 50.0), buffer).unwrap()
}

fn forward_detector() -> ScriptedDetector {
    let bbox = BoundingBox::new(20.0, 10.0, 20.0, 20.0);
    ScriptedDetector::new().with_fallback(vec![Detection::new(0, 0.9, bbox)])
}

#[test]
fn test_pilot_drives_robot_server() {
    let (observer, motion) = mock_motion();
    let server = RunningServer::start(SessionContext::robot(motion.clone()).with_config(fast_session_config()));

    let stop = Arc::new(AtomicBool::new(false));
    let detector = forward_detector();
    let pilot = Pilot::new(
        synthetic_capture(),
        Arc::new(detector.clone()),
        CommandMapper::default(),
        client_config(),
        stop.clone(),
    );
    let pilot_state = pilot.state_handle();
    let stream = connect(server.addr, Duration::from_secs(1)).unwrap();
    let handle = thread::spawn(move || pilot.run(stream));

    wait_until("robot moving forward", || motion.state().direction == Direction::Forward);
    assert_eq!(observer.duty(PwmChannel::A), 70);
    assert_eq!(pilot_state.get(), SessionState::Active);

    stop.store(true, Ordering::Release);
    let report = handle.join().unwrap();
    assert_eq!(report.close_reason, CloseReason::Stopped);
    assert!(report.commands_sent >= 1);
    assert!(detector.calls() as u64 >= report.commands_sent);
    assert_eq!(pilot_state.get(), SessionState::Closed);

    // 机器人端会话看到对端关闭后停车
    let robot_report = server.next_report();
    assert_eq!(robot_report.close_reason, CloseReason::PeerClosed);
    assert!(motion.state().is_neutral());
    server.stop();
}

#[test]
fn test_pilot_ends_when_robot_goes_away() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let pilot = Pilot::new(
        synthetic_capture(),
        Arc::new(forward_detector()),
        CommandMapper::default(),
        client_config(),
        stop,
    );
    let stream = connect(addr, Duration::from_secs(1)).unwrap();
    let handle = thread::spawn(move || pilot.run(stream));

    let (peer, _) = listener.accept().unwrap();
    let mut reader = BufReader::new(peer);
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    assert_eq!(line, "FORWARD\n");
    drop(reader);

    let report = handle.join().unwrap();
    assert!(!report.close_reason.is_clean(), "{:?}", report.close_reason);
}

#[test]
fn test_streamer_round_trip_with_detection_server() {
    let detector = forward_detector();
    let server = RunningServer::start(
        SessionContext::detection(Arc::new(detector.clone()), CommandMapper::default())
            .with_config(fast_session_config()),
    );

    let (observer, motion) = mock_motion();
    let stop = Arc::new(AtomicBool::new(false));
    let streamer = Streamer::new(
        synthetic_capture(),
        motion.clone(),
        EncodeSettings {
            quality: 60,
            max_side: 32,
        },
        client_config(),
        stop.clone(),
    );
    let stream = connect(server.addr, Duration::from_secs(1)).unwrap();
    let handle = thread::spawn(move || streamer.run(stream));

    wait_until("robot moving forward", || motion.state().direction == Direction::Forward);
    assert_eq!(observer.duty(PwmChannel::B), 70);

    stop.store(true, Ordering::Release);
    let report = handle.join().unwrap();
    assert_eq!(report.close_reason, CloseReason::Stopped);
    assert!(report.units >= 1);

    // Streamer 退出时停车
    assert!(motion.state().is_neutral());
    assert_eq!(observer.duty(PwmChannel::A), 0);

    let detect_report = server.next_report();
    assert_eq!(detect_report.close_reason, CloseReason::PeerClosed);
    assert!(detect_report.units >= report.units.saturating_sub(1));
    server.stop();
}

#[test]
fn test_streamer_reply_timeout_returns_to_neutral() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let (_observer, motion) = mock_motion();
    motion.apply(rover_protocol::Command::Forward).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let streamer = Streamer::new(
        synthetic_capture(),
        motion.clone(),
        EncodeSettings::default(),
        client_config(),
        stop.clone(),
    );
    let stream = connect(addr, Duration::from_secs(1)).unwrap();
    let handle = thread::spawn(move || streamer.run(stream));

    // 对端只读帧，从不回复
    let (mut peer, _) = listener.accept().unwrap();
    let mut header = [0u8; 4];
    peer.read_exact(&mut header).unwrap();
    let length = u32::from_be_bytes(header) as usize;
    assert!(length > 0);
    let mut payload = vec![0u8; length];
    peer.read_exact(&mut payload).unwrap();
    assert_eq!(&payload[..2], &[0xFF, 0xD8]);

    wait_until("neutral after reply timeout", || motion.state().is_neutral());

    stop.store(true, Ordering::Release);
    let report = handle.join().unwrap();
    assert!(report.idle_timeouts >= 1);
    assert_eq!(report.stale_replies, 0);
    assert!(motion.state().is_neutral());
}

/// 回复随帧序号变化（popcount 奇偶），任何固定错位都会对不上
fn reply_for(index: u64) -> (&'static [u8], Direction) {
    if index.count_ones() % 2 == 1 {
        (b"LEFT\n", Direction::Left)
    } else {
        (b"RIGHT\n", Direction::Right)
    }
}

fn read_frame(peer: &mut TcpStream) {
    let mut header = [0u8; 4];
    peer.read_exact(&mut header).unwrap();
    let mut payload = vec![0u8; u32::from_be_bytes(header) as usize];
    peer.read_exact(&mut payload).unwrap();
}

#[test]
fn test_streamer_resyncs_after_late_reply() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let (_observer, motion) = mock_motion();
    let stop = Arc::new(AtomicBool::new(false));
    let streamer = Streamer::new(
        synthetic_capture(),
        motion.clone(),
        EncodeSettings::default(),
        client_config(),
        stop.clone(),
    );
    let stream = connect(addr, Duration::from_secs(1)).unwrap();
    let handle = thread::spawn(move || streamer.run(stream));
    let (mut peer, _) = listener.accept().unwrap();

    // 第 1 帧的回复晚于读超时，期间 streamer 继续发帧
    read_frame(&mut peer);
    thread::sleep(Duration::from_millis(450));
    peer.write_all(reply_for(1).0).unwrap();

    // 之后每帧立即回复。收到第 n + 1 帧时，第 n 帧的命令已经执行完
    let mut observed = Vec::new();
    for index in 2..=24u64 {
        read_frame(&mut peer);
        observed.push((index - 1, motion.state().direction));
        peer.write_all(reply_for(index).0).unwrap();
    }

    // 积压消化后，每帧执行的都是它自己的回复
    for &(index, direction) in observed.iter().filter(|(index, _)| *index >= 12) {
        assert_eq!(direction, reply_for(index).1, "frame {} steered by a stale reply", index);
    }

    stop.store(true, Ordering::Release);
    let report = handle.join().unwrap();
    assert_eq!(report.close_reason, CloseReason::Stopped);
    assert!(report.stale_replies >= 1, "{:?}", report);
}

#[test]
fn test_streamer_cleanup_reply_releases_actuator() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let (observer, motion) = mock_motion();
    let streamer = Streamer::new(
        synthetic_capture(),
        motion.clone(),
        EncodeSettings::default(),
        client_config(),
        Arc::new(AtomicBool::new(false)),
    );
    let stream = connect(addr, Duration::from_secs(1)).unwrap();
    let handle = thread::spawn(move || streamer.run(stream));

    let (mut peer, _) = listener.accept().unwrap();
    peer.write_all(b"CLEANUP\n").unwrap();

    let report = handle.join().unwrap();
    assert_eq!(report.close_reason, CloseReason::Cleanup);
    assert!(motion.is_released());
    assert_eq!(observer.release_count(), 1);
}
