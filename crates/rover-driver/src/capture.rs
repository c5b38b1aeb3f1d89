//! 采集线程
//!
//! 独立线程以自己的节奏调用采集源并写入 [`FrameBuffer`]，从不等待消费者。
//! 采集失败或暂时无帧只做短暂退避；停止是协作式的，每轮开头检查停止标志。

use crate::frame_buffer::FrameBuffer;
use crate::join::{JOIN_TIMEOUT, JoinTimeout};
use crate::DriverError;
use rover_hal::FrameSource;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// 采集源暂无帧时的退避
pub const EMPTY_BACKOFF: Duration = Duration::from_millis(10);
/// 采集源报错时的退避
pub const ERROR_BACKOFF: Duration = Duration::from_millis(20);

#[derive(Debug, Default)]
struct Counters {
    frames: AtomicU64,
    empty_polls: AtomicU64,
    failures: AtomicU64,
}

/// 采集统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames: u64,
    pub empty_polls: u64,
    pub failures: u64,
}

/// 线程退出（包括 panic 展开）时释放采集源，且只释放一次
struct ReleaseOnDrop<S: FrameSource>(S);

impl<S: FrameSource> Drop for ReleaseOnDrop<S> {
    fn drop(&mut self) {
        self.0.release();
        debug!("Frame source released");
    }
}

pub struct CaptureThread {
    stop: Arc<AtomicBool>,
    counters: Arc<Counters>,
    buffer: Arc<FrameBuffer>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureThread {
    pub fn spawn<S>(source: S, buffer: Arc<FrameBuffer>) -> Result<Self, DriverError>
    where
        S: FrameSource + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let counters = Arc::new(Counters::default());

        let handle = {
            let stop = stop.clone();
            let counters = counters.clone();
            let buffer = buffer.clone();
            thread::Builder::new()
                .name("capture".into())
                .spawn(move || capture_loop(ReleaseOnDrop(source), &buffer, &stop, &counters))?
        };
        info!("Capture thread started (buffer capacity {})", buffer.capacity());

        Ok(Self {
            stop,
            counters,
            buffer,
            handle: Some(handle),
        })
    }

    pub fn buffer(&self) -> &Arc<FrameBuffer> {
        &self.buffer
    }

    pub fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames: self.counters.frames.load(Ordering::Relaxed),
            empty_polls: self.counters.empty_polls.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// 请求停止并等待线程退出（最多 2 秒）
    pub fn stop(&mut self) -> Result<CaptureStats, DriverError> {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle.join_timeout(JOIN_TIMEOUT)?;
            let stats = self.stats();
            info!(
                "Capture thread stopped: {} frames, {} empty polls, {} failures",
                stats.frames, stats.empty_polls, stats.failures
            );
        }
        Ok(self.stats())
    }
}

impl Drop for CaptureThread {
    fn drop(&mut self) {
        if self.handle.is_some()
            && let Err(e) = self.stop()
        {
            warn!("Capture thread shutdown: {}", e);
        }
    }
}

fn capture_loop<S: FrameSource>(
    mut source: ReleaseOnDrop<S>,
    buffer: &FrameBuffer,
    stop: &AtomicBool,
    counters: &Counters,
) {
    while !stop.load(Ordering::Acquire) {
        match source.0.capture_next_frame() {
            Ok(Some(frame)) => {
                trace!("Captured frame #{}", frame.sequence);
                buffer.push(frame);
                counters.frames.fetch_add(1, Ordering::Relaxed);
            },
            Ok(None) => {
                counters.empty_polls.fetch_add(1, Ordering::Relaxed);
                thread::sleep(EMPTY_BACKOFF);
            },
            Err(e) => {
                let failures = counters.failures.fetch_add(1, Ordering::Relaxed) + 1;
                // 持续失败时避免刷屏
                if failures.is_power_of_two() {
                    warn!("Frame capture failed ({} so far): {}", failures, e);
                }
                thread::sleep(ERROR_BACKOFF);
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_hal::mock::{ScriptedSource, SourceStep};
    use rover_hal::{Frame, FrameEncoding};
    use std::time::Instant;

    fn frame(seq: u64) -> Frame {
        Frame::new(1, 1, FrameEncoding::Rgb8, vec![0u8; 3]).with_sequence(seq)
    }

    fn wait_until(cond: impl Fn() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(2);
        while !cond() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_capture_survives_failures_and_releases_once() {
        let source = ScriptedSource::new([
            SourceStep::Error("usb hiccup".into()),
            SourceStep::Empty,
            SourceStep::Frame(frame(1)),
            SourceStep::Frame(frame(2)),
        ]);
        let observer = source.clone();
        let buffer = Arc::new(FrameBuffer::new(1).unwrap());
        let mut capture = CaptureThread::spawn(source, buffer.clone()).unwrap();

        wait_until(|| buffer.latest().is_some_and(|f| f.sequence == 2));
        let stats = capture.stop().unwrap();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.failures, 1);
        assert!(stats.empty_polls >= 1);
        assert!(!capture.is_running());
        assert_eq!(observer.release_count(), 1);

        // 再次 stop / drop 不会重复释放
        capture.stop().unwrap();
        drop(capture);
        assert_eq!(observer.release_count(), 1);
    }

    #[test]
    fn test_drop_stops_thread() {
        let source = ScriptedSource::new([]);
        let observer = source.clone();
        let buffer = Arc::new(FrameBuffer::new(2).unwrap());
        let capture = CaptureThread::spawn(source, buffer).unwrap();
        wait_until(|| observer.captures() > 0);
        drop(capture);
        assert_eq!(observer.release_count(), 1);
    }
}
