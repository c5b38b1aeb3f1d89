//! 帧采集源
//!
//! 采集源是阻塞式的：`capture_next_frame` 可能等待到下一帧就绪。
//! 返回 `Ok(None)` 表示暂时没有帧（采集循环会短暂休眠后重试）。

use crate::frame::{Frame, FrameEncoding};
use crate::{DeviceErrorKind, HalError, jpeg};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// 帧采集源接口
pub trait FrameSource: Send {
    fn capture_next_frame(&mut self) -> Result<Option<Frame>, HalError>;

    /// 释放设备（由采集线程在退出时调用一次）
    fn release(&mut self) {}
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn capture_next_frame(&mut self) -> Result<Option<Frame>, HalError> {
        (**self).capture_next_frame()
    }

    fn release(&mut self) {
        (**self).release()
    }
}

/// 合成图像源
///
/// 按固定帧率生成 BGR 渐变图，每帧平移一个像素；用于没有摄像头的开发机。
#[derive(Debug)]
pub struct SyntheticSource {
    width: u32,
    height: u32,
    interval: Duration,
    next_due: Option<Instant>,
    sequence: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        let interval = if fps > 0.0 {
            Duration::from_secs_f64(1.0 / fps)
        } else {
            Duration::ZERO
        };
        Self {
            width: width.max(1),
            height: height.max(1),
            interval,
            next_due: None,
            sequence: 0,
        }
    }

    pub fn produced(&self) -> u64 {
        self.sequence
    }

    fn render(&self) -> Vec<u8> {
        let shift = self.sequence as u32;
        let mut data = Vec::with_capacity((self.width * self.height * 3) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                let b = ((x + shift) % 256) as u8;
                let g = (y % 256) as u8;
                data.extend_from_slice(&[b, g, 96]);
            }
        }
        data
    }
}

impl FrameSource for SyntheticSource {
    fn capture_next_frame(&mut self) -> Result<Option<Frame>, HalError> {
        let now = Instant::now();
        if let Some(due) = self.next_due
            && due > now
        {
            spin_sleep::sleep(due - now);
        }
        self.next_due = Some(Instant::now() + self.interval);

        self.sequence += 1;
        let frame = Frame::new(self.width, self.height, FrameEncoding::Bgr8, self.render())
            .with_sequence(self.sequence);
        Ok(Some(frame))
    }

    fn release(&mut self) {
        debug!("Synthetic source released after {} frames", self.sequence);
    }
}

/// 图片目录源
///
/// 按文件名顺序循环回放目录中的 JPEG 文件；帧以 JPEG 编码直接交出。
#[derive(Debug)]
pub struct ImageDirSource {
    files: Vec<PathBuf>,
    cursor: usize,
    sequence: u64,
    interval: Duration,
    next_due: Option<Instant>,
}

impl ImageDirSource {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, HalError> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir)
            .map_err(|e| HalError::from_open_error(&dir.display().to_string(), e))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_jpeg = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"))
                .unwrap_or(false);
            if is_jpeg && path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        if files.is_empty() {
            return Err(HalError::device(
                DeviceErrorKind::NotFound,
                format!("No JPEG files in {}", dir.display()),
            ));
        }

        info!("Image directory source: {} files from {}", files.len(), dir.display());
        Ok(Self {
            files,
            cursor: 0,
            sequence: 0,
            interval: Duration::ZERO,
            next_due: None,
        })
    }

    /// 限制回放帧率
    pub fn with_fps(mut self, fps: f64) -> Self {
        if fps > 0.0 {
            self.interval = Duration::from_secs_f64(1.0 / fps);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageDirSource {
    fn capture_next_frame(&mut self) -> Result<Option<Frame>, HalError> {
        let now = Instant::now();
        if let Some(due) = self.next_due
            && due > now
        {
            spin_sleep::sleep(due - now);
        }
        self.next_due = Some(Instant::now() + self.interval);

        let path = &self.files[self.cursor];
        self.cursor = (self.cursor + 1) % self.files.len();

        let data = fs::read(path)?;
        let (width, height) = jpeg::decode_dimensions(&data)?;
        self.sequence += 1;
        Ok(Some(Frame::jpeg(width, height, data).with_sequence(self.sequence)))
    }
}
