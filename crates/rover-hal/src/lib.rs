//! # Rover HAL
//!
//! 硬件抽象层：把摄像头采集、目标检测模型和电机驱动板当作黑盒协作者，
//! 只暴露核心逻辑需要的最小接口。
//!
//! - [`FrameSource`]: `capture_next_frame() -> Frame | None`
//! - [`Detector`]: `infer(frame) -> [(class_id, confidence, bbox)]`
//! - [`Actuator`]: `set_pin` / `set_pwm_duty` / `release_all`

use std::io;
use thiserror::Error;

pub mod actuator;
pub mod detector;
pub mod frame;
pub mod jpeg;
pub mod source;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(target_os = "linux")]
pub mod sysfs;

pub use actuator::{Actuator, DryRunActuator, Level, PinLayout, PwmChannel};
pub use detector::{Detector, DetectionFilter, FilteredDetector, NullDetector, StaticDetector};
pub use frame::{BoundingBox, Detection, Frame, FrameEncoding};
pub use source::{FrameSource, ImageDirSource, SyntheticSource};

#[cfg(target_os = "linux")]
pub use sysfs::{SysfsActuator, SysfsConfig};

/// 硬件层统一错误类型
#[derive(Error, Debug)]
pub enum HalError {
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] DeviceError),
    #[error("Image Error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Resource already released")]
    Released,
}

/// 设备错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceErrorKind {
    Unknown,
    NotFound,
    AccessDenied,
    Busy,
    InvalidConfig,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct DeviceError {
    pub kind: DeviceErrorKind,
    pub message: String,
}

impl DeviceError {
    pub fn new(kind: DeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// 启动阶段遇到即应终止进程的错误
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            DeviceErrorKind::NotFound | DeviceErrorKind::AccessDenied | DeviceErrorKind::InvalidConfig
        )
    }
}

impl From<String> for DeviceError {
    fn from(message: String) -> Self {
        Self::new(DeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for DeviceError {
    fn from(message: &str) -> Self {
        Self::new(DeviceErrorKind::Unknown, message)
    }
}

impl HalError {
    pub fn device(kind: DeviceErrorKind, message: impl Into<String>) -> Self {
        HalError::Device(DeviceError::new(kind, message))
    }

    /// 从 IO 错误推断设备错误分类（用于打开设备失败时给出清晰原因）
    pub fn from_open_error(what: &str, err: io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::NotFound => DeviceErrorKind::NotFound,
            io::ErrorKind::PermissionDenied => DeviceErrorKind::AccessDenied,
            io::ErrorKind::ResourceBusy => DeviceErrorKind::Busy,
            _ => DeviceErrorKind::Backend,
        };
        HalError::device(kind, format!("{}: {}", what, err))
    }
}
