//! 按配置构造执行器、检测器和采集源

use anyhow::{Context, Result, bail};
use rover_driver::config::{ActuatorKind, DetectorKind, SourceKind};
use rover_driver::{CaptureThread, FrameBuffer, MotionController, RoverConfig, SharedDetector, SharedMotion};
use rover_hal::{
    Actuator, BoundingBox, Detection, DryRunActuator, FilteredDetector, FrameSource, ImageDirSource,
    NullDetector, StaticDetector, SyntheticSource,
};
use std::sync::Arc;
use tracing::info;

pub fn open_actuator(config: &RoverConfig) -> Result<Box<dyn Actuator>> {
    match config.motion.actuator {
        ActuatorKind::DryRun => {
            info!("Using dry-run actuator (no hardware)");
            Ok(Box::new(DryRunActuator::new()))
        },
        ActuatorKind::Sysfs => open_sysfs(config),
    }
}

#[cfg(target_os = "linux")]
fn open_sysfs(config: &RoverConfig) -> Result<Box<dyn Actuator>> {
    use rover_hal::{SysfsActuator, SysfsConfig};

    let sysfs = SysfsConfig {
        gpio_root: config.motion.gpio_root.clone(),
        pwm_root: config.motion.pwm_chip.clone(),
        frequency_hz: config.motion.pwm_frequency_hz,
        ..SysfsConfig::default()
    };
    let actuator = SysfsActuator::open(sysfs).context("Failed to open sysfs GPIO/PWM")?;
    Ok(Box::new(actuator))
}

#[cfg(not(target_os = "linux"))]
fn open_sysfs(_config: &RoverConfig) -> Result<Box<dyn Actuator>> {
    bail!("The sysfs actuator is only available on Linux")
}

/// 接管执行器，断言 NEUTRAL
pub fn open_motion(config: &RoverConfig) -> Result<SharedMotion> {
    let actuator = open_actuator(config)?;
    let motion = MotionController::new(actuator, config.motion_config()).context("Failed to initialize motors")?;
    Ok(Arc::new(motion))
}

/// 检测器 + 阈值 / NMS / 类别过滤
pub fn build_detector(config: &RoverConfig) -> SharedDetector {
    let filter = config.detection_filter();
    match config.detection.detector {
        DetectorKind::Null => Arc::new(FilteredDetector::new(NullDetector, filter)),
        DetectorKind::Static => {
            // 整幅画面大小的框，中心落在画面正中
            let bbox = BoundingBox::new(0.0, 0.0, config.camera.width as f32, config.camera.height as f32);
            let detections = config
                .detection
                .static_classes
                .iter()
                .map(|&class_id| Detection::new(class_id, 1.0, bbox))
                .collect();
            info!("Using static detector: classes {:?}", config.detection.static_classes);
            Arc::new(FilteredDetector::new(StaticDetector::new(detections), filter))
        },
    }
}

fn open_source(config: &RoverConfig) -> Result<Box<dyn FrameSource>> {
    let camera = &config.camera;
    match camera.source {
        SourceKind::Synthetic => {
            info!("Using synthetic source {}x{} @ {} fps", camera.width, camera.height, camera.fps);
            Ok(Box::new(SyntheticSource::new(camera.width, camera.height, camera.fps)))
        },
        SourceKind::ImageDir => {
            let Some(dir) = &camera.image_dir else {
                bail!("camera.image_dir is required for the image-dir source");
            };
            let source = ImageDirSource::open(dir)
                .with_context(|| format!("Failed to open image directory {}", dir.display()))?
                .with_fps(camera.fps);
            info!("Replaying {} images from {}", source.len(), dir.display());
            Ok(Box::new(source))
        },
    }
}

/// 打开采集源并启动采集线程
pub fn spawn_capture(config: &RoverConfig) -> Result<CaptureThread> {
    let source = open_source(config)?;
    let buffer = Arc::new(FrameBuffer::new(config.camera.buffer_capacity)?);
    CaptureThread::spawn(source, buffer).context("Failed to start capture thread")
}
