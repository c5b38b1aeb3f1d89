//! 命令行 / 环境变量对配置文件的覆盖

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use rover_driver::RoverConfig;
use rover_driver::config::{ActuatorKind, DetectorKind, SourceKind, SteeringKind};
use std::path::{Path, PathBuf};

/// 端口的归属：`robot`/`pilot` 用 `network.port`，`detect`/`stream` 用 `network.detect_port`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortRole {
    Command,
    Detection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SourceArg {
    Synthetic,
    ImageDir,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DetectorArg {
    Null,
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SteeringArg {
    Classes,
    BoundingBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ActuatorArg {
    DryRun,
    Sysfs,
}

/// 可覆盖配置文件的参数（未给出的保持配置文件中的值）
#[derive(Args, Debug, Clone, Default)]
pub struct Overrides {
    /// 监听地址（服务端）或目标地址（客户端）
    #[arg(long, env = "ROVER_HOST")]
    pub host: Option<String>,

    /// 端口（覆盖当前角色对应的端口）
    #[arg(short, long, env = "ROVER_PORT")]
    pub port: Option<u16>,

    /// 发送前缩放后的长边
    #[arg(long, env = "ROVER_IMAGE_SIZE")]
    pub image_size: Option<u32>,

    /// JPEG 质量（1-100）
    #[arg(long, env = "ROVER_QUALITY")]
    pub quality: Option<u8>,

    /// 检测置信度阈值
    #[arg(long = "conf", env = "ROVER_CONF")]
    pub conf_threshold: Option<f32>,

    /// NMS IoU 阈值
    #[arg(long = "iou", env = "ROVER_IOU")]
    pub iou_threshold: Option<f32>,

    /// 直行占空比（0-100）
    #[arg(long, env = "ROVER_SPEED")]
    pub speed: Option<u8>,

    /// 采集源
    #[arg(long, value_enum)]
    pub source: Option<SourceArg>,

    /// JPEG 目录（`--source image-dir`）
    #[arg(long)]
    pub image_dir: Option<PathBuf>,

    /// 检测器
    #[arg(long, value_enum)]
    pub detector: Option<DetectorArg>,

    /// 转向策略
    #[arg(long, value_enum)]
    pub steering: Option<SteeringArg>,

    /// 执行器
    #[arg(long, value_enum)]
    pub actuator: Option<ActuatorArg>,
}

impl Overrides {
    pub fn apply(&self, config: &mut RoverConfig, role: PortRole) {
        if let Some(host) = &self.host {
            config.network.host = host.clone();
        }
        if let Some(port) = self.port {
            match role {
                PortRole::Command => config.network.port = port,
                PortRole::Detection => config.network.detect_port = port,
            }
        }
        if let Some(size) = self.image_size {
            config.camera.image_size = size;
        }
        if let Some(quality) = self.quality {
            config.camera.quality = quality;
        }
        if let Some(conf) = self.conf_threshold {
            config.detection.conf_threshold = conf;
        }
        if let Some(iou) = self.iou_threshold {
            config.detection.iou_threshold = iou;
        }
        if let Some(speed) = self.speed {
            config.motion.speed = speed;
        }
        if let Some(source) = self.source {
            config.camera.source = match source {
                SourceArg::Synthetic => SourceKind::Synthetic,
                SourceArg::ImageDir => SourceKind::ImageDir,
            };
        }
        if let Some(dir) = &self.image_dir {
            config.camera.image_dir = Some(dir.clone());
        }
        if let Some(detector) = self.detector {
            config.detection.detector = match detector {
                DetectorArg::Null => DetectorKind::Null,
                DetectorArg::Static => DetectorKind::Static,
            };
        }
        if let Some(steering) = self.steering {
            config.detection.steering = match steering {
                SteeringArg::Classes => SteeringKind::Classes,
                SteeringArg::BoundingBox => SteeringKind::BoundingBox,
            };
        }
        if let Some(actuator) = self.actuator {
            config.motion.actuator = match actuator {
                ActuatorArg::DryRun => ActuatorKind::DryRun,
                ActuatorArg::Sysfs => ActuatorKind::Sysfs,
            };
        }
    }
}

/// 加载配置文件，叠加覆盖项并校验
pub fn load_config(path: Option<&Path>, overrides: &Overrides, role: PortRole, client: bool) -> Result<RoverConfig> {
    let mut config = RoverConfig::load(path).with_context(|| match path {
        Some(p) => format!("Failed to load config from {}", p.display()),
        None => "Failed to load default config".to_string(),
    })?;
    overrides.apply(&mut config, role);

    if client {
        let port = match role {
            PortRole::Command => config.network.port,
            PortRole::Detection => config.network.detect_port,
        };
        config.validate_client(port).context("Invalid configuration")?;
    } else {
        config.validate().context("Invalid configuration")?;
    }
    Ok(config)
}
