//! # 配置
//!
//! TOML 配置文件，四个小节：`network`、`camera`、`detection`、`motion`。
//! 所有字段都有默认值，配置文件只需写要覆盖的项。
//!
//! 查找顺序：
//! 1. 显式传入的路径（不存在即报错）
//! 2. `dirs::config_dir()/rover/config.toml`（存在才读取）
//! 3. 内置默认值
//!
//! 命令行与 `ROVER_*` 环境变量的覆盖在 CLI 层完成，最后统一调用 [`RoverConfig::validate`]。

use crate::client::ClientConfig;
use crate::fps_stats::{DEFAULT_ALPHA, MAX_ALPHA, MIN_ALPHA};
use crate::frame_buffer::MAX_CAPACITY;
use crate::mapper::{CommandMapper, SteeringMode, TriggerTable};
use crate::motion::{DEFAULT_SPEED, MotionConfig};
use crate::session::SessionConfig;
use crate::streamer::EncodeSettings;
use crate::DriverError;
use rover_hal::{DetectionFilter, PinLayout};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// 配置文件名
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// 配置目录名
pub const CONFIG_DIR_NAME: &str = "rover";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoverConfig {
    pub network: NetworkConfig,
    pub camera: CameraConfig,
    pub detection: DetectionConfig,
    pub motion: MotionSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// 服务端绑定地址 / 客户端连接地址
    pub host: String,
    /// 机器人命令端口（`robot` / `pilot`）
    pub port: u16,
    /// 检测服务端口（`detect` / `stream`）
    pub detect_port: u16,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub connect_timeout_ms: u64,
    /// 帧率 EMA 的历史权重
    pub fps_alpha: f64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            detect_port: 5000,
            read_timeout_ms: 2000,
            write_timeout_ms: 2000,
            connect_timeout_ms: 5000,
            fps_alpha: DEFAULT_ALPHA,
        }
    }
}

/// 采集源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// 合成渐变图
    #[default]
    Synthetic,
    /// 循环回放 `image_dir` 中的 JPEG
    ImageDir,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub source: SourceKind,
    pub image_dir: Option<PathBuf>,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    /// 缓冲区容量（1 或 2）
    pub buffer_capacity: usize,
    /// 发送前缩放后的长边
    pub image_size: u32,
    /// JPEG 质量（1-100）
    pub quality: u8,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            source: SourceKind::Synthetic,
            image_dir: None,
            width: 640,
            height: 360,
            fps: 30.0,
            buffer_capacity: 1,
            image_size: 320,
            quality: 80,
        }
    }
}

/// 检测器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectorKind {
    /// 什么都检测不到
    #[default]
    Null,
    /// 每帧返回 `static_classes` 中的类别（整幅画面）
    Static,
}

/// 转向策略（配置形式）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SteeringKind {
    #[default]
    Classes,
    BoundingBox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub detector: DetectorKind,
    pub static_classes: Vec<u32>,
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    /// 只保留这些类别（空 = 全部）
    pub classes: Vec<u32>,
    pub forward_classes: Vec<u32>,
    pub turn_classes: Vec<u32>,
    pub halt_classes: Vec<u32>,
    pub steering: SteeringKind,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            detector: DetectorKind::Null,
            static_classes: Vec::new(),
            conf_threshold: 0.25,
            iou_threshold: 0.45,
            classes: vec![0, 2, 62, 63, 67, 70, 72, 73],
            forward_classes: vec![0],
            turn_classes: vec![2],
            halt_classes: vec![67],
            steering: SteeringKind::Classes,
        }
    }
}

/// 执行器类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActuatorKind {
    /// 只打印日志
    #[default]
    DryRun,
    /// Linux sysfs GPIO/PWM
    Sysfs,
}

/// H 桥引脚（BCM 编号）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinSettings {
    pub in1: u8,
    pub in2: u8,
    pub in3: u8,
    pub in4: u8,
    pub ena: u8,
    pub enb: u8,
}

impl Default for PinSettings {
    fn default() -> Self {
        let layout = PinLayout::default();
        Self {
            in1: layout.in1,
            in2: layout.in2,
            in3: layout.in3,
            in4: layout.in4,
            ena: layout.ena,
            enb: layout.enb,
        }
    }
}

impl From<PinSettings> for PinLayout {
    fn from(p: PinSettings) -> Self {
        PinLayout {
            in1: p.in1,
            in2: p.in2,
            in3: p.in3,
            in4: p.in4,
            ena: p.ena,
            enb: p.enb,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionSettings {
    pub actuator: ActuatorKind,
    /// 直行占空比（0-100）
    pub speed: u8,
    /// 转向占空比（缺省同 `speed`）
    pub turn_speed: Option<u8>,
    pub gpio_root: PathBuf,
    pub pwm_chip: PathBuf,
    pub pwm_frequency_hz: u32,
    pub pins: PinSettings,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            actuator: ActuatorKind::DryRun,
            speed: DEFAULT_SPEED,
            turn_speed: None,
            gpio_root: PathBuf::from("/sys/class/gpio"),
            pwm_chip: PathBuf::from("/sys/class/pwm/pwmchip0"),
            pwm_frequency_hz: 1000,
            pins: PinSettings::default(),
        }
    }
}

impl RoverConfig {
    /// 默认配置文件路径
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// 按查找顺序加载配置（不做校验）
    pub fn load(path: Option<&Path>) -> Result<Self, DriverError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::load_from_file(&path),
                _ => {
                    debug!("No config file found, using defaults");
                    Ok(Self::default())
                },
            },
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self, DriverError> {
        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, DriverError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml_string(&self) -> Result<String, DriverError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), DriverError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    /// 检查取值范围
    pub fn validate(&self) -> Result<(), DriverError> {
        let invalid = |msg: String| -> Result<(), DriverError> { Err(DriverError::InvalidConfig(msg)) };

        if self.network.host.trim().is_empty() {
            return invalid("network.host must not be empty".into());
        }
        if !(MIN_ALPHA..=MAX_ALPHA).contains(&self.network.fps_alpha) {
            return invalid(format!(
                "network.fps_alpha must be within [{}, {}], got {}",
                MIN_ALPHA, MAX_ALPHA, self.network.fps_alpha
            ));
        }
        if self.network.read_timeout_ms == 0 || self.network.write_timeout_ms == 0 {
            return invalid("network timeouts must be > 0".into());
        }
        if !(1..=MAX_CAPACITY).contains(&self.camera.buffer_capacity) {
            return invalid(format!(
                "camera.buffer_capacity must be 1..={}, got {}",
                MAX_CAPACITY, self.camera.buffer_capacity
            ));
        }
        if !(1..=100).contains(&self.camera.quality) {
            return invalid(format!("camera.quality must be 1..=100, got {}", self.camera.quality));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return invalid("camera.width/height must be > 0".into());
        }
        if self.camera.source == SourceKind::ImageDir && self.camera.image_dir.is_none() {
            return invalid("camera.image_dir is required when source = \"image-dir\"".into());
        }
        for (name, value) in [
            ("conf_threshold", self.detection.conf_threshold),
            ("iou_threshold", self.detection.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("detection.{} must be within [0, 1], got {}", name, value));
            }
        }
        if self.motion.speed > 100 {
            return invalid(format!("motion.speed must be 0..=100, got {}", self.motion.speed));
        }
        if let Some(turn) = self.motion.turn_speed
            && turn > 100
        {
            return invalid(format!("motion.turn_speed must be 0..=100, got {}", turn));
        }
        if PinLayout::from(self.motion.pins).has_duplicates() {
            return invalid(format!("motion.pins has duplicate pins: {:?}", self.motion.pins));
        }
        if self.motion.pwm_frequency_hz == 0 {
            return invalid("motion.pwm_frequency_hz must be > 0".into());
        }
        Ok(())
    }

    /// 客户端角色的校验：端口不能为 0
    pub fn validate_client(&self, port: u16) -> Result<(), DriverError> {
        self.validate()?;
        if port == 0 {
            return Err(DriverError::InvalidConfig("port must be non-zero for clients".into()));
        }
        Ok(())
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            read_timeout: Duration::from_millis(self.network.read_timeout_ms),
            write_timeout: Duration::from_millis(self.network.write_timeout_ms),
            fps_alpha: self.network.fps_alpha,
        }
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            connect_timeout: Duration::from_millis(self.network.connect_timeout_ms),
            session: self.session_config(),
            ..ClientConfig::default()
        }
    }

    pub fn motion_config(&self) -> MotionConfig {
        MotionConfig {
            layout: self.motion.pins.into(),
            speed: self.motion.speed,
            turn_speed: self.motion.turn_speed,
        }
    }

    pub fn trigger_table(&self) -> TriggerTable {
        TriggerTable::from_lists(
            &self.detection.forward_classes,
            &self.detection.turn_classes,
            &self.detection.halt_classes,
        )
    }

    pub fn mapper(&self) -> CommandMapper {
        let steering = match self.detection.steering {
            SteeringKind::Classes => SteeringMode::Classes,
            SteeringKind::BoundingBox => SteeringMode::BoundingBox,
        };
        CommandMapper::new(self.trigger_table(), steering)
    }

    pub fn detection_filter(&self) -> DetectionFilter {
        DetectionFilter {
            conf_threshold: self.detection.conf_threshold,
            iou_threshold: self.detection.iou_threshold,
            classes: self.detection.classes.clone(),
        }
    }

    pub fn encode_settings(&self) -> EncodeSettings {
        EncodeSettings {
            quality: self.camera.quality,
            max_side: self.camera.image_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_protocol::Command;

    #[test]
    fn test_defaults_are_valid() {
        let config = RoverConfig::default();
        config.validate().unwrap();
        assert_eq!(config.network.port, 8000);
        assert_eq!(config.motion.speed, 70);
        assert_eq!(config.motion_config().layout, PinLayout::default());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RoverConfig::from_toml_str(
            r#"
            [network]
            port = 9100

            [motion]
            speed = 55
            actuator = "sysfs"

            [detection]
            steering = "bounding-box"
            "#,
        )
        .unwrap();
        assert_eq!(config.network.port, 9100);
        assert_eq!(config.network.host, "0.0.0.0");
        assert_eq!(config.motion.speed, 55);
        assert_eq!(config.motion.actuator, ActuatorKind::Sysfs);
        assert_eq!(config.mapper().steering(), SteeringMode::BoundingBox);
        assert_eq!(config.camera.quality, 80);
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);
        let mut config = RoverConfig::default();
        config.camera.image_size = 416;
        config.detection.forward_classes = vec![0, 15];
        config.save_to_file(&path).unwrap();

        let loaded = RoverConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_explicit_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(RoverConfig::load(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        assert!(matches!(
            RoverConfig::from_toml_str("[network]\nport = \"eighty\""),
            Err(DriverError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = RoverConfig::default();
        config.camera.quality = 0;
        assert!(config.validate().is_err());

        let mut config = RoverConfig::default();
        config.motion.speed = 101;
        assert!(config.validate().is_err());

        let mut config = RoverConfig::default();
        config.detection.conf_threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = RoverConfig::default();
        config.camera.buffer_capacity = 3;
        assert!(config.validate().is_err());

        let mut config = RoverConfig::default();
        config.network.fps_alpha = 0.5;
        assert!(config.validate().is_err());

        let mut config = RoverConfig::default();
        config.camera.source = SourceKind::ImageDir;
        assert!(config.validate().is_err());

        assert!(RoverConfig::default().validate_client(0).is_err());
    }

    #[test]
    fn test_trigger_table_from_config() {
        let mut config = RoverConfig::default();
        config.detection.forward_classes = vec![15];
        config.detection.turn_classes = vec![0];
        let mapper = config.mapper();
        assert_eq!(mapper.map_classes(&[0]), Command::Left);
        assert_eq!(mapper.map_classes(&[15, 0]), Command::Forward);
    }
}
