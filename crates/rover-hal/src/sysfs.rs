//! Linux sysfs GPIO/PWM 执行器
//!
//! 方向引脚走 `/sys/class/gpio`，两路使能走 `/sys/class/pwm/pwmchipN` 的硬件 PWM 通道。
//! 引脚和通道在第一次使用时导出，`release_all` 时统一取消导出。

use crate::actuator::{Actuator, Level, PwmChannel};
use crate::HalError;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 导出后等待 udev 建立节点的上限
const EXPORT_SETTLE_TIMEOUT: Duration = Duration::from_millis(500);

/// sysfs 执行器配置
#[derive(Debug, Clone)]
pub struct SysfsConfig {
    pub gpio_root: PathBuf,
    pub pwm_root: PathBuf,
    /// ENA 对应的 PWM 通道号
    pub channel_a: u32,
    /// ENB 对应的 PWM 通道号
    pub channel_b: u32,
    pub frequency_hz: u32,
}

impl Default for SysfsConfig {
    fn default() -> Self {
        Self {
            gpio_root: PathBuf::from("/sys/class/gpio"),
            pwm_root: PathBuf::from("/sys/class/pwm/pwmchip0"),
            channel_a: 0,
            channel_b: 1,
            frequency_hz: 1000,
        }
    }
}

impl SysfsConfig {
    fn period_ns(&self) -> u64 {
        1_000_000_000 / u64::from(self.frequency_hz.max(1))
    }

    fn channel(&self, channel: PwmChannel) -> u32 {
        match channel {
            PwmChannel::A => self.channel_a,
            PwmChannel::B => self.channel_b,
        }
    }
}

pub struct SysfsActuator {
    config: SysfsConfig,
    exported_pins: BTreeSet<u8>,
    exported_channels: BTreeSet<u32>,
    released: bool,
}

impl SysfsActuator {
    pub fn open(config: SysfsConfig) -> Result<Self, HalError> {
        for root in [&config.gpio_root, &config.pwm_root] {
            if !root.is_dir() {
                return Err(HalError::from_open_error(
                    &root.display().to_string(),
                    std::io::Error::from(std::io::ErrorKind::NotFound),
                ));
            }
        }
        info!(
            "sysfs actuator: gpio={}, pwm={} (channels {}/{}, {} Hz)",
            config.gpio_root.display(),
            config.pwm_root.display(),
            config.channel_a,
            config.channel_b,
            config.frequency_hz
        );
        Ok(Self {
            config,
            exported_pins: BTreeSet::new(),
            exported_channels: BTreeSet::new(),
            released: false,
        })
    }

    fn pin_dir(&self, pin: u8) -> PathBuf {
        self.config.gpio_root.join(format!("gpio{}", pin))
    }

    fn channel_dir(&self, channel: u32) -> PathBuf {
        self.config.pwm_root.join(format!("pwm{}", channel))
    }

    fn ensure_pin(&mut self, pin: u8) -> Result<PathBuf, HalError> {
        let dir = self.pin_dir(pin);
        if self.exported_pins.contains(&pin) {
            return Ok(dir);
        }
        if !dir.is_dir() {
            write_attr(&self.config.gpio_root.join("export"), &pin.to_string())?;
            wait_for(&dir)?;
        }
        write_attr(&dir.join("direction"), "out")?;
        self.exported_pins.insert(pin);
        debug!("GPIO{} exported as output", pin);
        Ok(dir)
    }

    fn ensure_channel(&mut self, channel: u32) -> Result<PathBuf, HalError> {
        let dir = self.channel_dir(channel);
        if self.exported_channels.contains(&channel) {
            return Ok(dir);
        }
        if !dir.is_dir() {
            write_attr(&self.config.pwm_root.join("export"), &channel.to_string())?;
            wait_for(&dir)?;
        }
        write_attr(&dir.join("period"), &self.config.period_ns().to_string())?;
        write_attr(&dir.join("duty_cycle"), "0")?;
        write_attr(&dir.join("enable"), "1")?;
        self.exported_channels.insert(channel);
        debug!("PWM channel {} exported", channel);
        Ok(dir)
    }
}

impl Actuator for SysfsActuator {
    fn set_pin(&mut self, pin: u8, level: Level) -> Result<(), HalError> {
        if self.released {
            return Err(HalError::Released);
        }
        let dir = self.ensure_pin(pin)?;
        write_attr(&dir.join("value"), if level.is_high() { "1" } else { "0" })
    }

    fn set_pwm_duty(&mut self, channel: PwmChannel, percent: u8) -> Result<(), HalError> {
        if self.released {
            return Err(HalError::Released);
        }
        let channel = self.config.channel(channel);
        let dir = self.ensure_channel(channel)?;
        let duty = self.config.period_ns() * u64::from(percent.min(100)) / 100;
        write_attr(&dir.join("duty_cycle"), &duty.to_string())
    }

    fn release_all(&mut self) -> Result<(), HalError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        // 尽力释放：单个节点失败不影响其余节点
        let mut first_error = None;
        for channel in std::mem::take(&mut self.exported_channels) {
            let dir = self.channel_dir(channel);
            let result = write_attr(&dir.join("duty_cycle"), "0")
                .and_then(|_| write_attr(&dir.join("enable"), "0"))
                .and_then(|_| write_attr(&self.config.pwm_root.join("unexport"), &channel.to_string()));
            if let Err(e) = result {
                warn!("Failed to release PWM channel {}: {}", channel, e);
                first_error.get_or_insert(e);
            }
        }
        for pin in std::mem::take(&mut self.exported_pins) {
            let dir = self.pin_dir(pin);
            let result = write_attr(&dir.join("value"), "0")
                .and_then(|_| write_attr(&self.config.gpio_root.join("unexport"), &pin.to_string()));
            if let Err(e) = result {
                warn!("Failed to release GPIO{}: {}", pin, e);
                first_error.get_or_insert(e);
            }
        }
        info!("sysfs actuator released");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Drop for SysfsActuator {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.release_all();
        }
    }
}

fn write_attr(path: &Path, value: &str) -> Result<(), HalError> {
    fs::write(path, value).map_err(|e| HalError::from_open_error(&path.display().to_string(), e))
}

fn wait_for(dir: &Path) -> Result<(), HalError> {
    let deadline = Instant::now() + EXPORT_SETTLE_TIMEOUT;
    while !dir.is_dir() {
        if Instant::now() >= deadline {
            return Err(HalError::from_open_error(
                &dir.display().to_string(),
                std::io::Error::from(std::io::ErrorKind::TimedOut),
            ));
        }
        thread::sleep(Duration::from_millis(10));
    }
    Ok(())
}
