//! 电机驱动板接口
//!
//! 双路 H 桥（L298N 类）：每路两个方向引脚 + 一个 PWM 使能通道。

use crate::HalError;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// 引脚电平
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Low,
    High,
}

impl From<bool> for Level {
    fn from(value: bool) -> Self {
        if value { Level::High } else { Level::Low }
    }
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }
}

/// PWM 通道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PwmChannel {
    /// 左侧电机（ENA）
    A,
    /// 右侧电机（ENB）
    B,
}

impl PwmChannel {
    pub const ALL: [PwmChannel; 2] = [PwmChannel::A, PwmChannel::B];

    pub fn index(self) -> usize {
        match self {
            PwmChannel::A => 0,
            PwmChannel::B => 1,
        }
    }
}

/// H 桥引脚布局（BCM 编号）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinLayout {
    /// 左电机方向引脚 1（高电平 = 正转）
    pub in1: u8,
    /// 左电机方向引脚 2（高电平 = 反转）
    pub in2: u8,
    /// 右电机方向引脚 1
    pub in3: u8,
    /// 右电机方向引脚 2
    pub in4: u8,
    /// 左电机使能（PWM A）
    pub ena: u8,
    /// 右电机使能（PWM B）
    pub enb: u8,
}

impl Default for PinLayout {
    fn default() -> Self {
        Self {
            in1: 17,
            in2: 27,
            in3: 22,
            in4: 23,
            ena: 18,
            enb: 24,
        }
    }
}

impl PinLayout {
    /// 四个方向引脚（IN1..IN4 顺序）
    pub fn direction_pins(&self) -> [u8; 4] {
        [self.in1, self.in2, self.in3, self.in4]
    }

    /// 检查引脚是否有重复
    pub fn has_duplicates(&self) -> bool {
        let pins = [self.in1, self.in2, self.in3, self.in4, self.ena, self.enb];
        pins.iter().enumerate().any(|(i, p)| pins[i + 1..].contains(p))
    }
}

/// 执行器接口
///
/// 实现者拥有 GPIO/PWM 资源。调用方（运动状态机）负责保证引脚组合的一致性。
pub trait Actuator: Send {
    /// 设置方向引脚电平
    fn set_pin(&mut self, pin: u8, level: Level) -> Result<(), HalError>;

    /// 设置 PWM 占空比（0-100）
    fn set_pwm_duty(&mut self, channel: PwmChannel, percent: u8) -> Result<(), HalError>;

    /// 释放全部 GPIO/PWM 资源
    fn release_all(&mut self) -> Result<(), HalError>;
}

impl<A: Actuator + ?Sized> Actuator for Box<A> {
    fn set_pin(&mut self, pin: u8, level: Level) -> Result<(), HalError> {
        (**self).set_pin(pin, level)
    }

    fn set_pwm_duty(&mut self, channel: PwmChannel, percent: u8) -> Result<(), HalError> {
        (**self).set_pwm_duty(channel, percent)
    }

    fn release_all(&mut self) -> Result<(), HalError> {
        (**self).release_all()
    }
}

/// 空跑执行器
///
/// 不接触任何硬件，只记录并打印电平变化；用于无电机驱动板的开发机。
#[derive(Debug, Default)]
pub struct DryRunActuator {
    pins: BTreeMap<u8, Level>,
    duty: [u8; 2],
    released: bool,
}

impl DryRunActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pin(&self, pin: u8) -> Option<Level> {
        self.pins.get(&pin).copied()
    }

    pub fn duty(&self, channel: PwmChannel) -> u8 {
        self.duty[channel.index()]
    }

    pub fn is_released(&self) -> bool {
        self.released
    }
}

impl Actuator for DryRunActuator {
    fn set_pin(&mut self, pin: u8, level: Level) -> Result<(), HalError> {
        if self.released {
            return Err(HalError::Released);
        }
        if self.pins.insert(pin, level) != Some(level) {
            debug!("[dry-run] GPIO{} -> {:?}", pin, level);
        }
        Ok(())
    }

    fn set_pwm_duty(&mut self, channel: PwmChannel, percent: u8) -> Result<(), HalError> {
        if self.released {
            return Err(HalError::Released);
        }
        let percent = percent.min(100);
        if self.duty[channel.index()] != percent {
            debug!("[dry-run] PWM {:?} duty -> {}%", channel, percent);
        }
        self.duty[channel.index()] = percent;
        Ok(())
    }

    fn release_all(&mut self) -> Result<(), HalError> {
        if !self.released {
            info!("[dry-run] Releasing {} GPIO pins and 2 PWM channels", self.pins.len());
        }
        self.pins.clear();
        self.duty = [0; 2];
        self.released = true;
        Ok(())
    }
}
