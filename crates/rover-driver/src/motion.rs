//! 运动状态机
//!
//! 把命令变成一组完整的方向引脚电平 + 两路占空比。
//!
//! # 转换顺序
//!
//! 每次转换都在同一把锁内按固定顺序写入：
//! 1. 两路 PWM 占空比置 0
//! 2. 写入全部四个方向引脚
//! 3. 两路 PWM 设为目标占空比
//!
//! 因此任何时刻都不会出现"通道已使能、方向引脚仍是上一个状态"的组合。
//! 外部观察者通过 [`MotionController::state`] 读取的快照只在转换完成后发布。

use crate::DriverError;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use rover_hal::{Actuator, Level, PinLayout, PwmChannel};
use rover_protocol::Command;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 默认占空比（百分比）
pub const DEFAULT_SPEED: u8 = 70;

/// 行驶方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    Neutral,
    Forward,
    Backward,
    Left,
    Right,
}

impl Direction {
    /// 左右电机的转向（+1 正转，-1 反转，0 停止）
    fn signs(self) -> (i8, i8) {
        match self {
            Direction::Neutral => (0, 0),
            Direction::Forward => (1, 1),
            Direction::Backward => (-1, -1),
            Direction::Left => (-1, 1),
            Direction::Right => (1, -1),
        }
    }

    /// IN1..IN4 电平
    fn pin_levels(self) -> [Level; 4] {
        let (left, right) = self.signs();
        [
            Level::from(left > 0),
            Level::from(left < 0),
            Level::from(right > 0),
            Level::from(right < 0),
        ]
    }

    pub fn from_command(command: Command) -> Self {
        match command {
            Command::Forward => Direction::Forward,
            Command::Back => Direction::Backward,
            Command::Left => Direction::Left,
            Command::Right => Direction::Right,
            Command::Stop | Command::Cleanup | Command::Unknown => Direction::Neutral,
        }
    }
}

/// 左右两侧的带符号驱动百分比（-100..=100）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DriveVector {
    pub left: i8,
    pub right: i8,
}

/// 当前断言的运动状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MotionState {
    pub direction: Direction,
    pub left_duty: u8,
    pub right_duty: u8,
}

impl MotionState {
    pub const NEUTRAL: MotionState = MotionState {
        direction: Direction::Neutral,
        left_duty: 0,
        right_duty: 0,
    };

    pub fn is_neutral(&self) -> bool {
        *self == Self::NEUTRAL
    }

    /// 占空比超过 100 时按 100 计
    pub fn drive_vector(&self) -> DriveVector {
        let (left, right) = self.direction.signs();
        let percent = |duty: u8| duty.min(100) as i8;
        DriveVector {
            left: left * percent(self.left_duty),
            right: right * percent(self.right_duty),
        }
    }
}

/// 运动控制配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionConfig {
    pub layout: PinLayout,
    /// 直行占空比
    pub speed: u8,
    /// 原地转向占空比（None 时同 `speed`）
    pub turn_speed: Option<u8>,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            layout: PinLayout::default(),
            speed: DEFAULT_SPEED,
            turn_speed: None,
        }
    }
}

impl MotionConfig {
    fn target(&self, direction: Direction) -> MotionState {
        let duty = match direction {
            Direction::Neutral => 0,
            Direction::Left | Direction::Right => self.turn_speed.unwrap_or(self.speed),
            Direction::Forward | Direction::Backward => self.speed,
        }
        .min(100);
        MotionState {
            direction,
            left_duty: duty,
            right_duty: duty,
        }
    }
}

/// 一次 `apply` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionOutcome {
    /// 写入了新的引脚/占空比组合
    Changed(MotionState),
    /// 与当前状态相同，未写任何引脚
    Unchanged(MotionState),
    /// 已进入 NEUTRAL 并释放执行器（终态）
    Released,
}

struct Inner<A> {
    actuator: A,
    state: MotionState,
    dirty: bool,
    released: bool,
}

pub struct MotionController<A: Actuator> {
    inner: Mutex<Inner<A>>,
    snapshot: ArcSwap<MotionState>,
    config: MotionConfig,
}

impl<A: Actuator> MotionController<A> {
    /// 接管执行器并立即断言 NEUTRAL
    pub fn new(actuator: A, config: MotionConfig) -> Result<Self, DriverError> {
        if config.layout.has_duplicates() {
            return Err(DriverError::InvalidConfig(format!(
                "pin layout has duplicate pins: {:?}",
                config.layout
            )));
        }
        let mut inner = Inner {
            actuator,
            state: MotionState::NEUTRAL,
            dirty: false,
            released: false,
        };
        write_state(&mut inner.actuator, &config.layout, MotionState::NEUTRAL)?;
        info!(
            "Motion controller ready (speed {}%, turn speed {}%)",
            config.speed,
            config.turn_speed.unwrap_or(config.speed)
        );
        Ok(Self {
            inner: Mutex::new(inner),
            snapshot: ArcSwap::from_pointee(MotionState::NEUTRAL),
            config,
        })
    }

    pub fn config(&self) -> &MotionConfig {
        &self.config
    }

    /// 最近一次完整转换后的状态（无锁读取）
    pub fn state(&self) -> MotionState {
        **self.snapshot.load()
    }

    pub fn is_released(&self) -> bool {
        self.inner.lock().released
    }

    pub fn apply(&self, command: Command) -> Result<MotionOutcome, DriverError> {
        let mut inner = self.inner.lock();
        if inner.released {
            return Err(DriverError::ActuatorReleased);
        }

        if command == Command::Cleanup {
            self.transition(&mut inner, MotionState::NEUTRAL)?;
            inner.released = true;
            inner.actuator.release_all()?;
            info!("Actuator released (CLEANUP)");
            return Ok(MotionOutcome::Released);
        }

        let target = self.config.target(Direction::from_command(command));
        if !inner.dirty && target == inner.state {
            debug!("{} -> {:?} (unchanged)", command, target.direction);
            return Ok(MotionOutcome::Unchanged(target));
        }
        self.transition(&mut inner, target)?;
        debug!(
            "{} -> {:?} (duty {}/{})",
            command, target.direction, target.left_duty, target.right_duty
        );
        Ok(MotionOutcome::Changed(target))
    }

    /// 强制回到 NEUTRAL（无论当前状态）
    pub fn stop(&self) -> Result<(), DriverError> {
        let mut inner = self.inner.lock();
        if inner.released {
            return Ok(());
        }
        self.transition(&mut inner, MotionState::NEUTRAL)
    }

    fn transition(&self, inner: &mut Inner<A>, target: MotionState) -> Result<(), DriverError> {
        // 中途失败时引脚状态未知，标记为脏，下一次转换必须完整重写
        inner.dirty = true;
        write_state(&mut inner.actuator, &self.config.layout, target)?;
        inner.dirty = false;
        inner.state = target;
        self.snapshot.store(Arc::new(target));
        Ok(())
    }
}

impl<A: Actuator> Drop for MotionController<A> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if inner.released {
            return;
        }
        if let Err(e) = write_state(&mut inner.actuator, &self.config.layout, MotionState::NEUTRAL) {
            warn!("Failed to stop motors on drop: {}", e);
        }
        inner.released = true;
        if let Err(e) = inner.actuator.release_all() {
            warn!("Failed to release actuator on drop: {}", e);
        }
    }
}

/// 按 duty 0 → 方向引脚 → 目标 duty 的顺序写入完整状态
fn write_state<A: Actuator>(actuator: &mut A, layout: &PinLayout, state: MotionState) -> Result<(), DriverError> {
    for channel in PwmChannel::ALL {
        actuator.set_pwm_duty(channel, 0)?;
    }
    let levels = state.direction.pin_levels();
    for (pin, level) in layout.direction_pins().into_iter().zip(levels) {
        actuator.set_pin(pin, level)?;
    }
    if state.left_duty > 0 {
        actuator.set_pwm_duty(PwmChannel::A, state.left_duty)?;
    }
    if state.right_duty > 0 {
        actuator.set_pwm_duty(PwmChannel::B, state.right_duty)?;
    }
    Ok(())
}
