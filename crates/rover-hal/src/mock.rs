//! Mock 硬件
//!
//! 供单元测试和集成测试使用（`mock` feature）。所有 mock 都可克隆，
//! 克隆体共享内部状态，测试可以在把 mock 交给被测对象之后继续观察它。

use crate::actuator::{Actuator, Level, PwmChannel};
use crate::detector::Detector;
use crate::frame::{Detection, Frame};
use crate::{DeviceErrorKind, HalError};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// 执行器调用记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorCall {
    SetPin(u8, Level),
    SetPwm(PwmChannel, u8),
    ReleaseAll,
}

#[derive(Debug, Default)]
struct ActuatorJournal {
    calls: Vec<ActuatorCall>,
    pins: BTreeMap<u8, Level>,
    duty: [u8; 2],
    release_count: usize,
}

/// 记录所有调用的执行器
#[derive(Debug, Clone, Default)]
pub struct MockActuator {
    journal: Arc<Mutex<ActuatorJournal>>,
    failing: Arc<AtomicBool>,
}

impl MockActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 全部调用（按时间顺序）
    pub fn calls(&self) -> Vec<ActuatorCall> {
        self.journal.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.journal.lock().calls.clear();
    }

    pub fn pin_level(&self, pin: u8) -> Option<Level> {
        self.journal.lock().pins.get(&pin).copied()
    }

    pub fn duty(&self, channel: PwmChannel) -> u8 {
        self.journal.lock().duty[channel.index()]
    }

    pub fn release_count(&self) -> usize {
        self.journal.lock().release_count
    }

    /// 让后续调用返回错误（模拟驱动板掉线）
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), HalError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(HalError::device(DeviceErrorKind::Backend, "mock actuator failure"));
        }
        Ok(())
    }
}

impl Actuator for MockActuator {
    fn set_pin(&mut self, pin: u8, level: Level) -> Result<(), HalError> {
        self.check()?;
        let mut journal = self.journal.lock();
        journal.calls.push(ActuatorCall::SetPin(pin, level));
        journal.pins.insert(pin, level);
        Ok(())
    }

    fn set_pwm_duty(&mut self, channel: PwmChannel, percent: u8) -> Result<(), HalError> {
        self.check()?;
        let mut journal = self.journal.lock();
        journal.calls.push(ActuatorCall::SetPwm(channel, percent));
        journal.duty[channel.index()] = percent;
        Ok(())
    }

    fn release_all(&mut self) -> Result<(), HalError> {
        let mut journal = self.journal.lock();
        journal.calls.push(ActuatorCall::ReleaseAll);
        journal.release_count += 1;
        Ok(())
    }
}

/// 按脚本返回结果的检测器
///
/// 脚本耗尽后返回 `fallback`（默认空列表）。
#[derive(Debug, Clone, Default)]
pub struct ScriptedDetector {
    script: Arc<Mutex<VecDeque<Result<Vec<Detection>, String>>>>,
    fallback: Vec<Detection>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fallback(mut self, fallback: Vec<Detection>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn push(&self, detections: Vec<Detection>) {
        self.script.lock().push_back(Ok(detections));
    }

    pub fn push_error(&self, message: impl Into<String>) {
        self.script.lock().push_back(Err(message.into()));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Detector for ScriptedDetector {
    fn infer(&self, _frame: &Frame) -> Result<Vec<Detection>, HalError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().pop_front() {
            Some(Ok(detections)) => Ok(detections),
            Some(Err(message)) => Err(HalError::device(DeviceErrorKind::Backend, message)),
            None => Ok(self.fallback.clone()),
        }
    }
}

/// 脚本化采集源的一步
#[derive(Debug, Clone)]
pub enum SourceStep {
    Frame(Frame),
    Empty,
    Error(String),
}

/// 按脚本产出帧的采集源
///
/// 脚本耗尽后一直返回 `Ok(None)`。
#[derive(Debug, Clone, Default)]
pub struct ScriptedSource {
    script: Arc<Mutex<VecDeque<SourceStep>>>,
    captures: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new(steps: impl IntoIterator<Item = SourceStep>) -> Self {
        Self {
            script: Arc::new(Mutex::new(steps.into_iter().collect())),
            ..Self::default()
        }
    }

    pub fn push(&self, step: SourceStep) {
        self.script.lock().push_back(step);
    }

    pub fn captures(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

impl crate::source::FrameSource for ScriptedSource {
    fn capture_next_frame(&mut self) -> Result<Option<Frame>, HalError> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().pop_front() {
            Some(SourceStep::Frame(frame)) => Ok(Some(frame)),
            Some(SourceStep::Error(message)) => {
                Err(HalError::device(DeviceErrorKind::Backend, message))
            },
            Some(SourceStep::Empty) | None => Ok(None),
        }
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}
