//! 最新帧缓冲区
//!
//! 采集线程与消费者之间唯一的交接点：
//! - `push` 永不阻塞、永不失败，满时淘汰最旧的帧
//! - `pop_latest` 最多阻塞 `timeout`，返回最新帧的共享句柄（不移除）
//!
//! 多个读者看到的是同一帧；只有插入会淘汰数据。

use crate::DriverError;
use parking_lot::{Condvar, Mutex, MutexGuard};
use rover_hal::Frame;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 允许的最大容量
pub const MAX_CAPACITY: usize = 2;

#[derive(Debug, Default)]
struct Slots {
    frames: VecDeque<Arc<Frame>>,
    pushed: u64,
    evicted: u64,
}

/// 缓冲区计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub pushed: u64,
    pub evicted: u64,
    pub len: usize,
}

#[derive(Debug)]
pub struct FrameBuffer {
    slots: Mutex<Slots>,
    ready: Condvar,
    capacity: usize,
}

impl FrameBuffer {
    /// 创建容量为 1 或 2 的缓冲区
    pub fn new(capacity: usize) -> Result<Self, DriverError> {
        if capacity == 0 || capacity > MAX_CAPACITY {
            return Err(DriverError::InvalidConfig(format!(
                "frame buffer capacity must be 1..={}, got {}",
                MAX_CAPACITY, capacity
            )));
        }
        Ok(Self {
            slots: Mutex::new(Slots {
                frames: VecDeque::with_capacity(capacity),
                ..Slots::default()
            }),
            ready: Condvar::new(),
            capacity,
        })
    }

    pub fn push(&self, frame: impl Into<Arc<Frame>>) {
        let frame = frame.into();
        {
            let mut slots = self.slots.lock();
            if slots.frames.len() == self.capacity {
                slots.frames.pop_front();
                slots.evicted += 1;
            }
            slots.frames.push_back(frame);
            slots.pushed += 1;
        }
        self.ready.notify_all();
    }

    /// 等待最多 `timeout`，返回最新帧；超时返回 `None`
    pub fn pop_latest(&self, timeout: Duration) -> Option<Arc<Frame>> {
        let deadline = Instant::now().checked_add(timeout);
        let mut slots = self.slots.lock();
        while slots.frames.is_empty() {
            if self.wait_for_push(&mut slots, deadline) {
                break;
            }
        }
        slots.frames.back().cloned()
    }

    /// 等待比 `seen` 更新的帧
    ///
    /// `seen` 是上一次返回的插入计数（首次传 0）。返回 `(插入计数, 最新帧)`；
    /// 超时前没有新插入则返回 `None`。用于消费者避免重复处理同一帧。
    pub fn pop_newer(&self, seen: u64, timeout: Duration) -> Option<(u64, Arc<Frame>)> {
        let deadline = Instant::now().checked_add(timeout);
        let mut slots = self.slots.lock();
        while slots.pushed <= seen {
            if self.wait_for_push(&mut slots, deadline) {
                return None;
            }
        }
        let pushed = slots.pushed;
        slots.frames.back().cloned().map(|frame| (pushed, frame))
    }

    /// 等待下一次插入，返回 true 表示已超时
    ///
    /// `deadline` 为 `None`（超时时长溢出 `Instant`）时不限时等待。
    fn wait_for_push(&self, slots: &mut MutexGuard<'_, Slots>, deadline: Option<Instant>) -> bool {
        match deadline {
            Some(deadline) => self.ready.wait_until(slots, deadline).timed_out(),
            None => {
                self.ready.wait(slots);
                false
            },
        }
    }

    /// 非阻塞读取最新帧
    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.slots.lock().frames.back().cloned()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.slots.lock().frames.clear();
    }

    pub fn stats(&self) -> BufferStats {
        let slots = self.slots.lock();
        BufferStats {
            pushed: slots.pushed,
            evicted: slots.evicted,
            len: slots.frames.len(),
        }
    }
}
