//! 帧率估计
//!
//! 指数移动平均：`fps = alpha * fps + (1 - alpha) * instant`，
//! `alpha` 是历史权重，限制在 [0.8, 0.95]。

use std::time::Instant;

pub const MIN_ALPHA: f64 = 0.8;
pub const MAX_ALPHA: f64 = 0.95;
pub const DEFAULT_ALPHA: f64 = 0.9;

#[derive(Debug, Clone)]
pub struct FpsEstimator {
    alpha: f64,
    fps: Option<f64>,
    last: Option<Instant>,
    samples: u64,
}

impl Default for FpsEstimator {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

impl FpsEstimator {
    /// 超出范围的 `alpha` 会被截断到 [0.8, 0.95]
    pub fn new(alpha: f64) -> Self {
        let alpha = if alpha.is_nan() {
            DEFAULT_ALPHA
        } else {
            alpha.clamp(MIN_ALPHA, MAX_ALPHA)
        };
        Self {
            alpha,
            fps: None,
            last: None,
            samples: 0,
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// 记录一个已处理单元，返回当前估计值
    ///
    /// 第一次调用只记录时间；第二次用瞬时值作为初值；之后做平滑。
    /// 与上次时间相同（dt <= 0）的样本被忽略。
    pub fn tick(&mut self, now: Instant) -> f64 {
        if let Some(last) = self.last {
            let dt = now.saturating_duration_since(last).as_secs_f64();
            if dt <= 0.0 {
                return self.fps();
            }
            let instant = 1.0 / dt;
            self.fps = Some(match self.fps {
                Some(fps) => self.alpha * fps + (1.0 - self.alpha) * instant,
                None => instant,
            });
            self.samples += 1;
        }
        self.last = Some(now);
        self.fps()
    }

    pub fn fps(&self) -> f64 {
        self.fps.unwrap_or(0.0)
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn reset(&mut self) {
        self.fps = None;
        self.last = None;
        self.samples = 0;
    }
}
