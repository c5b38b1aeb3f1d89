//! 目标检测接口
//!
//! 检测模型本身是黑盒：给定一帧，在有限时间内返回检测列表或可恢复的错误。

use crate::HalError;
use crate::frame::{Detection, Frame};

/// 检测器接口
///
/// `&self` 调用，多个会话可共享同一个检测器；需要可变状态的实现自行加锁。
pub trait Detector: Send + Sync {
    fn infer(&self, frame: &Frame) -> Result<Vec<Detection>, HalError>;
}

impl<D: Detector + ?Sized> Detector for std::sync::Arc<D> {
    fn infer(&self, frame: &Frame) -> Result<Vec<Detection>, HalError> {
        (**self).infer(frame)
    }
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn infer(&self, frame: &Frame) -> Result<Vec<Detection>, HalError> {
        (**self).infer(frame)
    }
}

/// 永远检测不到目标
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDetector;

impl Detector for NullDetector {
    fn infer(&self, _frame: &Frame) -> Result<Vec<Detection>, HalError> {
        Ok(Vec::new())
    }
}

/// 返回固定检测结果（空跑 / 联调用）
///
/// 置信度低于阈值的结果会被过滤，与真实模型的 `conf` 参数行为一致。
#[derive(Debug, Clone)]
pub struct StaticDetector {
    detections: Vec<Detection>,
    conf_threshold: f32,
}

impl StaticDetector {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            conf_threshold: 0.0,
        }
    }

    pub fn with_conf_threshold(mut self, threshold: f32) -> Self {
        self.conf_threshold = threshold;
        self
    }
}

impl Detector for StaticDetector {
    fn infer(&self, _frame: &Frame) -> Result<Vec<Detection>, HalError> {
        Ok(self
            .detections
            .iter()
            .filter(|d| d.confidence >= self.conf_threshold)
            .copied()
            .collect())
    }
}

/// 检测后处理参数
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionFilter {
    /// 最低置信度
    pub conf_threshold: f32,
    /// 同类框重叠超过该 IoU 时只保留置信度更高者
    pub iou_threshold: f32,
    /// 只保留这些类别（空表示全部保留）
    pub classes: Vec<u32>,
}

impl Default for DetectionFilter {
    fn default() -> Self {
        Self {
            conf_threshold: 0.25,
            iou_threshold: 0.45,
            classes: Vec::new(),
        }
    }
}

impl DetectionFilter {
    /// 置信度过滤 + 类别过滤 + 按类别贪心 NMS
    ///
    /// 输出按置信度降序；置信度相同的保持输入顺序。
    pub fn apply(&self, detections: Vec<Detection>) -> Vec<Detection> {
        let mut candidates: Vec<Detection> = detections
            .into_iter()
            .filter(|d| d.confidence >= self.conf_threshold)
            .filter(|d| self.classes.is_empty() || self.classes.contains(&d.class_id))
            .collect();
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut kept: Vec<Detection> = Vec::with_capacity(candidates.len());
        for det in candidates {
            let suppressed = kept
                .iter()
                .any(|k| k.class_id == det.class_id && k.bbox.iou(&det.bbox) > self.iou_threshold);
            if !suppressed {
                kept.push(det);
            }
        }
        kept
    }
}

/// 在任意检测器外面套一层后处理
pub struct FilteredDetector<D> {
    inner: D,
    filter: DetectionFilter,
}

impl<D: Detector> FilteredDetector<D> {
    pub fn new(inner: D, filter: DetectionFilter) -> Self {
        Self { inner, filter }
    }

    pub fn filter(&self) -> &DetectionFilter {
        &self.filter
    }
}

impl<D: Detector> Detector for FilteredDetector<D> {
    fn infer(&self, frame: &Frame) -> Result<Vec<Detection>, HalError> {
        let raw = self.inner.infer(frame)?;
        Ok(self.filter.apply(raw))
    }
}
