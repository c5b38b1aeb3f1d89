//! 图像帧与检测结果的数据模型

use bytes::Bytes;
use std::time::Instant;

/// 像素编码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameEncoding {
    /// 原始 BGR 三通道（摄像头常见输出）
    Bgr8,
    /// 原始 RGB 三通道
    Rgb8,
    /// JPEG 压缩字节
    Jpeg,
}

impl FrameEncoding {
    pub fn is_raw(self) -> bool {
        !matches!(self, FrameEncoding::Jpeg)
    }
}

/// 一次采集得到的不可变图像快照
///
/// `data` 使用 `Bytes` 存储，克隆只增加引用计数，不复制像素。
/// 帧由采集源产生、交给 FrameBuffer 持有，消费者拿到的是共享只读句柄。
#[derive(Debug, Clone)]
pub struct Frame {
    /// 采集序号（由采集源单调递增，0 表示未编号）
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub encoding: FrameEncoding,
    pub data: Bytes,
    /// 单调时钟采集时间
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(width: u32, height: u32, encoding: FrameEncoding, data: impl Into<Bytes>) -> Self {
        Self {
            sequence: 0,
            width,
            height,
            encoding,
            data: data.into(),
            captured_at: Instant::now(),
        }
    }

    /// 从 JPEG 负载构造（尺寸未知时传 0）
    pub fn jpeg(width: u32, height: u32, data: impl Into<Bytes>) -> Self {
        Self::new(width, height, FrameEncoding::Jpeg, data)
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// 原始像素格式下应有的字节数
    pub fn expected_raw_len(&self) -> Option<usize> {
        if self.encoding.is_raw() {
            Some(self.width as usize * self.height as usize * 3)
        } else {
            None
        }
    }

    /// 帧的"年龄"（用于衡量陈旧度）
    pub fn age(&self) -> std::time::Duration {
        self.captured_at.elapsed()
    }
}

/// 检测框（像素坐标，左上角 + 宽高）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center_x(&self) -> f32 {
        self.x + self.width / 2.0
    }

    pub fn center_y(&self) -> f32 {
        self.y + self.height / 2.0
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// 交并比（Intersection over Union）
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix = (self.x + self.width).min(other.x + other.width) - self.x.max(other.x);
        let iy = (self.y + self.height).min(other.y + other.height) - self.y.max(other.y);
        if ix <= 0.0 || iy <= 0.0 {
            return 0.0;
        }
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }
}

/// 单个检测结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(class_id: u32, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            class_id,
            confidence,
            bbox,
        }
    }
}
