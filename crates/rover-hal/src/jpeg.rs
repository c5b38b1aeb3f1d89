//! JPEG 编解码辅助
//!
//! 发送端把原始帧缩放并压缩成 JPEG 负载；接收端只需要读出尺寸，
//! 像素解码留给检测器。

use crate::HalError;
use crate::frame::{Frame, FrameEncoding};
use bytes::Bytes;
use image::codecs::jpeg::{JpegDecoder, JpegEncoder};
use image::imageops::{self, FilterType};
use image::{ImageDecoder, RgbImage};
use std::io::Cursor;

/// 默认 JPEG 质量
pub const DEFAULT_QUALITY: u8 = 80;

/// 把帧编码为 JPEG
///
/// - `quality`: 1-100，越界时截断
/// - `max_side`: 长边上限（0 表示不缩放）
///
/// 已经是 JPEG 的帧直接返回原字节（零拷贝）。
pub fn encode(frame: &Frame, quality: u8, max_side: u32) -> Result<Bytes, HalError> {
    if frame.encoding == FrameEncoding::Jpeg {
        return Ok(frame.data.clone());
    }

    let rgb = to_rgb_image(frame)?;
    let rgb = fit_within(rgb, max_side);

    let mut buffer = Vec::new();
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100)).encode_image(&rgb)?;
    Ok(Bytes::from(buffer))
}

/// 读取 JPEG 负载的宽高（只解析头部）
pub fn decode_dimensions(data: &[u8]) -> Result<(u32, u32), HalError> {
    let decoder = JpegDecoder::new(Cursor::new(data))?;
    Ok(decoder.dimensions())
}

fn to_rgb_image(frame: &Frame) -> Result<RgbImage, HalError> {
    let expected = frame.expected_raw_len().unwrap_or(0);
    if frame.data.len() != expected {
        return Err(HalError::device(
            crate::DeviceErrorKind::InvalidConfig,
            format!(
                "Raw frame size mismatch: {}x{} needs {} bytes, got {}",
                frame.width,
                frame.height,
                expected,
                frame.data.len()
            ),
        ));
    }

    let mut pixels = frame.data.to_vec();
    if frame.encoding == FrameEncoding::Bgr8 {
        for px in pixels.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
    }

    RgbImage::from_raw(frame.width, frame.height, pixels).ok_or_else(|| {
        HalError::device(crate::DeviceErrorKind::InvalidConfig, "Raw frame buffer too small")
    })
}

fn fit_within(image: RgbImage, max_side: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    let longest = w.max(h);
    if max_side == 0 || longest <= max_side {
        return image;
    }
    let scale = max_side as f32 / longest as f32;
    let nw = ((w as f32 * scale).round() as u32).max(1);
    let nh = ((h as f32 * scale).round() as u32).max(1);
    imageops::resize(&image, nw, nh, FilterType::Triangle)
}
