//! # 光栅化模块
//!
//! ## 设计思路
//!
//! 预览与最终输出共用同一套几何：把视口反投影到源图上得到一个正方形采样区域，
//! 再重采样到 `D x D`，最后套上内切圆遮罩。
//!
//! - 采样区域完全落在源图内（覆盖约束成立时总是如此）：`fast_image_resize` 亚像素裁剪 + 缩放
//! - 区域越界或快速路径失败：回退 `image::imageops`，只绘制与源图相交的部分，其余保持透明
//!
//! 预览额外叠加一圈浅色描边；输出按配置编码为 JPEG / PNG / WebP。

use std::io::Cursor;

use fast_image_resize as fr;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};

use super::config::OutputFormat;
use super::geometry::{ImageSize, Transform, Viewport};
use super::{CropError, SourceImage};

/// 容忍浮点误差的越界量（源图像素）。
const REGION_EPSILON: f64 = 1e-6;

/// 视口在源图坐标系中对应的正方形区域。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceRegion {
    pub left: f64,
    pub top: f64,
    pub side: f64,
}

impl SourceRegion {
    fn fits_within(&self, size: ImageSize) -> bool {
        self.left >= -REGION_EPSILON
            && self.top >= -REGION_EPSILON
            && self.left + self.side <= size.width as f64 + REGION_EPSILON
            && self.top + self.side <= size.height as f64 + REGION_EPSILON
    }

    fn clamped_to(&self, size: ImageSize) -> Self {
        let side = self.side.min(size.width as f64).min(size.height as f64);
        Self {
            left: self.left.clamp(0.0, size.width as f64 - side),
            top: self.top.clamp(0.0, size.height as f64 - side),
            side,
        }
    }
}

/// 计算视口对应的源图采样区域。
///
/// 视口像素 `(u, v)` 映射到源图 `((u - D/2 - ox) / s + w/2, (v - D/2 - oy) / s + h/2)`。
pub fn source_region(size: ImageSize, transform: &Transform, viewport: Viewport) -> Option<SourceRegion> {
    let scale = transform.scale;
    if size.is_empty() || viewport.is_degenerate() || !scale.is_finite() || scale <= 0.0 {
        return None;
    }
    if !(transform.offset.x.is_finite() && transform.offset.y.is_finite()) {
        return None;
    }

    let radius = viewport.radius();
    Some(SourceRegion {
        left: size.width as f64 / 2.0 - (radius + transform.offset.x) / scale,
        top: size.height as f64 / 2.0 - (radius + transform.offset.y) / scale,
        side: viewport.diameter as f64 / scale,
    })
}

/// 合成圆形遮罩后的 `D x D` RGBA 图像。
pub fn composite_circle(
    source: &SourceImage,
    transform: &Transform,
    viewport: Viewport,
    filter: FilterType,
) -> Option<RgbaImage> {
    let region = source_region(source.size(), transform, viewport)?;
    let diameter = viewport.diameter;

    let mut canvas = if region.fits_within(source.size()) {
        let region = region.clamped_to(source.size());
        match resample_fast(source.pixels(), region, diameter, filter) {
            Ok(image) => image,
            Err(err) => {
                log::warn!("⚠️ fast_image_resize 重采样失败，回退 imageops：{}", err);
                resample_fallback(source.pixels(), region, diameter, filter)
            }
        }
    } else {
        resample_fallback(source.pixels(), region, diameter, filter)
    };

    apply_circular_mask(&mut canvas);
    Some(canvas)
}

/// 在圆周内侧叠加描边。
pub fn stroke_circle_border(image: &mut RgbaImage, color: [u8; 4], width: f64) {
    if width <= 0.0 || color[3] == 0 {
        return;
    }

    let radius = image.width().min(image.height()) as f64 / 2.0;
    let ring_center = radius - width / 2.0;
    let half_width = width / 2.0;

    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let dist = distance_from_center(x, y, radius);
        let coverage = (half_width + 0.5 - (dist - ring_center).abs()).clamp(0.0, 1.0);
        if coverage > 0.0 {
            blend_over(pixel, color, coverage);
        }
    }
}

/// 按格式编码；JPEG 无透明通道，先合成到 `matte` 底色。
pub fn encode(image: &RgbaImage, format: OutputFormat, matte: [u8; 3]) -> Result<Vec<u8>, CropError> {
    let mut buffer = Vec::new();

    match format {
        OutputFormat::Jpeg { quality } => {
            let flattened = flatten_onto_matte(image, matte);
            let mut encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
            encoder
                .encode_image(&flattened)
                .map_err(|e| CropError::Encode(format!("JPEG 编码失败：{}", e)))?;
        }
        OutputFormat::Png => {
            image
                .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
                .map_err(|e| CropError::Encode(format!("PNG 编码失败：{}", e)))?;
        }
        OutputFormat::WebP => {
            image
                .write_to(&mut Cursor::new(&mut buffer), ImageFormat::WebP)
                .map_err(|e| CropError::Encode(format!("WebP 编码失败：{}", e)))?;
        }
    }

    Ok(buffer)
}

fn resample_fast(
    src: &RgbaImage,
    region: SourceRegion,
    diameter: u32,
    filter: FilterType,
) -> Result<RgbaImage, CropError> {
    let src_view = fr::images::ImageRef::new(src.width(), src.height(), src.as_raw(), fr::PixelType::U8x4)
        .map_err(|e| CropError::Decode(format!("构建源图像视图失败：{}", e)))?;

    let mut dst_image = fr::images::Image::new(diameter, diameter, fr::PixelType::U8x4);

    let options = fr::ResizeOptions::new()
        .resize_alg(to_fast_alg(filter))
        .crop(region.left, region.top, region.side, region.side);

    fr::Resizer::new()
        .resize(&src_view, &mut dst_image, Some(&options))
        .map_err(|e| CropError::Decode(format!("fast_image_resize 执行失败：{}", e)))?;

    RgbaImage::from_raw(diameter, diameter, dst_image.into_vec())
        .ok_or_else(|| CropError::Decode("fast_image_resize 输出缓冲长度异常".to_string()))
}

/// 只绘制采样区域与源图相交的部分，其余像素保持透明。
fn resample_fallback(src: &RgbaImage, region: SourceRegion, diameter: u32, filter: FilterType) -> RgbaImage {
    let mut canvas = RgbaImage::new(diameter, diameter);
    let (width, height) = (src.width() as f64, src.height() as f64);

    let x0 = region.left.max(0.0).floor();
    let y0 = region.top.max(0.0).floor();
    let x1 = (region.left + region.side).min(width).ceil();
    let y1 = (region.top + region.side).min(height).ceil();
    if x1 <= x0 || y1 <= y0 {
        return canvas;
    }

    let scale = diameter as f64 / region.side;
    let crop_w = (x1 - x0) as u32;
    let crop_h = (y1 - y0) as u32;
    let target_w = ((crop_w as f64) * scale).round().max(1.0) as u32;
    let target_h = ((crop_h as f64) * scale).round().max(1.0) as u32;

    let cropped = imageops::crop_imm(src, x0 as u32, y0 as u32, crop_w, crop_h).to_image();
    let resized = imageops::resize(&cropped, target_w, target_h, filter);

    let dest_x = ((x0 - region.left) * scale).round() as i64;
    let dest_y = ((y0 - region.top) * scale).round() as i64;
    imageops::replace(&mut canvas, &resized, dest_x, dest_y);

    canvas
}

fn to_fast_alg(filter: FilterType) -> fr::ResizeAlg {
    match filter {
        FilterType::Nearest => fr::ResizeAlg::Nearest,
        FilterType::Triangle => fr::ResizeAlg::Convolution(fr::FilterType::Bilinear),
        FilterType::CatmullRom => fr::ResizeAlg::Convolution(fr::FilterType::CatmullRom),
        FilterType::Gaussian => fr::ResizeAlg::Convolution(fr::FilterType::Mitchell),
        FilterType::Lanczos3 => fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3),
    }
}

fn distance_from_center(x: u32, y: u32, radius: f64) -> f64 {
    let dx = x as f64 + 0.5 - radius;
    let dy = y as f64 + 0.5 - radius;
    (dx * dx + dy * dy).sqrt()
}

/// 内切圆遮罩，边缘一像素抗锯齿。
fn apply_circular_mask(image: &mut RgbaImage) {
    let radius = image.width().min(image.height()) as f64 / 2.0;

    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let coverage = (radius + 0.5 - distance_from_center(x, y, radius)).clamp(0.0, 1.0);
        if coverage < 1.0 {
            pixel.0[3] = (pixel.0[3] as f64 * coverage).round() as u8;
        }
    }
}

fn blend_over(dst: &mut Rgba<u8>, color: [u8; 4], coverage: f64) {
    let src_a = color[3] as f64 / 255.0 * coverage;
    let dst_a = dst.0[3] as f64 / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);
    if out_a <= 0.0 {
        return;
    }

    for c in 0..3 {
        let value = (color[c] as f64 * src_a + dst.0[c] as f64 * dst_a * (1.0 - src_a)) / out_a;
        dst.0[c] = value.round().clamp(0.0, 255.0) as u8;
    }
    dst.0[3] = (out_a * 255.0).round() as u8;
}

fn flatten_onto_matte(image: &RgbaImage, matte: [u8; 3]) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let [r, g, b, a] = image.get_pixel(x, y).0;
        let alpha = a as f64 / 255.0;
        let mix = |fg: u8, bg: u8| (fg as f64 * alpha + bg as f64 * (1.0 - alpha)).round() as u8;
        Rgb([mix(r, matte[0]), mix(g, matte[1]), mix(b, matte[2])])
    })
}
