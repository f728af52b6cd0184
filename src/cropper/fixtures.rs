//! 单元测试共享的图片构造工具。

use std::io::Cursor;

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba, RgbaImage};

use super::SourceImage;

/// 生成带坐标渐变的 RGBA 图片，便于按像素断言采样位置。
pub(crate) fn gradient_rgba(width: u32, height: u32) -> RgbaImage {
    ImageBuffer::from_fn(width, height, |x, y| {
        let r = (x % 255) as u8;
        let g = (y % 255) as u8;
        let b = ((x + y) % 255) as u8;
        Rgba([r, g, b, 255])
    })
}

pub(crate) fn gradient_source(width: u32, height: u32) -> SourceImage {
    SourceImage::from_rgba(gradient_rgba(width, height))
}

pub(crate) fn solid_source(width: u32, height: u32, color: [u8; 4]) -> SourceImage {
    SourceImage::from_rgba(ImageBuffer::from_pixel(width, height, Rgba(color)))
}

pub(crate) fn create_png_bytes(width: u32, height: u32) -> Vec<u8> {
    let dyn_img = DynamicImage::ImageRgba8(gradient_rgba(width, height));
    let mut cursor = Cursor::new(Vec::new());
    dyn_img
        .write_to(&mut cursor, ImageFormat::Png)
        .expect("failed to encode test image");
    cursor.into_inner()
}
