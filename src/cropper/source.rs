//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“外部输入类型”和“流水线中间结果”解耦：
//! - `ImageSource` 表示宿主提供的源引用
//! - `RawImageData` 表示已加载但未解码的字节
//! - `SourceImage` 表示解码完成、可供裁剪器采样的 RGBA 像素

use image::RgbaImage;

use super::geometry::ImageSize;

/// 源图引用。
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// 网络地址（http / https）。
    Url(String),
    /// Base64（支持 Data URL 与纯 Base64 字符串）。
    Base64(String),
    /// 本地文件路径。
    FilePath(String),
    /// 宿主已持有的原始字节（例如文件选择器读出的 blob）。
    Bytes(Vec<u8>),
}

impl ImageSource {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::Url(_) => "url",
            Self::Base64(_) => "base64",
            Self::FilePath(_) => "file",
            Self::Bytes(_) => "bytes",
        }
    }
}

/// 加载阶段输出：原始字节与来源标识。
pub(crate) struct RawImageData {
    pub(crate) bytes: Vec<u8>,
    /// 来源提示（用于日志与诊断）。
    pub(crate) source_hint: &'static str,
}

/// 解码完成的源图。
///
/// 只会被整体替换，不会原地修改。
#[derive(Debug, Clone)]
pub struct SourceImage {
    pixels: RgbaImage,
}

impl SourceImage {
    pub fn from_rgba(pixels: RgbaImage) -> Self {
        Self { pixels }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn size(&self) -> ImageSize {
        ImageSize::new(self.width(), self.height())
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }
}
