//! # 解码流水线模块
//!
//! ## 设计思路
//!
//! 将“字节 → 图像 → RGBA”的过程集中管理，并在关键节点增加资源上限控制。
//! 优先读取 header 尺寸做检查，再进行完整解码，降低恶意输入触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. 猜测格式并构建解码器
//! 2. 按 header 尺寸做像素 / 内存上限快速拒绝
//! 3. 完整解码并应用 EXIF 方向
//! 4. 转换为 RGBA
//!
//! 解码是裁剪器唯一的异步挂起点：每次请求都带一个 `SourceTicket`，
//! 结果回到引擎时由引擎判断票据是否已过期。

use std::io::Cursor;
use std::time::Instant;

use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader};

use super::config::LoaderConfig;
use super::loader::SourceLoader;
use super::source::{ImageSource, RawImageData, SourceImage};
use super::CropError;

/// 源图请求票据，单调递增。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SourceTicket(u64);

impl SourceTicket {
    pub(crate) fn new(generation: u64) -> Self {
        Self(generation)
    }

    pub fn generation(self) -> u64 {
        self.0
    }
}

/// 已登记、尚未加载的源图请求。
#[derive(Debug)]
pub struct PendingSource {
    ticket: SourceTicket,
    source: ImageSource,
}

impl PendingSource {
    pub(crate) fn new(ticket: SourceTicket, source: ImageSource) -> Self {
        Self { ticket, source }
    }

    pub fn ticket(&self) -> SourceTicket {
        self.ticket
    }

    /// 加载并解码；不持有引擎借用，可与其它交互并发进行。
    pub async fn load(self, loader: &SourceLoader) -> LoadedSource {
        let result = load_source(loader, self.source).await;
        LoadedSource {
            ticket: self.ticket,
            result,
        }
    }
}

/// 一次加载的结果，交回 `CropperEngine::finish_load`。
#[derive(Debug)]
pub struct LoadedSource {
    pub ticket: SourceTicket,
    pub result: Result<SourceImage, CropError>,
}

/// 加载并解码源图，解码在阻塞线程池中执行。
pub async fn load_source(loader: &SourceLoader, source: ImageSource) -> Result<SourceImage, CropError> {
    let total_start = Instant::now();
    let kind = source.kind();

    let raw = loader.load_raw(source).await?;
    let load_elapsed = total_start.elapsed();

    let config = loader.config().clone();
    let decode_start = Instant::now();
    let image = tokio::task::spawn_blocking(move || decode_source(raw, &config))
        .await
        .map_err(|e| CropError::Decode(format!("解码任务异常退出：{}", e)))??;

    log::info!(
        "✅ 源图就绪 - 来源: {} 尺寸: {}x{} load={}ms decode={}ms",
        kind,
        image.width(),
        image.height(),
        load_elapsed.as_millis(),
        decode_start.elapsed().as_millis()
    );

    Ok(image)
}

/// 将原始字节解码为 `SourceImage`。
pub(crate) fn decode_source(raw: RawImageData, config: &LoaderConfig) -> Result<SourceImage, CropError> {
    let reader = ImageReader::new(Cursor::new(raw.bytes.as_slice()))
        .with_guessed_format()
        .map_err(|e| CropError::InvalidFormat(format!("无法识别图片格式：{}", e)))?;

    let mut decoder = reader
        .into_decoder()
        .map_err(|e| CropError::InvalidFormat(format!("不支持的图片格式：{}", e)))?;

    let (header_width, header_height) = decoder.dimensions();
    validate_pixel_limits(config, header_width, header_height)?;
    validate_decoded_memory_limits(config, header_width, header_height)?;

    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);
    let mut decoded = DynamicImage::from_decoder(decoder)
        .map_err(|e| CropError::Decode(format!("图片解码失败：{}", e)))?;
    decoded.apply_orientation(orientation);

    let rgba = decoded.to_rgba8();
    if rgba.width() == 0 || rgba.height() == 0 {
        return Err(CropError::Decode("解码结果尺寸为 0".to_string()));
    }

    log::debug!(
        "🧩 解码完成 - 来源: {} 尺寸: {}x{}（orientation={:?}）",
        raw.source_hint,
        rgba.width(),
        rgba.height(),
        orientation
    );

    Ok(SourceImage::from_rgba(rgba))
}

/// 校验像素数量是否超过配置上限。
fn validate_pixel_limits(config: &LoaderConfig, width: u32, height: u32) -> Result<(), CropError> {
    let pixels = (width as u64)
        .checked_mul(height as u64)
        .ok_or_else(|| CropError::ResourceLimit("图片像素数溢出".to_string()))?;

    if pixels > config.max_decoded_pixels {
        return Err(CropError::ResourceLimit(format!(
            "图片像素过大：{} 像素（限制：{} 像素）",
            pixels, config.max_decoded_pixels
        )));
    }

    Ok(())
}

fn validate_decoded_memory_limits(config: &LoaderConfig, width: u32, height: u32) -> Result<(), CropError> {
    let estimated = (width as u64)
        .checked_mul(height as u64)
        .and_then(|pixels| pixels.checked_mul(4))
        .ok_or_else(|| CropError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

    if estimated > config.max_decoded_bytes {
        return Err(CropError::ResourceLimit(format!(
            "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
            estimated as f64 / 1024.0 / 1024.0,
            config.max_decoded_bytes as f64 / 1024.0 / 1024.0
        )));
    }

    Ok(())
}
