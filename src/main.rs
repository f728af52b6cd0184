//! # 圆形头像裁剪 — 命令行入口
//!
//! 加载一张源图，按指定布局宽度与缩放生成圆形头像并写入文件：
//!
//! ```text
//! avatar-cropper <source> <output> [layout-width] [scale | transform-json]
//! ```
//!
//! `source` 可以是 http(s) URL、data URL 或本地路径；输出格式按扩展名选择。
//! 第四个参数可以是缩放倍率，也可以是上次输出的变换 JSON（`{"scale":..,"offset":{"x":..,"y":..}}`）。

use std::path::Path;
use std::process::ExitCode;

use avatar_cropper::cropper::{
    CropError, CroppedOutput, CropperConfig, CropperEngine, CropperHost, ImageSource, OutputFormat,
    SourceLoader, Transform,
};

const USAGE: &str = "用法：avatar-cropper <source> <output> [layout-width] [scale | transform-json]";

/// 只保留最后一次裁剪结果的宿主。
#[derive(Default)]
struct LatestCrop(Option<CroppedOutput>);

impl CropperHost for LatestCrop {
    fn on_min_scale_change(&mut self, min_scale: f64) {
        log::debug!("最小缩放：{:.3}", min_scale);
    }

    fn on_crop_complete(&mut self, output: CroppedOutput) {
        self.0 = Some(output);
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("❌ 裁剪失败（{}）：{}", err.code(), err);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), CropError> {
    let mut args = std::env::args().skip(1);
    let (Some(input), Some(output_path)) = (args.next(), args.next()) else {
        return Err(CropError::InvalidConfig(USAGE.to_string()));
    };
    let layout_width = args
        .next()
        .map(|value| value.parse::<u32>())
        .transpose()
        .map_err(|e| CropError::InvalidConfig(format!("layout-width 无效：{}", e)))?
        .unwrap_or(1024);
    let adjustment = args.next().map(|value| parse_adjustment(&value)).transpose()?;

    let mut config = CropperConfig::default();
    if let Some(format) = output_format_for(Path::new(&output_path)) {
        config.output = format;
    }

    let loader = SourceLoader::new(config.loader.clone())?;
    let mut engine = CropperEngine::new(config, LatestCrop::default())?;
    if let Some(Adjustment::Restore(transform)) = adjustment {
        engine = engine.with_transform(transform);
    }
    engine.on_layout_width(layout_width);

    let loaded = engine.request_source(classify_source(input)).load(&loader).await;
    let ticket = loaded.ticket;
    let image = loaded.result?;
    engine.on_source_ready(ticket, image);

    if let Some(Adjustment::Scale(scale)) = adjustment {
        engine.set_scale(scale);
    }
    if let Some(deadline) = engine.next_crop_deadline() {
        tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
        engine.poll_crop();
    }

    let Some(crop) = engine.host_mut().0.take() else {
        return Err(CropError::Encode("没有生成裁剪结果".to_string()));
    };

    std::fs::write(&output_path, &crop.bytes)
        .map_err(|e| CropError::FileSystem(format!("写入 {} 失败：{}", output_path, e)))?;

    let transform_json = serde_json::to_string(&crop.transform)
        .map_err(|e| CropError::Encode(format!("变换序列化失败：{}", e)))?;
    log::info!(
        "💾 已写出 {} - {}px {} transform={}",
        output_path,
        crop.diameter,
        crop.mime_type,
        transform_json
    );
    Ok(())
}

/// 第四个参数：缩放倍率或已保存的变换。
#[derive(Debug, Clone, Copy)]
enum Adjustment {
    Scale(f64),
    Restore(Transform),
}

fn parse_adjustment(value: &str) -> Result<Adjustment, CropError> {
    if value.trim_start().starts_with('{') {
        return serde_json::from_str(value)
            .map(Adjustment::Restore)
            .map_err(|e| CropError::InvalidConfig(format!("transform JSON 无效：{}", e)));
    }

    value
        .parse::<f64>()
        .map(Adjustment::Scale)
        .map_err(|e| CropError::InvalidConfig(format!("scale 无效：{}", e)))
}

fn classify_source(input: String) -> ImageSource {
    if input.starts_with("http://") || input.starts_with("https://") {
        ImageSource::Url(input)
    } else if input.starts_with("data:") {
        ImageSource::Base64(input)
    } else {
        ImageSource::FilePath(input)
    }
}

fn output_format_for(path: &Path) -> Option<OutputFormat> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some(OutputFormat::Png),
        "webp" => Some(OutputFormat::WebP),
        "jpg" | "jpeg" => Some(OutputFormat::Jpeg { quality: 95 }),
        _ => None,
    }
}
