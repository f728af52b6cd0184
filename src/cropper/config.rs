//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中到 `CropperConfig`，保证运行时行为可观测、可调整、可测试。
//! 其中裁剪档位（quality / balanced / speed）作为高层语义，映射到底层参数组合。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用的平衡配置（JPEG 质量 95、节流 16ms）。
//! - `CropProfile` 负责档位字符串解析与反向输出。
//! - `apply_profile` 将档位转换为具体参数，`infer_profile` 从当前配置反推档位。
//! - `apply_settings` 读取宿主传入的 JSON 设置，越界值收敛到安全区间。

use std::time::Duration;

use image::imageops::FilterType;

use super::geometry::{Viewport, ViewportSize};
use super::CropError;

const THROTTLE_INTERVAL_DEFAULT_MS: u64 = 16;
const THROTTLE_INTERVAL_MIN_MS: u64 = 4;
const THROTTLE_INTERVAL_MAX_MS: u64 = 1_000;
const OUTPUT_QUALITY_DEFAULT: u8 = 95;
const MAX_ZOOM_LIMIT: f64 = 20.0;
const MAX_VIEWPORT_DIAMETER: u32 = 4096;

/// 布局宽度 → 视口直径的响应式策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportPolicy {
    /// 布局宽度低于该值时使用紧凑档位（像素）。
    pub breakpoint: u32,
    pub compact_diameter: u32,
    pub default_diameter: u32,
}

impl Default for ViewportPolicy {
    fn default() -> Self {
        Self {
            breakpoint: 640,
            compact_diameter: 128,
            default_diameter: 160,
        }
    }
}

impl ViewportPolicy {
    pub fn size_for_width(&self, layout_width: u32) -> ViewportSize {
        if layout_width < self.breakpoint {
            ViewportSize::Compact
        } else {
            ViewportSize::Default
        }
    }

    pub fn viewport(&self, size: ViewportSize) -> Viewport {
        match size {
            ViewportSize::Compact => Viewport::new(self.compact_diameter),
            ViewportSize::Default => Viewport::new(self.default_diameter),
        }
    }
}

/// 源图加载与解码阶段的资源上限。
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// 下载/读取原始字节时允许的最大体积（字节）。
    pub max_file_size: u64,
    /// 网络下载总超时（秒）。
    pub download_timeout: u64,
    /// 建立连接超时（秒）。
    pub connect_timeout: u64,
    /// 下载分块读取超时（毫秒）。
    pub stream_chunk_timeout_ms: u64,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_file_size: 20 * 1024 * 1024,
            download_timeout: 30,
            connect_timeout: 8,
            stream_chunk_timeout_ms: 15_000,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
        }
    }
}

/// 裁剪结果编码格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// 有损编码，透明区域合成到 `matte` 底色上。
    Jpeg { quality: u8 },
    /// 保留圆形外的透明通道。
    Png,
    /// 无损 WebP，保留透明通道。
    WebP,
}

impl OutputFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg { .. } => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
        }
    }

    fn from_str(format: &str, quality: u8) -> Result<Self, CropError> {
        match format.trim().to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg { quality }),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::WebP),
            other => Err(CropError::InvalidConfig(format!(
                "未知输出格式：{}（可选：jpeg / png / webp）",
                other
            ))),
        }
    }
}

/// 裁剪器配置。
#[derive(Debug, Clone)]
pub struct CropperConfig {
    /// 缩放上限。
    pub max_zoom: f64,
    /// 源图就绪前的缩放下限。
    pub min_zoom_floor: f64,
    /// 键盘单次缩放步长。
    pub zoom_step: f64,
    /// 裁剪结果回调的最小间隔（尾沿节流）。
    pub throttle_interval: Duration,
    pub viewport: ViewportPolicy,
    pub output: OutputFormat,
    /// JPEG 输出时圆形外区域的底色。
    pub matte: [u8; 3],
    /// 预览圆周描边颜色（RGBA）。
    pub border_color: [u8; 4],
    /// 预览描边宽度（像素）。
    pub border_width: f64,
    /// 重采样滤镜。
    pub resize_filter: FilterType,
    pub loader: LoaderConfig,
}

impl Default for CropperConfig {
    fn default() -> Self {
        Self {
            max_zoom: 3.0,
            min_zoom_floor: 0.1,
            zoom_step: 0.1,
            throttle_interval: Duration::from_millis(THROTTLE_INTERVAL_DEFAULT_MS),
            viewport: ViewportPolicy::default(),
            output: OutputFormat::Jpeg {
                quality: OUTPUT_QUALITY_DEFAULT,
            },
            matte: [255, 255, 255],
            border_color: [255, 255, 255, 160],
            border_width: 2.0,
            resize_filter: FilterType::Triangle,
            loader: LoaderConfig::default(),
        }
    }
}

/// 裁剪档位（面向产品语义）。
///
/// - `Quality`：尽量保真
/// - `Balanced`：质量与性能平衡
/// - `Speed`：优先交互流畅
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropProfile {
    Quality,
    Balanced,
    Speed,
}

impl CropProfile {
    /// 从外部字符串解析档位。
    ///
    /// # 示例
    /// ```rust
    /// use avatar_cropper::cropper::CropProfile;
    ///
    /// let p = CropProfile::from_str("balanced")?;
    /// assert_eq!(p.as_str(), "balanced");
    /// # Ok::<(), avatar_cropper::cropper::CropError>(())
    /// ```
    pub fn from_str(profile: &str) -> Result<Self, CropError> {
        match profile.trim().to_lowercase().as_str() {
            "quality" => Ok(Self::Quality),
            "balanced" => Ok(Self::Balanced),
            "speed" => Ok(Self::Speed),
            other => Err(CropError::InvalidConfig(format!(
                "未知裁剪档位：{}（可选：quality / balanced / speed）",
                other
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Balanced => "balanced",
            Self::Speed => "speed",
        }
    }
}

fn normalize_throttle_interval_ms(value_ms: u64) -> u64 {
    value_ms.clamp(THROTTLE_INTERVAL_MIN_MS, THROTTLE_INTERVAL_MAX_MS)
}

fn normalize_diameter(value: u64) -> u32 {
    value.clamp(1, MAX_VIEWPORT_DIAMETER as u64) as u32
}

impl CropperConfig {
    /// 基于当前参数反推档位。
    pub fn infer_profile(&self) -> CropProfile {
        if matches!(self.resize_filter, FilterType::Lanczos3 | FilterType::CatmullRom) {
            return CropProfile::Quality;
        }

        if self.resize_filter == FilterType::Nearest
            || self.throttle_interval > Duration::from_millis(THROTTLE_INTERVAL_DEFAULT_MS)
        {
            return CropProfile::Speed;
        }

        CropProfile::Balanced
    }

    /// 应用指定档位到实际参数。
    ///
    /// 仅在 JPEG 输出时调整质量，PNG/WebP 为无损格式。
    pub fn apply_profile(&mut self, profile: CropProfile) {
        let (filter, quality, interval_ms) = match profile {
            CropProfile::Quality => (FilterType::Lanczos3, 98, THROTTLE_INTERVAL_DEFAULT_MS),
            CropProfile::Balanced => (
                FilterType::Triangle,
                OUTPUT_QUALITY_DEFAULT,
                THROTTLE_INTERVAL_DEFAULT_MS,
            ),
            CropProfile::Speed => (FilterType::Nearest, 85, 33),
        };

        self.resize_filter = filter;
        self.throttle_interval = Duration::from_millis(interval_ms);
        if let OutputFormat::Jpeg { quality: q } = &mut self.output {
            *q = quality;
        }

        log::debug!(
            "⚙️ 已切换裁剪档位：{:?}（filter={:?}, throttle={}ms, output={:?}）",
            profile,
            self.resize_filter,
            interval_ms,
            self.output
        );
    }

    /// 读取宿主传入的 JSON 设置（camelCase 键），未出现的键保持原值。
    ///
    /// 先应用 `cropProfile`，再应用逐项覆盖。任一键非法时整体不生效。
    pub fn apply_settings(&mut self, settings: &serde_json::Value) -> Result<(), CropError> {
        let mut staged = self.clone();
        staged.merge_settings(settings)?;
        staged.validate()?;
        *self = staged;
        Ok(())
    }

    fn merge_settings(&mut self, settings: &serde_json::Value) -> Result<(), CropError> {
        if let Some(profile) = settings.get("cropProfile").and_then(|v| v.as_str()) {
            self.apply_profile(CropProfile::from_str(profile)?);
        }

        if let Some(max_zoom) = settings.get("cropMaxZoom").and_then(|v| v.as_f64()) {
            self.max_zoom = max_zoom.clamp(self.min_zoom_floor, MAX_ZOOM_LIMIT);
        }

        if let Some(step) = settings.get("cropZoomStep").and_then(|v| v.as_f64()) {
            self.zoom_step = step.clamp(0.01, 1.0);
        }

        if let Some(interval) = settings
            .get("cropThrottleIntervalMs")
            .and_then(|v| v.as_u64())
        {
            self.throttle_interval = Duration::from_millis(normalize_throttle_interval_ms(interval));
        }

        let quality = settings
            .get("cropOutputQuality")
            .and_then(|v| v.as_u64())
            .map(|q| q.clamp(1, 100) as u8);

        if let Some(format) = settings.get("cropOutputFormat").and_then(|v| v.as_str()) {
            let current_quality = match self.output {
                OutputFormat::Jpeg { quality } => quality,
                _ => OUTPUT_QUALITY_DEFAULT,
            };
            self.output = OutputFormat::from_str(format, quality.unwrap_or(current_quality))?;
        } else if let (Some(q), OutputFormat::Jpeg { quality }) = (quality, &mut self.output) {
            *quality = q;
        }

        if let Some(breakpoint) = settings.get("cropBreakpoint").and_then(|v| v.as_u64()) {
            self.viewport.breakpoint = breakpoint.min(u32::MAX as u64) as u32;
        }
        if let Some(d) = settings.get("cropCompactDiameter").and_then(|v| v.as_u64()) {
            self.viewport.compact_diameter = normalize_diameter(d);
        }
        if let Some(d) = settings.get("cropDefaultDiameter").and_then(|v| v.as_u64()) {
            self.viewport.default_diameter = normalize_diameter(d);
        }

        Ok(())
    }

    /// 校验配置前置条件。
    pub fn validate(&self) -> Result<(), CropError> {
        if self.viewport.compact_diameter == 0 || self.viewport.default_diameter == 0 {
            return Err(CropError::InvalidConfig("视口直径必须大于 0".to_string()));
        }
        if !(self.min_zoom_floor.is_finite() && self.min_zoom_floor > 0.0) {
            return Err(CropError::InvalidConfig("min_zoom_floor 必须为正数".to_string()));
        }
        if !(self.max_zoom.is_finite() && self.max_zoom >= self.min_zoom_floor) {
            return Err(CropError::InvalidConfig(
                "max_zoom 必须为有限值且不小于 min_zoom_floor".to_string(),
            ));
        }
        if !(self.zoom_step.is_finite() && self.zoom_step > 0.0) {
            return Err(CropError::InvalidConfig("zoom_step 必须为正数".to_string()));
        }
        if let OutputFormat::Jpeg { quality } = self.output {
            if !(1..=100).contains(&quality) {
                return Err(CropError::InvalidConfig("JPEG 质量必须在 1~100 之间".to_string()));
            }
        }
        if !(self.border_width.is_finite() && self.border_width >= 0.0) {
            return Err(CropError::InvalidConfig("border_width 不能为负数".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_config_is_valid_and_balanced() {
        let config = CropperConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.infer_profile(), CropProfile::Balanced);
        assert_eq!(config.output, OutputFormat::Jpeg { quality: 95 });
    }

    #[test]
    fn viewport_policy_switches_at_breakpoint() {
        let policy = ViewportPolicy::default();
        assert_eq!(policy.size_for_width(639), ViewportSize::Compact);
        assert_eq!(policy.size_for_width(640), ViewportSize::Default);
        assert_eq!(policy.viewport(ViewportSize::Compact), Viewport::new(128));
        assert_eq!(policy.viewport(ViewportSize::Default), Viewport::new(160));
    }

    #[test]
    fn profile_roundtrip_through_config() {
        let mut config = CropperConfig::default();

        for name in ["quality", "speed", "balanced"] {
            let profile = CropProfile::from_str(name).expect("profile should parse");
            config.apply_profile(profile);
            assert_eq!(config.infer_profile().as_str(), name);
        }
    }

    #[test]
    fn rejects_unknown_profile() {
        let result = CropProfile::from_str("ultra");
        assert!(matches!(result, Err(CropError::InvalidConfig(_))));
    }

    #[test]
    fn settings_are_normalized_into_bounds() {
        let mut config = CropperConfig::default();
        config
            .apply_settings(&json!({
                "cropThrottleIntervalMs": 1,
                "cropMaxZoom": 100.0,
                "cropOutputQuality": 250,
                "cropCompactDiameter": 0,
                "cropDefaultDiameter": 200,
            }))
            .expect("settings should apply");

        assert_eq!(config.throttle_interval, Duration::from_millis(4));
        assert_eq!(config.max_zoom, 20.0);
        assert_eq!(config.output, OutputFormat::Jpeg { quality: 100 });
        assert_eq!(config.viewport.compact_diameter, 1);
        assert_eq!(config.viewport.default_diameter, 200);
    }

    #[test]
    fn settings_switch_output_format() {
        let mut config = CropperConfig::default();
        config
            .apply_settings(&json!({ "cropOutputFormat": "png" }))
            .expect("png should be accepted");
        assert_eq!(config.output, OutputFormat::Png);

        let result = config.apply_settings(&json!({ "cropOutputFormat": "gif" }));
        assert!(matches!(result, Err(CropError::InvalidConfig(_))));
    }

    #[test]
    fn failed_settings_leave_config_untouched() {
        let mut config = CropperConfig::default();
        let result = config.apply_settings(&json!({
            "cropMaxZoom": 10.0,
            "cropProfile": "speed",
            "cropOutputFormat": "gif",
        }));

        assert!(matches!(result, Err(CropError::InvalidConfig(_))));
        assert_eq!(config.max_zoom, 3.0);
        assert_eq!(config.infer_profile(), CropProfile::Balanced);
        assert_eq!(config.output, OutputFormat::Jpeg { quality: 95 });
    }

    #[test]
    fn validate_rejects_zero_diameter() {
        let mut config = CropperConfig::default();
        config.viewport.default_diameter = 0;
        assert!(matches!(config.validate(), Err(CropError::InvalidConfig(_))));
    }
}
