//! # 几何模块
//!
//! ## 设计思路
//!
//! 裁剪器的全部约束都可以归结为一条规则：缩放后的图片必须完整覆盖圆形视口。
//! 这里把这条规则拆成两个纯函数：
//!
//! - `compute_min_scale`：覆盖所需的最小缩放（cover fit）
//! - `clamp_offset`：给定缩放后，偏移量允许的对称区间
//!
//! 算法纯函数化：输入为源图尺寸、变换、视口，输出唯一结果，便于测试。
//! 对异常输入（零尺寸源图、零直径视口、非有限缩放）一律退化为空操作，不做除零。

use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

/// 视口像素坐标系中的点，也用来表示偏移量。
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// 裁剪变换：缩放倍率 + 图片中心相对视口中心的偏移。
///
/// 宿主可以把它序列化为 JSON 持久化，下次通过 `CropperEngine::with_transform` 还原。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// 作用在源图原始像素尺寸上的倍率。
    pub scale: f64,
    /// 缩放后图片中心相对视口中心的位移（视口像素，可为负）。
    pub offset: Point,
}

impl Transform {
    pub const fn new(scale: f64, offset: Point) -> Self {
        Self { scale, offset }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            scale: 1.0,
            offset: Point::ZERO,
        }
    }
}

/// 源图原始像素尺寸。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// 圆形视口，只由直径决定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Viewport {
    pub diameter: u32,
}

impl Viewport {
    pub const fn new(diameter: u32) -> Self {
        Self { diameter }
    }

    pub fn radius(&self) -> f64 {
        self.diameter as f64 / 2.0
    }

    pub fn is_degenerate(&self) -> bool {
        self.diameter == 0
    }
}

/// 布局宽度信号对应的视口档位。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewportSize {
    Compact,
    Default,
}

/// 覆盖视口所需的最小缩放：`max(D / w, D / h)`。
///
/// 源图或视口尺寸为 0 时返回 `None`。
///
/// # 示例
/// ```rust
/// use avatar_cropper::cropper::{compute_min_scale, ImageSize, Viewport};
///
/// let min = compute_min_scale(ImageSize::new(400, 200), Viewport::new(160));
/// assert_eq!(min, Some(0.8));
/// ```
pub fn compute_min_scale(source: ImageSize, viewport: Viewport) -> Option<f64> {
    if source.is_empty() || viewport.is_degenerate() {
        return None;
    }

    let diameter = viewport.diameter as f64;
    Some((diameter / source.width as f64).max(diameter / source.height as f64))
}

/// 给定缩放下偏移量在 X/Y 两轴上允许的最大绝对值。
///
/// 区间对称：`[-max, max]`。缩放后图片比视口还小的轴返回 0。
pub fn max_offset(source: ImageSize, scale: f64, viewport: Viewport) -> Option<Point> {
    if source.is_empty() || viewport.is_degenerate() || !scale.is_finite() || scale <= 0.0 {
        return None;
    }

    let diameter = viewport.diameter as f64;
    let scaled_width = source.width as f64 * scale;
    let scaled_height = source.height as f64 * scale;

    Some(Point::new(
        ((scaled_width - diameter) / 2.0).max(0.0),
        ((scaled_height - diameter) / 2.0).max(0.0),
    ))
}

/// 将偏移量收敛到合法区间，保证圆形视口内不会露出源图之外的空白。
///
/// 前置条件不满足时原样返回 `transform.offset`。
///
/// # 后置条件
/// - `|result.x| <= max(0, (scale * w - D) / 2)`
/// - `|result.y| <= max(0, (scale * h - D) / 2)`
/// - `clamp_offset(clamp_offset(o)) == clamp_offset(o)`
pub fn clamp_offset(source: ImageSize, transform: &Transform, viewport: Viewport) -> Point {
    let Some(limit) = max_offset(source, transform.scale, viewport) else {
        return transform.offset;
    };

    Point::new(
        clamp_axis(transform.offset.x, limit.x),
        clamp_axis(transform.offset.y, limit.y),
    )
}

fn clamp_axis(value: f64, limit: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(-limit, limit)
}

/// 缩放允许区间。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomBounds {
    pub min: f64,
    pub max: f64,
}

impl ZoomBounds {
    /// 下限取当前 cover fit 最小缩放，源图未就绪时取 `floor`。
    ///
    /// 源图过小时 cover fit 可能超过 `max_zoom`，此时上限抬到下限，覆盖约束优先。
    pub fn new(min_scale: Option<f64>, floor: f64, max_zoom: f64) -> Self {
        let min = min_scale.unwrap_or(floor);
        Self {
            min,
            max: max_zoom.max(min),
        }
    }

    pub fn clamp(&self, scale: f64) -> f64 {
        if !scale.is_finite() {
            return self.min;
        }
        scale.clamp(self.min, self.max)
    }
}

/// 键盘缩放方向。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomKey {
    In,
    Out,
}

impl ZoomKey {
    /// `+` / `=` 放大，`-` / `_` 缩小，其余按键忽略。
    pub fn from_char(key: char) -> Option<Self> {
        match key {
            '+' | '=' => Some(Self::In),
            '-' | '_' => Some(Self::Out),
            _ => None,
        }
    }

    /// 按固定步长推进缩放，结果按 1e-6 取整以消除累加误差。
    pub fn step(self, scale: f64, step: f64) -> f64 {
        let next = match self {
            Self::In => scale + step,
            Self::Out => scale - step,
        };
        (next * 1_000_000.0).round() / 1_000_000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_scale_picks_the_covering_axis() {
        let min = compute_min_scale(ImageSize::new(400, 200), Viewport::new(160));
        assert_eq!(min, Some(0.8));

        let min = compute_min_scale(ImageSize::new(100, 400), Viewport::new(200));
        assert_eq!(min, Some(2.0));
    }

    #[test]
    fn min_scale_rejects_degenerate_inputs() {
        assert_eq!(compute_min_scale(ImageSize::new(0, 200), Viewport::new(160)), None);
        assert_eq!(compute_min_scale(ImageSize::new(400, 200), Viewport::new(0)), None);
    }

    #[test]
    fn clamp_offset_limits_each_axis_independently() {
        let source = ImageSize::new(400, 200);
        let viewport = Viewport::new(160);
        let transform = Transform::new(1.0, Point::new(300.0, 300.0));

        assert_eq!(clamp_offset(source, &transform, viewport), Point::new(120.0, 20.0));

        let transform = Transform::new(1.0, Point::new(-300.0, -5.0));
        assert_eq!(clamp_offset(source, &transform, viewport), Point::new(-120.0, -5.0));
    }

    #[test]
    fn clamp_offset_pins_axis_when_image_is_not_larger_than_viewport() {
        let source = ImageSize::new(400, 200);
        let viewport = Viewport::new(160);
        let transform = Transform::new(0.8, Point::new(50.0, 50.0));

        let clamped = clamp_offset(source, &transform, viewport);
        assert_eq!(clamped.x, 50.0);
        assert_eq!(clamped.y, 0.0);
    }

    #[test]
    fn clamp_offset_is_noop_for_degenerate_inputs() {
        let transform = Transform::new(1.0, Point::new(42.0, -7.0));

        assert_eq!(
            clamp_offset(ImageSize::new(0, 0), &transform, Viewport::new(160)),
            transform.offset
        );
        assert_eq!(
            clamp_offset(ImageSize::new(400, 200), &transform, Viewport::new(0)),
            transform.offset
        );

        let bad_scale = Transform::new(f64::NAN, Point::new(1.0, 1.0));
        assert_eq!(
            clamp_offset(ImageSize::new(400, 200), &bad_scale, Viewport::new(160)),
            bad_scale.offset
        );
    }

    #[test]
    fn clamp_offset_maps_nan_offset_to_center() {
        let transform = Transform::new(1.0, Point::new(f64::NAN, 10.0));
        let clamped = clamp_offset(ImageSize::new(400, 200), &transform, Viewport::new(160));

        assert_eq!(clamped, Point::new(0.0, 10.0));
    }

    #[test]
    fn zoom_bounds_raise_ceiling_for_tiny_sources() {
        let bounds = ZoomBounds::new(Some(16.0), 0.1, 3.0);
        assert_eq!(bounds.max, 16.0);
        assert_eq!(bounds.clamp(2.0), 16.0);

        let bounds = ZoomBounds::new(None, 0.1, 3.0);
        assert_eq!(bounds.clamp(0.01), 0.1);
        assert_eq!(bounds.clamp(9.0), 3.0);
        assert_eq!(bounds.clamp(f64::INFINITY), 0.1);
    }

    #[test]
    fn zoom_keys_map_and_step_without_drift() {
        assert_eq!(ZoomKey::from_char('+'), Some(ZoomKey::In));
        assert_eq!(ZoomKey::from_char('='), Some(ZoomKey::In));
        assert_eq!(ZoomKey::from_char('-'), Some(ZoomKey::Out));
        assert_eq!(ZoomKey::from_char('_'), Some(ZoomKey::Out));
        assert_eq!(ZoomKey::from_char('a'), None);

        assert_eq!(ZoomKey::In.step(0.8, 0.1), 0.9);
        assert_eq!(ZoomKey::Out.step(0.9, 0.1), 0.8);
    }

    #[test]
    fn transform_json_shape_is_stable() {
        let transform = Transform::new(1.5, Point::new(-12.0, 4.5));
        let json = serde_json::to_value(transform).expect("serialize transform");
        assert_eq!(json, serde_json::json!({ "scale": 1.5, "offset": { "x": -12.0, "y": 4.5 } }));

        let restored: Transform =
            serde_json::from_str(r#"{"scale":0.8,"offset":{"x":80,"y":0}}"#).expect("parse transform");
        assert_eq!(restored, Transform::new(0.8, Point::new(80.0, 0.0)));
    }
}
