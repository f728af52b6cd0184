//! # 宿主回调契约
//!
//! 引擎只通过 `CropperHost` 向外通知，所有方法默认空实现，宿主按需覆盖。

use bytes::Bytes;

use super::geometry::{Point, Transform};

/// 编码后的圆形裁剪结果，正方形边长等于视口直径。
#[derive(Debug, Clone, PartialEq)]
pub struct CroppedOutput {
    pub bytes: Bytes,
    pub mime_type: &'static str,
    pub diameter: u32,
    /// 生成该结果时的变换快照。
    pub transform: Transform,
}

/// 引擎 → 宿主的通知。
pub trait CropperHost {
    /// 缩放变化（例如同步滑块位置）。
    fn on_scale_change(&mut self, _scale: f64) {}

    /// 当前可缩小到的下限变化。
    fn on_min_scale_change(&mut self, _min_scale: f64) {}

    fn on_position_change(&mut self, _offset: Point) {}

    /// 节流后的裁剪结果，由宿主自行持久化（上传等）。
    fn on_crop_complete(&mut self, _output: CroppedOutput) {}
}

/// 不关心任何通知的宿主。
impl CropperHost for () {}
