//! # 圆形头像裁剪模块
//!
//! ## 设计思路
//!
//! 宿主负责界面与事件采集，本模块只负责“变换状态 + 约束 + 光栅化”：
//!
//! - 源图加载：URL / Base64 / 本地文件 / 内存字节，统一走资源上限校验
//! - 几何约束：cover fit 最小缩放与对称偏移收敛
//! - 交互状态机：拖拽、缩放、视口切换、保存锁定
//! - 输出：实时预览与节流后的编码结果
//!
//! ## 子模块
//!
//! | 模块 | 职责 |
//! |------|------|
//! | `geometry` | 纯函数几何：`compute_min_scale`、`clamp_offset`、缩放区间 |
//! | `config` | 裁剪参数、视口档位、性能档位 |
//! | `error` | `CropError` 统一错误类型 |
//! | `source` | 输入源与解码后的 `SourceImage` |
//! | `loader` | 从各来源读取原始字节 |
//! | `pipeline` | 票据化异步解码 |
//! | `raster` | 圆形合成、描边、编码 |
//! | `host` | 宿主回调契约 |
//! | `engine` | `CropperEngine` 状态机 |

mod config;
mod engine;
mod error;
mod geometry;
mod host;
mod loader;
mod pipeline;
mod raster;
mod source;

#[cfg(test)]
mod fixtures;

pub use config::{CropProfile, CropperConfig, LoaderConfig, OutputFormat, ViewportPolicy};
pub use engine::CropperEngine;
pub use error::CropError;
pub use geometry::{
    clamp_offset, compute_min_scale, max_offset, ImageSize, Point, Transform, Viewport, ViewportSize,
    ZoomBounds, ZoomKey,
};
pub use host::{CroppedOutput, CropperHost};
pub use loader::SourceLoader;
pub use pipeline::{load_source, LoadedSource, PendingSource, SourceTicket};
pub use raster::{composite_circle, encode, source_region, stroke_circle_border, SourceRegion};
pub use source::{ImageSource, SourceImage};
