//! # 圆形头像裁剪引擎 — 库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                 宿主 (UI / CLI / 服务)                     │
//! │                                                          │
//! │  布局宽度 ── 指针拖拽 ── 键盘 / 滑块 ── 保存状态            │
//! │       │          │            │            │             │
//! └───────┼──────────┼────────────┼────────────┼─────────────┘
//!         ↓          ↓            ↓            ↓
//! ┌──────────────────────────────────────────────────────────┐
//! │  cropper::CropperEngine                                  │
//! │   ├─ geometry   cover fit + 偏移收敛                       │
//! │   ├─ pipeline   票据化异步解码 (loader → decode)            │
//! │   ├─ raster     圆形合成 · 描边 · JPEG/PNG/WebP 编码        │
//! │   └─ throttle   尾沿节流 → CropperHost::on_crop_complete   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`cropper`] | 裁剪状态机、几何约束、源图加载、光栅化输出 |
//! | [`throttle`] | 与业务无关的尾沿节流原语与可注入时钟 |

pub mod cropper;
pub mod throttle;
