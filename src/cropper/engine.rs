//! # 裁剪引擎
//!
//! ## 设计思路
//!
//! `CropperEngine` 是一个同步状态机，独占一份 `Transform`、`SourceImage`、`Viewport`，
//! 宿主以显式方法调用驱动它（拖拽、缩放、视口切换、源图就绪），没有任何全局状态，
//! 多个实例之间完全独立。
//!
//! 每次变换变化后立即做“收敛 + 通知”，裁剪结果则交给尾沿节流器：
//! 突发期间的中间状态可以被丢弃，但最终静止状态一定会被光栅化一次。
//!
//! ## 实现思路
//!
//! - 首次加载用显式 `initialized` 标志判断，而不是 `scale == 1` 哨兵值。
//! - 源图请求带递增票据，过期票据的解码结果直接丢弃。
//! - 节流器不持有定时器：宿主读取 `next_crop_deadline()` 自行定时，到期调用 `poll_crop()`。
//!
//! ```text
//! request_source ──► PendingSource::load (async) ──► finish_load / on_source_ready
//!                                                        │
//! drag / zoom / viewport ──► clamp ──► host 通知 ──► TrailingThrottle ──► rasterize ──► on_crop_complete
//! ```

use std::time::Instant;

use bytes::Bytes;
use image::RgbaImage;

use super::config::{CropProfile, CropperConfig};
use super::geometry::{
    clamp_offset, compute_min_scale, Point, Transform, Viewport, ViewportSize, ZoomBounds, ZoomKey,
};
use super::host::{CroppedOutput, CropperHost};
use super::pipeline::{LoadedSource, PendingSource, SourceTicket};
use super::raster::{composite_circle, encode, stroke_circle_border};
use super::{CropError, ImageSource, SourceImage};
use crate::throttle::{Clock, SystemClock, TrailingThrottle};

/// 圆形头像裁剪引擎。
pub struct CropperEngine<H: CropperHost, C: Clock = SystemClock> {
    config: CropperConfig,
    host: H,
    clock: C,
    viewport_size: ViewportSize,
    viewport: Viewport,
    transform: Transform,
    initialized: bool,
    source: Option<SourceImage>,
    generation: u64,
    min_scale: Option<f64>,
    drag_anchor: Option<Point>,
    saving: bool,
    throttle: TrailingThrottle<Transform>,
}

impl<H: CropperHost> CropperEngine<H, SystemClock> {
    /// # 示例
    /// ```rust
    /// use avatar_cropper::cropper::{CropperConfig, CropperEngine};
    ///
    /// let engine = CropperEngine::new(CropperConfig::default(), ())?;
    /// assert!(!engine.is_ready());
    /// # Ok::<(), avatar_cropper::cropper::CropError>(())
    /// ```
    pub fn new(config: CropperConfig, host: H) -> Result<Self, CropError> {
        Self::with_clock(config, host, SystemClock)
    }
}

impl<H: CropperHost, C: Clock> CropperEngine<H, C> {
    /// 注入时钟构造，测试中用手动时钟驱动节流。
    pub fn with_clock(config: CropperConfig, host: H, clock: C) -> Result<Self, CropError> {
        config.validate()?;

        let viewport_size = ViewportSize::Default;
        let viewport = config.viewport.viewport(viewport_size);
        let throttle = TrailingThrottle::new(config.throttle_interval);

        Ok(Self {
            config,
            host,
            clock,
            viewport_size,
            viewport,
            transform: Transform::default(),
            initialized: false,
            source: None,
            generation: 0,
            min_scale: None,
            drag_anchor: None,
            saving: false,
            throttle,
        })
    }

    /// 沿用宿主已有的变换（例如重新调整已裁剪过的头像）。
    ///
    /// 源图就绪时不再自动适配，只把不满足覆盖约束的部分收敛回合法区间。
    pub fn with_transform(mut self, transform: Transform) -> Self {
        if transform.scale.is_finite() && transform.scale > 0.0 {
            self.transform = transform;
            self.initialized = true;
        } else {
            log::warn!("⚠️ 忽略非法初始变换：scale={}", transform.scale);
        }
        self
    }

    /// 指定初始视口档位（默认 `Default`）。
    pub fn with_viewport_size(mut self, size: ViewportSize) -> Self {
        self.viewport_size = size;
        self.viewport = self.config.viewport.viewport(size);
        self
    }

    pub fn config(&self) -> &CropperConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn scale(&self) -> f64 {
        self.transform.scale
    }

    pub fn offset(&self) -> Point {
        self.transform.offset
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn viewport_size(&self) -> ViewportSize {
        self.viewport_size
    }

    /// 当前 cover fit 最小缩放，源图未就绪时为 `None`。
    pub fn min_scale(&self) -> Option<f64> {
        self.min_scale
    }

    pub fn zoom_bounds(&self) -> ZoomBounds {
        ZoomBounds::new(self.min_scale, self.config.min_zoom_floor, self.config.max_zoom)
    }

    pub fn source(&self) -> Option<&SourceImage> {
        self.source.as_ref()
    }

    pub fn is_ready(&self) -> bool {
        self.source.is_some()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn is_saving(&self) -> bool {
        self.saving
    }

    pub fn is_dragging(&self) -> bool {
        self.drag_anchor.is_some()
    }

    // ------------------------------------------------------------------------
    // 配置
    // ------------------------------------------------------------------------

    /// 运行时替换配置，视口直径变化时会重新校验变换。
    pub fn update_config(&mut self, config: CropperConfig) -> Result<(), CropError> {
        config.validate()?;
        self.throttle.set_interval(config.throttle_interval);
        self.config = config;

        let viewport = self.config.viewport.viewport(self.viewport_size);
        if viewport != self.viewport {
            self.switch_viewport(viewport);
        } else if self.enforce_cover() {
            self.schedule_crop();
        }
        Ok(())
    }

    pub fn set_profile(&mut self, profile: CropProfile) -> Result<(), CropError> {
        let mut config = self.config.clone();
        config.apply_profile(profile);
        self.update_config(config)
    }

    // ------------------------------------------------------------------------
    // 源图生命周期
    // ------------------------------------------------------------------------

    /// 作废当前源图并签发新票据，之前所有在途解码结果都会被丢弃。
    pub fn begin_source_request(&mut self) -> SourceTicket {
        self.generation += 1;
        self.source = None;
        self.min_scale = None;
        self.drag_anchor = None;
        self.throttle.cancel();
        SourceTicket::new(self.generation)
    }

    /// 登记一个新源图请求，返回可异步加载的句柄。
    pub fn request_source(&mut self, source: ImageSource) -> PendingSource {
        let ticket = self.begin_source_request();
        log::debug!("🖼️ 登记源图请求 #{}（{}）", ticket.generation(), source.kind());
        PendingSource::new(ticket, source)
    }

    pub fn is_current(&self, ticket: SourceTicket) -> bool {
        ticket.generation() == self.generation
    }

    /// 处理一次加载结果；返回是否被采纳。
    pub fn finish_load(&mut self, loaded: LoadedSource) -> bool {
        match loaded.result {
            Ok(image) => self.on_source_ready(loaded.ticket, image),
            Err(err) => {
                self.on_source_failed(loaded.ticket, &err);
                false
            }
        }
    }

    /// 源图解码完成。
    ///
    /// 未初始化时自动适配为 `min(min_scale, max_zoom)` 并居中；
    /// 已初始化时保留宿主原有变换，只收敛不再覆盖新源图的缩放或偏移。
    pub fn on_source_ready(&mut self, ticket: SourceTicket, image: SourceImage) -> bool {
        if !self.is_current(ticket) {
            log::debug!(
                "⏭️ 丢弃过期解码结果 #{}（当前 #{}）",
                ticket.generation(),
                self.generation
            );
            return false;
        }

        if image.size().is_empty() {
            log::warn!("⚠️ 源图尺寸为 0，保持未就绪");
            return false;
        }

        self.source = Some(image);
        self.refresh_min_scale();

        if self.initialized {
            self.enforce_cover();
        } else {
            if let Some(min_scale) = self.min_scale {
                let scale = self.zoom_bounds().clamp(min_scale.min(self.config.max_zoom));
                self.apply_transform(Transform::new(scale, Point::ZERO));
            }
            self.initialized = true;
        }

        log::info!(
            "✅ 源图就绪 #{} - 视口: {}px 缩放: {:.3} 最小缩放: {:?}",
            self.generation,
            self.viewport.diameter,
            self.transform.scale,
            self.min_scale
        );

        self.schedule_crop();
        true
    }

    /// 解码失败：引擎保持未就绪，由宿主决定错误展示策略。
    pub fn on_source_failed(&mut self, ticket: SourceTicket, err: &CropError) {
        if !self.is_current(ticket) {
            return;
        }
        log::warn!("⚠️ 源图加载失败 #{}（{}）：{}", ticket.generation(), err.code(), err);
    }

    // ------------------------------------------------------------------------
    // 视口
    // ------------------------------------------------------------------------

    /// 根据布局宽度信号切换视口档位，只有跨过断点才会生效。
    pub fn on_layout_width(&mut self, layout_width: u32) {
        let size = self.config.viewport.size_for_width(layout_width);
        if size != self.viewport_size {
            self.on_viewport_change(size);
        }
    }

    pub fn on_viewport_change(&mut self, size: ViewportSize) {
        self.viewport_size = size;
        let viewport = self.config.viewport.viewport(size);
        if viewport != self.viewport {
            self.switch_viewport(viewport);
        }
    }

    fn switch_viewport(&mut self, viewport: Viewport) {
        log::info!(
            "📐 视口切换：{}px -> {}px",
            self.viewport.diameter,
            viewport.diameter
        );
        self.viewport = viewport;
        self.refresh_min_scale();
        self.enforce_cover();
        self.schedule_crop();
    }

    // ------------------------------------------------------------------------
    // 交互
    // ------------------------------------------------------------------------

    /// 保存期间锁定拖拽与缩放；预览渲染不受影响。
    pub fn set_saving(&mut self, saving: bool) {
        self.saving = saving;
        if saving {
            self.drag_anchor = None;
        }
    }

    pub fn on_drag_start(&mut self, pointer: Point) {
        if self.saving || !self.is_ready() {
            return;
        }
        self.drag_anchor = Some(pointer - self.transform.offset);
    }

    pub fn on_drag_move(&mut self, pointer: Point) {
        if self.saving {
            return;
        }
        let Some(anchor) = self.drag_anchor else {
            return;
        };

        let proposed = Transform::new(self.transform.scale, pointer - anchor);
        let next = Transform::new(proposed.scale, self.clamped_offset(&proposed));
        if self.apply_transform(next) {
            self.schedule_crop();
        }
    }

    pub fn on_drag_end(&mut self) {
        self.drag_anchor = None;
    }

    /// 设置缩放：先收敛到缩放区间，再按新缩放重新收敛偏移。
    pub fn set_scale(&mut self, scale: f64) {
        if self.saving {
            return;
        }

        let scale = self.zoom_bounds().clamp(scale);
        let proposed = Transform::new(scale, self.transform.offset);
        let next = Transform::new(scale, self.clamped_offset(&proposed));
        if self.apply_transform(next) {
            self.schedule_crop();
        }
    }

    pub fn zoom(&mut self, key: ZoomKey) {
        let scale = key.step(self.transform.scale, self.config.zoom_step);
        self.set_scale(scale);
    }

    /// 键盘缩放；返回按键是否被处理。
    pub fn on_key(&mut self, key: char) -> bool {
        match ZoomKey::from_char(key) {
            Some(zoom) => {
                self.zoom(zoom);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------------
    // 渲染与光栅化
    // ------------------------------------------------------------------------

    /// 实时预览：圆形裁剪 + 浅色描边。源图未就绪时为 `None`。
    pub fn render(&self) -> Option<RgbaImage> {
        let source = self.source.as_ref()?;
        let mut image =
            composite_circle(source, &self.transform, self.viewport, self.config.resize_filter)?;
        stroke_circle_border(&mut image, self.config.border_color, self.config.border_width);
        Some(image)
    }

    /// 按当前状态立即生成裁剪结果（不经过节流）。
    pub fn rasterize(&self) -> Result<Option<CroppedOutput>, CropError> {
        self.rasterize_transform(&self.transform)
    }

    fn rasterize_transform(&self, transform: &Transform) -> Result<Option<CroppedOutput>, CropError> {
        let Some(source) = self.source.as_ref() else {
            return Ok(None);
        };
        let Some(image) = composite_circle(source, transform, self.viewport, self.config.resize_filter)
        else {
            return Ok(None);
        };

        let bytes = encode(&image, self.config.output, self.config.matte)?;
        Ok(Some(CroppedOutput {
            bytes: Bytes::from(bytes),
            mime_type: self.config.output.mime_type(),
            diameter: self.viewport.diameter,
            transform: *transform,
        }))
    }

    /// 下一次尾沿补发的时间点，宿主据此设置定时器。
    pub fn next_crop_deadline(&self) -> Option<Instant> {
        self.throttle.next_deadline()
    }

    /// 尾沿到期时发射待处理的裁剪结果；返回是否发射。
    pub fn poll_crop(&mut self) -> bool {
        let now = self.clock.now();
        match self.throttle.poll(now) {
            Some(transform) => {
                self.emit_crop(transform);
                true
            }
            None => false,
        }
    }

    /// 忽略节流间隔立即发射待处理结果（例如宿主准备保存）。
    pub fn flush_crop(&mut self) -> bool {
        let now = self.clock.now();
        match self.throttle.flush(now) {
            Some(transform) => {
                self.emit_crop(transform);
                true
            }
            None => false,
        }
    }

    fn schedule_crop(&mut self) {
        if !self.is_ready() {
            return;
        }
        let now = self.clock.now();
        if let Some(transform) = self.throttle.submit(now, self.transform) {
            self.emit_crop(transform);
        }
    }

    fn emit_crop(&mut self, transform: Transform) {
        match self.rasterize_transform(&transform) {
            Ok(Some(output)) => {
                log::trace!(
                    "🖼️ 裁剪结果 - {} {}B scale={:.3}",
                    output.mime_type,
                    output.bytes.len(),
                    transform.scale
                );
                self.host.on_crop_complete(output);
            }
            Ok(None) => {}
            Err(err) => log::error!("❌ 裁剪结果生成失败：{}", err),
        }
    }

    // ------------------------------------------------------------------------
    // 内部
    // ------------------------------------------------------------------------

    fn clamped_offset(&self, transform: &Transform) -> Point {
        match &self.source {
            Some(source) => clamp_offset(source.size(), transform, self.viewport),
            None => transform.offset,
        }
    }

    /// 把当前变换收敛进缩放区间与偏移区间，已合法的分量保持不变。
    ///
    /// 源图未就绪时不做任何事；返回是否有变化。
    fn enforce_cover(&mut self) -> bool {
        if self.min_scale.is_none() {
            return false;
        }

        let mut next = self.transform;
        next.scale = self.zoom_bounds().clamp(next.scale);
        next.offset = self.clamped_offset(&next);
        self.apply_transform(next)
    }

    fn refresh_min_scale(&mut self) {
        let min_scale = self
            .source
            .as_ref()
            .and_then(|source| compute_min_scale(source.size(), self.viewport));

        if min_scale != self.min_scale {
            self.min_scale = min_scale;
            if let Some(min_scale) = min_scale {
                self.host.on_min_scale_change(min_scale);
            }
        }
    }

    /// 写入新变换并按字段通知宿主；返回是否有变化。
    fn apply_transform(&mut self, next: Transform) -> bool {
        let previous = self.transform;
        self.transform = next;

        if next.scale != previous.scale {
            self.host.on_scale_change(next.scale);
        }
        if next.offset != previous.offset {
            self.host.on_position_change(next.offset);
        }

        next != previous
    }
}
