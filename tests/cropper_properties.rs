use avatar_cropper::cropper::{
    clamp_offset, compute_min_scale, CropperConfig, CropperEngine, ImageSize, Point, SourceImage,
    Transform, Viewport, ViewportSize,
};
use image::{Rgba, RgbaImage};
use proptest::prelude::*;

const EPSILON: f64 = 1e-9;

fn solid(width: u32, height: u32) -> SourceImage {
    SourceImage::from_rgba(RgbaImage::from_pixel(width, height, Rgba([90, 120, 150, 255])))
}

fn covers(transform: &Transform, size: ImageSize, viewport: Viewport) -> bool {
    let diameter = viewport.diameter as f64;
    transform.scale * size.width as f64 + EPSILON >= diameter
        && transform.scale * size.height as f64 + EPSILON >= diameter
}

fn size_strategy() -> impl Strategy<Value = ImageSize> {
    (1u32..4000, 1u32..4000).prop_map(|(width, height)| ImageSize { width, height })
}

proptest! {
    #[test]
    fn min_scale_covers_the_viewport(size in size_strategy(), diameter in 1u32..1024) {
        let viewport = Viewport::new(diameter);
        let min_scale = compute_min_scale(size, viewport).expect("non-degenerate input");

        prop_assert!(covers(&Transform::new(min_scale, Point::ZERO), size, viewport));
    }

    #[test]
    fn clamped_offset_stays_within_symmetric_bounds(
        size in size_strategy(),
        diameter in 1u32..1024,
        scale in 0.01f64..20.0,
        x in -50_000.0f64..50_000.0,
        y in -50_000.0f64..50_000.0,
    ) {
        let viewport = Viewport::new(diameter);
        let transform = Transform::new(scale, Point::new(x, y));
        let clamped = clamp_offset(size, &transform, viewport);

        let max_x = ((scale * size.width as f64 - diameter as f64) / 2.0).max(0.0);
        let max_y = ((scale * size.height as f64 - diameter as f64) / 2.0).max(0.0);
        prop_assert!(clamped.x.abs() <= max_x + EPSILON);
        prop_assert!(clamped.y.abs() <= max_y + EPSILON);
    }

    #[test]
    fn clamp_is_idempotent(
        size in size_strategy(),
        diameter in 1u32..1024,
        scale in 0.01f64..20.0,
        x in -50_000.0f64..50_000.0,
        y in -50_000.0f64..50_000.0,
    ) {
        let viewport = Viewport::new(diameter);
        let once = clamp_offset(size, &Transform::new(scale, Point::new(x, y)), viewport);
        let twice = clamp_offset(size, &Transform::new(scale, once), viewport);

        prop_assert_eq!(once, twice);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn engine_auto_fit_covers_the_viewport(width in 1u32..400, height in 1u32..400) {
        let mut engine = CropperEngine::new(CropperConfig::default(), ()).expect("engine init");
        let ticket = engine.begin_source_request();
        prop_assert!(engine.on_source_ready(ticket, solid(width, height)));

        let size = ImageSize { width, height };
        prop_assert!(covers(&engine.transform(), size, engine.viewport()));
        prop_assert_eq!(engine.offset(), Point::ZERO);
    }

    #[test]
    fn cover_holds_after_swapping_to_another_source(
        first in (1u32..400, 1u32..400),
        second in (1u32..400, 1u32..400),
        zoom in 0.0f64..4.0,
        drag in (-600.0f64..600.0, -600.0f64..600.0),
    ) {
        let mut engine = CropperEngine::new(CropperConfig::default(), ()).expect("engine init");
        let ticket = engine.begin_source_request();
        engine.on_source_ready(ticket, solid(first.0, first.1));
        engine.set_scale(engine.scale() + zoom);
        engine.on_drag_start(Point::ZERO);
        engine.on_drag_move(Point::new(drag.0, drag.1));
        engine.on_drag_end();

        let ticket = engine.begin_source_request();
        prop_assert!(engine.on_source_ready(ticket, solid(second.0, second.1)));

        let size = ImageSize { width: second.0, height: second.1 };
        let transform = engine.transform();
        prop_assert!(covers(&transform, size, engine.viewport()));
        prop_assert_eq!(clamp_offset(size, &transform, engine.viewport()), transform.offset);
    }

    #[test]
    fn cover_holds_for_preset_transform(
        width in 1u32..400,
        height in 1u32..400,
        scale in 0.01f64..6.0,
        x in -2_000.0f64..2_000.0,
        y in -2_000.0f64..2_000.0,
    ) {
        let preset = Transform::new(scale, Point::new(x, y));
        let mut engine = CropperEngine::new(CropperConfig::default(), ())
            .expect("engine init")
            .with_transform(preset);
        let ticket = engine.begin_source_request();
        engine.on_source_ready(ticket, solid(width, height));

        let size = ImageSize { width, height };
        let transform = engine.transform();
        prop_assert!(covers(&transform, size, engine.viewport()));
        prop_assert_eq!(clamp_offset(size, &transform, engine.viewport()), transform.offset);

        let bounds = engine.zoom_bounds();
        if (bounds.min..=bounds.max).contains(&scale) {
            prop_assert_eq!(transform.scale, scale);
        }
    }

    #[test]
    fn viewport_change_never_drops_below_new_minimum(
        width in 1u32..400,
        height in 1u32..400,
        zoom in 0.0f64..4.0,
    ) {
        let mut engine = CropperEngine::new(CropperConfig::default(), ())
            .expect("engine init")
            .with_viewport_size(ViewportSize::Compact);
        let ticket = engine.begin_source_request();
        engine.on_source_ready(ticket, solid(width, height));
        engine.set_scale(engine.scale() + zoom);
        let before = engine.scale();

        engine.on_viewport_change(ViewportSize::Default);
        let min_scale = engine.min_scale().expect("source is ready");

        prop_assert!(engine.scale() + EPSILON >= min_scale);
        if before >= min_scale {
            prop_assert_eq!(engine.scale(), before);
        }
        let source_size = ImageSize { width, height };
        prop_assert!(covers(&engine.transform(), source_size, engine.viewport()));
    }
}
