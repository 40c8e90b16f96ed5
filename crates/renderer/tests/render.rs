use std::time::Duration;

use renderer::{
    BackgroundDescriptor, BlendSettings, CompositingRenderer, FilterPipeline, FilterSettings,
    GpuContext, RenderError, SegmentationMasks, VideoFrame, DEFAULT_BACKGROUND_COLOR,
};

// Headless CI machines may have no usable adapter; these tests skip instead
// of failing there.
fn gpu() -> Option<GpuContext> {
    match GpuContext::new() {
        Ok(context) => Some(context),
        Err(err) => {
            eprintln!("no GPU adapter available, skipping: {err:#}");
            None
        }
    }
}

fn solid_frame(width: u32, height: u32, color: [u8; 4]) -> VideoFrame {
    let data = color.repeat((width * height) as usize);
    VideoFrame::new(width, height, Duration::ZERO, data)
}

fn solid_masks(width: u32, height: u32, category: u8, confidence: u8) -> SegmentationMasks {
    let len = (width * height) as usize;
    SegmentationMasks {
        width,
        height,
        category: vec![category; len],
        confidence: vec![confidence; len],
    }
}

fn pixel(frame: &VideoFrame, x: u32, y: u32) -> [u8; 4] {
    let offset = ((y * frame.width + x) * 4) as usize;
    [
        frame.data[offset],
        frame.data[offset + 1],
        frame.data[offset + 2],
        frame.data[offset + 3],
    ]
}

fn close_to(actual: [u8; 4], expected: [u8; 4], tolerance: u8) -> bool {
    actual
        .iter()
        .zip(expected.iter())
        .all(|(a, e)| a.abs_diff(*e) <= tolerance)
}

#[test]
fn confident_person_mask_converges_to_the_camera_frame() {
    let Some(context) = gpu() else { return };
    let mut compositor = CompositingRenderer::new(&context);
    let frame = solid_frame(8, 8, [255, 0, 0, 255]);
    // Category person everywhere, background confidence zero: after
    // inversion the gate is fully open and the state EMA runs at full rate.
    let masks = solid_masks(8, 8, 1, 0);
    let settings = BlendSettings::default();

    let mut output = None;
    for _ in 0..24 {
        output = Some(
            compositor
                .render(
                    &context,
                    &frame,
                    Some(&masks),
                    &BackgroundDescriptor::None,
                    &settings,
                )
                .unwrap(),
        );
    }
    let output = output.unwrap();
    assert!(
        close_to(pixel(&output, 4, 4), [255, 0, 0, 255], 3),
        "expected the camera frame to dominate, got {:?}",
        pixel(&output, 4, 4)
    );
}

#[test]
fn low_confidence_mask_leaves_the_background_in_place() {
    let Some(context) = gpu() else { return };
    let mut compositor = CompositingRenderer::new(&context);
    let frame = solid_frame(8, 8, [255, 0, 0, 255]);
    // Person category but high background confidence: inverted confidence
    // sits below the smoothstep floor, so the state never leaves zero.
    let masks = solid_masks(8, 8, 1, 200);
    let settings = BlendSettings::default();

    let mut output = None;
    for _ in 0..8 {
        output = Some(
            compositor
                .render(
                    &context,
                    &frame,
                    Some(&masks),
                    &BackgroundDescriptor::None,
                    &settings,
                )
                .unwrap(),
        );
    }
    let expected = DEFAULT_BACKGROUND_COLOR;
    assert!(
        close_to(pixel(&output.unwrap(), 4, 4), expected, 2),
        "expected the default background colour"
    );
}

#[test]
fn missing_masks_reuse_the_last_good_state() {
    let Some(context) = gpu() else { return };
    let mut compositor = CompositingRenderer::new(&context);
    let frame = solid_frame(8, 8, [0, 255, 0, 255]);
    let masks = solid_masks(8, 8, 1, 0);
    let settings = BlendSettings::default();

    for _ in 0..24 {
        compositor
            .render(
                &context,
                &frame,
                Some(&masks),
                &BackgroundDescriptor::None,
                &settings,
            )
            .unwrap();
    }
    // Segmentation dropped out: the blend must keep showing the person.
    let output = compositor
        .render(&context, &frame, None, &BackgroundDescriptor::None, &settings)
        .unwrap();
    assert!(close_to(pixel(&output, 4, 4), [0, 255, 0, 255], 3));
}

#[test]
fn background_colour_switch_takes_effect_in_one_frame() {
    let Some(context) = gpu() else { return };
    let mut compositor = CompositingRenderer::new(&context);
    let frame = solid_frame(8, 8, [255, 255, 255, 255]);
    let settings = BlendSettings::default();

    let first = compositor
        .render(
            &context,
            &frame,
            None,
            &BackgroundDescriptor::Color([255, 0, 0, 255]),
            &settings,
        )
        .unwrap();
    assert!(close_to(pixel(&first, 4, 4), [255, 0, 0, 255], 2));

    let second = compositor
        .render(
            &context,
            &frame,
            None,
            &BackgroundDescriptor::Color([0, 0, 255, 255]),
            &settings,
        )
        .unwrap();
    assert!(close_to(pixel(&second, 4, 4), [0, 0, 255, 255], 2));
}

#[test]
fn image_background_is_loaded_from_disk() {
    let Some(context) = gpu() else { return };
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bg.png");
    image::save_buffer(&path, &[10, 200, 30, 255], 1, 1, image::ColorType::Rgba8).unwrap();

    let mut compositor = CompositingRenderer::new(&context);
    let frame = solid_frame(8, 8, [255, 255, 255, 255]);
    let output = compositor
        .render(
            &context,
            &frame,
            None,
            &BackgroundDescriptor::Image(path),
            &BlendSettings::default(),
        )
        .unwrap();
    assert!(close_to(pixel(&output, 4, 4), [10, 200, 30, 255], 2));
}

#[test]
fn unreadable_background_falls_back_to_the_default_colour() {
    let Some(context) = gpu() else { return };
    let mut compositor = CompositingRenderer::new(&context);
    let frame = solid_frame(8, 8, [255, 255, 255, 255]);
    let output = compositor
        .render(
            &context,
            &frame,
            None,
            &BackgroundDescriptor::Image("/nonexistent/background.png".into()),
            &BlendSettings::default(),
        )
        .unwrap();
    assert!(close_to(pixel(&output, 4, 4), DEFAULT_BACKGROUND_COLOR, 2));
}

#[test]
fn border_smoothing_averages_the_composited_colour_across_the_band() {
    let Some(context) = gpu() else { return };
    // Two-tone frame: red left half, blue right half.
    let width = 16u32;
    let height = 16u32;
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for _ in 0..height {
        for x in 0..width {
            if x < width / 2 {
                data.extend_from_slice(&[255, 0, 0, 255]);
            } else {
                data.extend_from_slice(&[0, 0, 255, 255]);
            }
        }
    }
    let frame = VideoFrame::new(width, height, Duration::ZERO, data);
    // Background confidence 45/255 inverts to ~0.82, landing the gate mid
    // band: one update leaves the state near 0.39, inside the (0.1, 0.5)
    // smoothing window everywhere.
    let masks = solid_masks(width, height, 1, 45);

    let render_with = |border_smooth: f32| {
        let mut compositor = CompositingRenderer::new(&context);
        compositor
            .render(
                &context,
                &frame,
                Some(&masks),
                &BackgroundDescriptor::None,
                &BlendSettings {
                    border_smooth,
                    ..BlendSettings::default()
                },
            )
            .unwrap()
    };
    let crisp = render_with(0.0);
    let smoothed = render_with(4.0);

    // Sample a red-side pixel 2 texels from the colour edge: the 4-pixel
    // offsets reach into the blue half, so the averaged blend must pull
    // blue in and red out, not merely soften the mask value.
    let before = pixel(&crisp, 6, 8);
    let after = pixel(&smoothed, 6, 8);
    assert!(
        after[2] > before[2].saturating_add(10),
        "blue should bleed across the edge: {before:?} -> {after:?}"
    );
    assert!(
        after[0].saturating_add(10) < before[0],
        "red should recede at the edge: {before:?} -> {after:?}"
    );
}

#[test]
fn mismatched_mask_dimensions_are_rejected() {
    let Some(context) = gpu() else { return };
    let mut compositor = CompositingRenderer::new(&context);
    let frame = solid_frame(8, 8, [0, 0, 0, 255]);
    let masks = solid_masks(4, 4, 1, 0);
    let err = compositor
        .render(
            &context,
            &frame,
            Some(&masks),
            &BackgroundDescriptor::None,
            &BlendSettings::default(),
        )
        .unwrap_err();
    assert!(matches!(err, RenderError::MaskDimensions { .. }));
}

#[test]
fn zero_dimension_frame_is_rejected() {
    let Some(context) = gpu() else { return };
    let mut compositor = CompositingRenderer::new(&context);
    let frame = VideoFrame::new(0, 8, Duration::ZERO, Vec::new());
    let err = compositor
        .render(
            &context,
            &frame,
            None,
            &BackgroundDescriptor::None,
            &BlendSettings::default(),
        )
        .unwrap_err();
    assert!(matches!(err, RenderError::EmptyFrame));
}

#[test]
fn identity_filter_settings_bypass_the_gpu_passes() {
    let Some(context) = gpu() else { return };
    let mut filter = FilterPipeline::new(&context);
    let frame = solid_frame(8, 8, [120, 60, 30, 255]);
    let result = filter
        .apply(&context, &frame, &FilterSettings::default())
        .unwrap();
    assert!(result.is_none());
}

#[test]
fn blur_preserves_a_constant_image() {
    let Some(context) = gpu() else { return };
    let mut filter = FilterPipeline::new(&context);
    let frame = solid_frame(16, 16, [100, 100, 100, 255]);
    let settings = FilterSettings {
        blur: 3.0,
        ..FilterSettings::default()
    };
    let output = filter.apply(&context, &frame, &settings).unwrap().unwrap();
    // Normalised kernel: a flat image must survive both blur axes.
    assert!(close_to(pixel(&output, 8, 8), [100, 100, 100, 255], 2));
}

#[test]
fn contrast_and_brightness_follow_the_adjustment_formula() {
    let Some(context) = gpu() else { return };
    let mut filter = FilterPipeline::new(&context);
    let frame = solid_frame(8, 8, [128, 128, 128, 255]);
    let settings = FilterSettings {
        brightness: 0.25,
        contrast: 1.0,
        gamma: 1.0,
        blur: 0.0,
    };
    let output = filter.apply(&context, &frame, &settings).unwrap().unwrap();
    // 128/255 + 0.25 -> ~0.752 -> ~192
    assert!(close_to(pixel(&output, 4, 4), [192, 192, 192, 255], 3));
}
