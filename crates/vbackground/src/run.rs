use std::fs;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use pipeline::{
    BackgroundOption, PipelineOptions, SegmentationOrchestrator, Segmenter, SegmenterFactory,
};
use renderer::{GpuContext, VideoFrame};

use crate::chroma::ChromaKeySegmenter;
use crate::cli::Args;

const FRAME_INTERVAL: Duration = Duration::from_millis(33);
const BACKDROP: [u8; 4] = [0, 200, 0, 255];
const SUBJECT: [u8; 4] = [180, 150, 140, 255];

pub fn run(args: Args) -> Result<()> {
    let options = build_options(&args)?;
    let context = GpuContext::new().context("GPU initialisation failed")?;
    let factory: SegmenterFactory =
        Box::new(|| Ok(Box::new(ChromaKeySegmenter::default()) as Box<dyn Segmenter>));
    let mut orchestrator = SegmentationOrchestrator::new(context, factory, options)?;

    tracing::info!(
        width = args.width,
        height = args.height,
        frames = args.frames,
        "processing synthetic green-screen frames"
    );
    let mut last = None;
    for index in 0..args.frames {
        let frame = synthetic_frame(args.width, args.height, index);
        if let Some(output) = orchestrator.process_frame(&frame)? {
            last = Some(output);
        }
    }
    orchestrator.close();

    let Some(output) = last else {
        bail!("no frames were composited");
    };
    image::save_buffer(
        &args.output,
        &output.data,
        output.width,
        output.height,
        image::ColorType::Rgba8,
    )
    .with_context(|| format!("failed to write {}", args.output.display()))?;
    tracing::info!(path = %args.output.display(), "wrote composited frame");
    Ok(())
}

/// Options file first, then individual flags on top.
fn build_options(args: &Args) -> Result<PipelineOptions> {
    let mut options = match &args.options {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("failed to parse {}", path.display()))?
        }
        None => PipelineOptions::default(),
    };
    if let Some(path) = &args.background_image {
        options.background = BackgroundOption::Image { path: path.clone() };
    }
    if let Some(path) = &args.background_video {
        options.background = BackgroundOption::Video { path: path.clone() };
    }
    if let Some([r, g, b]) = args.background_color {
        options.background = BackgroundOption::Color { r, g, b, a: 255 };
    }
    if let Some(blur) = args.blur {
        options.blur = blur;
    }
    if let Some(smoothing) = args.smoothing {
        options.smoothing = smoothing;
    }
    if let Some(border_smooth) = args.border_smooth {
        options.border_smooth = border_smooth;
    }
    if let Some(restart_every) = args.restart_every {
        options.restart_every = restart_every;
    }
    Ok(options.sanitized())
}

/// Green backdrop with a subject block drifting left to right, enough motion
/// for the temporal smoothing to have something to chew on.
fn synthetic_frame(width: u32, height: u32, index: u32) -> VideoFrame {
    let mut data = BACKDROP.repeat((width * height) as usize);
    let block_width = width / 4;
    let block_height = height / 2;
    let travel = width.saturating_sub(block_width).max(1);
    let x0 = (index * 3) % travel;
    let y0 = height / 4;
    for y in y0..(y0 + block_height).min(height) {
        for x in x0..(x0 + block_width).min(width) {
            let offset = ((y * width + x) * 4) as usize;
            data[offset..offset + 4].copy_from_slice(&SUBJECT);
        }
    }
    VideoFrame::new(width, height, FRAME_INTERVAL * index, data)
}
