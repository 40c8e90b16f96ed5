//! Frame-by-frame orchestration of the virtual background pipeline.
//!
//! One frame flows: optional GPU filter pass over the segmenter's input,
//! synchronous segmentation (the single in-flight request), temporal state
//! update and blend on the GPU, then stats accounting. The loop is
//! single-threaded; option updates arrive asynchronously as full snapshots
//! over a channel and are folded in at frame boundaries.

mod options;
mod segmenter;
mod stats;

use std::time::Instant;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};

use renderer::{CompositingRenderer, FilterPipeline, GpuContext, VideoFrame};

pub use options::{BackgroundOption, PipelineOptions};
pub use segmenter::{Segmenter, SegmenterFactory, SegmenterHost};
pub use stats::{FrameStats, StatsReport};

/// Cloneable handle for pushing option snapshots into a running pipeline
/// from another thread. Sending never blocks; the pipeline applies the most
/// recent snapshot at its next frame.
#[derive(Clone)]
pub struct OptionsHandle {
    sender: Sender<PipelineOptions>,
}

impl OptionsHandle {
    /// Queues `options` for the next frame. Values are sanitized here, on
    /// the caller's thread, so the render loop never sees raw input.
    pub fn update(&self, options: PipelineOptions) {
        let _ = self.sender.send(options.sanitized());
    }
}

pub struct SegmentationOrchestrator {
    context: GpuContext,
    filter: FilterPipeline,
    compositor: CompositingRenderer,
    host: SegmenterHost,
    options: PipelineOptions,
    updates: Receiver<PipelineOptions>,
    updates_sender: Sender<PipelineOptions>,
    stats: FrameStats,
    closed: bool,
}

impl SegmentationOrchestrator {
    pub fn new(
        context: GpuContext,
        factory: SegmenterFactory,
        options: PipelineOptions,
    ) -> Result<Self> {
        let host = SegmenterHost::new(factory).context("failed to start segmentation")?;
        let filter = FilterPipeline::new(&context);
        let compositor = CompositingRenderer::new(&context);
        let (updates_sender, updates) = crossbeam_channel::unbounded();
        tracing::info!(adapter = %context.adapter_name(), "pipeline ready");
        Ok(Self {
            context,
            filter,
            compositor,
            host,
            options: options.sanitized(),
            updates,
            updates_sender,
            stats: FrameStats::new(Instant::now()),
            closed: false,
        })
    }

    pub fn options_handle(&self) -> OptionsHandle {
        OptionsHandle {
            sender: self.updates_sender.clone(),
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Processes one camera frame.
    ///
    /// Returns `Ok(None)` when the frame was dropped: the pipeline is
    /// closed, the frame is unusable, or the segmenter produced no masks.
    /// Temporal smoothing state is untouched on every drop path.
    pub fn process_frame(&mut self, frame: &VideoFrame) -> Result<Option<VideoFrame>> {
        if self.closed {
            return Ok(None);
        }
        let started = Instant::now();
        if frame.is_empty() {
            tracing::warn!("dropping zero-dimension frame");
            emit_stats(self.stats.record_dropped(Instant::now()));
            return Ok(None);
        }
        while let Ok(snapshot) = self.updates.try_recv() {
            self.options = snapshot;
        }

        let filtered = self
            .filter
            .apply(&self.context, frame, &self.options.filter_settings())
            .context("segmentation input filter failed")?;
        let segmenter_input = filtered.as_ref().unwrap_or(frame);

        let masks = self
            .host
            .segment(segmenter_input, self.options.restart_every)
            .context("segmentation failed")?;
        let Some(masks) = masks else {
            tracing::warn!(timestamp = ?frame.timestamp, "segmenter returned no masks, dropping frame");
            emit_stats(self.stats.record_dropped(Instant::now()));
            return Ok(None);
        };

        let output = self
            .compositor
            .render(
                &self.context,
                frame,
                Some(&masks),
                &self.options.background.to_descriptor(),
                &self.options.blend_settings(),
            )
            .context("composition failed")?;

        emit_stats(self.stats.record_frame(started.elapsed(), Instant::now()));
        Ok(Some(output))
    }

    /// Shuts the pipeline down. Idempotent; later `process_frame` calls
    /// become no-ops.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.host.close();
        tracing::info!("pipeline closed");
    }
}

fn emit_stats(report: Option<StatsReport>) {
    if let Some(report) = report {
        tracing::info!(
            mean_delay_ms = report.mean_delay.as_secs_f64() * 1000.0,
            fps = report.fps,
            frames = report.frames,
            dropped = report.dropped,
            "pipeline stats"
        );
    }
}
