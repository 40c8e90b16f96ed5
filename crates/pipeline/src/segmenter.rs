//! Segmenter contract and the recycling host.
//!
//! Segmentation models leak or degrade over long sessions; the host retires
//! the active instance after a configurable number of segmented frames and
//! replaces it with a freshly built one.

use anyhow::{Context, Result};
use renderer::{SegmentationMasks, VideoFrame};

/// A person segmentation backend.
///
/// `Ok(None)` means the backend produced no mask data for this frame; the
/// caller drops the frame and keeps its temporal state untouched. `Err` is a
/// hard failure and propagates.
pub trait Segmenter {
    fn segment(&mut self, frame: &VideoFrame) -> Result<Option<SegmentationMasks>>;

    /// Releases backend resources. Called once when the instance is retired.
    fn close(&mut self) {}
}

/// Builds fresh segmenter instances, both at startup and on recycle.
pub type SegmenterFactory = Box<dyn FnMut() -> Result<Box<dyn Segmenter>>>;

/// Owns the active segmenter and recycles it every `restart_every`
/// successfully segmented frames (0 disables recycling).
pub struct SegmenterHost {
    factory: SegmenterFactory,
    active: Box<dyn Segmenter>,
    segmented_since_restart: u32,
}

impl SegmenterHost {
    pub fn new(mut factory: SegmenterFactory) -> Result<Self> {
        let active = factory().context("failed to build initial segmenter")?;
        Ok(Self {
            factory,
            active,
            segmented_since_restart: 0,
        })
    }

    pub fn segment(
        &mut self,
        frame: &VideoFrame,
        restart_every: u32,
    ) -> Result<Option<SegmentationMasks>> {
        let masks = self.active.segment(frame)?;
        if masks.is_some() {
            self.segmented_since_restart += 1;
            self.maybe_recycle(restart_every);
        }
        Ok(masks)
    }

    /// Retires the active instance once the threshold is reached. The
    /// replacement is fully constructed before it is installed, and only then
    /// does the old instance's `close` run. A factory failure keeps the old
    /// instance in place; the counter resets either way so a persistent
    /// failure warns once per interval rather than once per frame.
    fn maybe_recycle(&mut self, restart_every: u32) {
        if restart_every == 0 || self.segmented_since_restart < restart_every {
            return;
        }
        match (self.factory)() {
            Ok(fresh) => {
                let mut retired = std::mem::replace(&mut self.active, fresh);
                retired.close();
                tracing::info!(after_frames = self.segmented_since_restart, "segmenter recycled");
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "segmenter rebuild failed, keeping the current instance"
                );
            }
        }
        self.segmented_since_restart = 0;
    }

    pub fn close(&mut self) {
        self.active.close();
    }
}
