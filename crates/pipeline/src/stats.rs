//! Rolling frame statistics, reported every two seconds of wall clock.

use std::time::{Duration, Instant};

pub(crate) const REPORT_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsReport {
    /// Mean end-to-end processing delay of the frames in the window.
    pub mean_delay: Duration,
    /// Completed frames per second over the window.
    pub fps: f64,
    pub frames: u32,
    pub dropped: u32,
}

/// Counters for one reporting window. `record_*` take an explicit `now` so
/// window behaviour is testable without sleeping.
pub struct FrameStats {
    window_start: Instant,
    frames: u32,
    dropped: u32,
    total_delay: Duration,
}

impl FrameStats {
    pub fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            frames: 0,
            dropped: 0,
            total_delay: Duration::ZERO,
        }
    }

    /// Records a completed frame. Returns a report when the window elapsed,
    /// resetting the counters for the next one.
    pub fn record_frame(&mut self, delay: Duration, now: Instant) -> Option<StatsReport> {
        self.frames += 1;
        self.total_delay += delay;
        self.maybe_report(now)
    }

    /// Records a dropped frame (no segmentation output or unusable input).
    pub fn record_dropped(&mut self, now: Instant) -> Option<StatsReport> {
        self.dropped += 1;
        self.maybe_report(now)
    }

    fn maybe_report(&mut self, now: Instant) -> Option<StatsReport> {
        let elapsed = now.duration_since(self.window_start);
        if elapsed < REPORT_INTERVAL {
            return None;
        }
        let report = StatsReport {
            mean_delay: self
                .total_delay
                .checked_div(self.frames)
                .unwrap_or(Duration::ZERO),
            fps: f64::from(self.frames) / elapsed.as_secs_f64(),
            frames: self.frames,
            dropped: self.dropped,
        };
        self.window_start = now;
        self.frames = 0;
        self.dropped = 0;
        self.total_delay = Duration::ZERO;
        Some(report)
    }
}
