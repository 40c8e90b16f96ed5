//! Background source resolution.
//!
//! A background is identified by a string key derived from its descriptor;
//! the manager rebuilds GPU resources only when the key changes. A source
//! that fails to decode is replaced by the default colour under the same key,
//! so the failure is paid once rather than once per frame.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;

use image::codecs::gif::GifDecoder;
use image::AnimationDecoder;

use crate::gpu::{GpuContext, RenderTarget};
use crate::types::RenderError;

/// Material-blue fallback shown when no background is configured or a
/// configured one fails to decode.
pub const DEFAULT_BACKGROUND_COLOR: [u8; 4] = [33, 150, 243, 255];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BackgroundDescriptor {
    /// No background configured; the default colour is shown.
    #[default]
    None,
    /// Solid RGBA colour.
    Color([u8; 4]),
    /// Still image file (PNG, JPEG, BMP).
    Image(PathBuf),
    /// Looping animated background (GIF). Playback position follows the
    /// frame timestamp, so identical timestamps select identical frames.
    Video(PathBuf),
}

impl BackgroundDescriptor {
    /// Stable identity key. Resources are rebuilt only when this changes.
    pub fn key(&self) -> String {
        match self {
            Self::None => "none".to_owned(),
            Self::Color([r, g, b, a]) => format!("color({r},{g},{b},{a})"),
            Self::Image(path) => format!("image:{}", path.display()),
            Self::Video(path) => format!("video:{}", path.display()),
        }
    }
}

enum PreparedKind {
    Still(RenderTarget),
    Animated {
        frames: Vec<RenderTarget>,
        /// Cumulative end time of each frame within the loop.
        schedule: Vec<Duration>,
        total: Duration,
    },
}

pub(crate) struct PreparedBackground {
    key: String,
    kind: PreparedKind,
}

impl PreparedBackground {
    /// Target to composite for the given stream timestamp.
    pub(crate) fn frame_at(&self, timestamp: Duration) -> &RenderTarget {
        match &self.kind {
            PreparedKind::Still(target) => target,
            PreparedKind::Animated {
                frames,
                schedule,
                total,
            } => {
                if total.is_zero() {
                    return &frames[0];
                }
                let position = Duration::from_nanos(
                    (timestamp.as_nanos() % total.as_nanos()) as u64,
                );
                let index = schedule
                    .iter()
                    .position(|end| position < *end)
                    .unwrap_or(frames.len() - 1);
                &frames[index]
            }
        }
    }
}

/// Owns the currently installed background and swaps it atomically.
pub struct BackgroundManager {
    current: Option<PreparedBackground>,
}

impl BackgroundManager {
    pub fn new() -> Self {
        Self { current: None }
    }

    /// Returns GPU resources for `descriptor`, reusing the installed source
    /// when the identity key is unchanged.
    ///
    /// Decode failures are logged and replaced by the default colour under
    /// the same key, so a broken file is not re-read every frame.
    pub(crate) fn resolve(
        &mut self,
        context: &GpuContext,
        descriptor: &BackgroundDescriptor,
    ) -> &PreparedBackground {
        let key = descriptor.key();
        let prepared = match self.current.take() {
            Some(prepared) if prepared.key == key => prepared,
            previous => {
                let kind = match Self::prepare(context, descriptor) {
                    Ok(kind) => kind,
                    Err(err) => {
                        tracing::warn!(
                            background = %key,
                            error = %err,
                            "failed to load background, falling back to default colour"
                        );
                        Self::prepare_color(context, DEFAULT_BACKGROUND_COLOR)
                    }
                };
                let frames = match &kind {
                    PreparedKind::Still(_) => 1,
                    PreparedKind::Animated { frames, .. } => frames.len(),
                };
                tracing::info!(background = %key, frames, "background installed");
                let replacement = PreparedBackground { key, kind };
                // Release the outgoing source only once the replacement is
                // fully built and uploaded.
                drop(previous);
                replacement
            }
        };
        self.current.insert(prepared)
    }

    fn prepare(
        context: &GpuContext,
        descriptor: &BackgroundDescriptor,
    ) -> Result<PreparedKind, RenderError> {
        match descriptor {
            BackgroundDescriptor::None => {
                Ok(Self::prepare_color(context, DEFAULT_BACKGROUND_COLOR))
            }
            BackgroundDescriptor::Color(color) => Ok(Self::prepare_color(context, *color)),
            BackgroundDescriptor::Image(path) => {
                let image = image::open(path)
                    .map_err(|err| RenderError::BackgroundDecode(err.to_string()))?
                    .to_rgba8();
                let target = Self::upload_rgba(
                    context,
                    "background image",
                    image.width(),
                    image.height(),
                    image.as_raw(),
                );
                Ok(PreparedKind::Still(target))
            }
            BackgroundDescriptor::Video(path) => Self::prepare_animated(context, path),
        }
    }

    fn prepare_animated(context: &GpuContext, path: &PathBuf) -> Result<PreparedKind, RenderError> {
        let file =
            File::open(path).map_err(|err| RenderError::BackgroundDecode(err.to_string()))?;
        let decoder = GifDecoder::new(BufReader::new(file))
            .map_err(|err| RenderError::BackgroundDecode(err.to_string()))?;
        let mut frames = Vec::new();
        let mut schedule = Vec::new();
        let mut total = Duration::ZERO;
        for frame in decoder.into_frames() {
            let frame = frame.map_err(|err| RenderError::BackgroundDecode(err.to_string()))?;
            let delay = Duration::from(frame.delay());
            let buffer = frame.into_buffer();
            frames.push(Self::upload_rgba(
                context,
                "background video frame",
                buffer.width(),
                buffer.height(),
                buffer.as_raw(),
            ));
            total += delay;
            schedule.push(total);
        }
        if frames.is_empty() {
            return Err(RenderError::BackgroundDecode(
                "animation contains no frames".into(),
            ));
        }
        Ok(PreparedKind::Animated {
            frames,
            schedule,
            total,
        })
    }

    fn prepare_color(context: &GpuContext, color: [u8; 4]) -> PreparedKind {
        PreparedKind::Still(Self::upload_rgba(context, "background colour", 1, 1, &color))
    }

    fn upload_rgba(
        context: &GpuContext,
        label: &str,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> RenderTarget {
        let target = RenderTarget::new(
            &context.device,
            label,
            width,
            height,
            wgpu::TextureFormat::Rgba8Unorm,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        );
        target.upload(&context.queue, data, 4);
        target
    }
}

impl Default for BackgroundManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_distinguish_kind_and_payload() {
        let color = BackgroundDescriptor::Color([1, 2, 3, 255]);
        let image = BackgroundDescriptor::Image(PathBuf::from("/tmp/a.png"));
        let video = BackgroundDescriptor::Video(PathBuf::from("/tmp/a.png"));
        assert_ne!(color.key(), image.key());
        assert_ne!(image.key(), video.key());
        assert_eq!(image.key(), BackgroundDescriptor::Image(PathBuf::from("/tmp/a.png")).key());
    }

    #[test]
    fn default_descriptor_is_none() {
        assert_eq!(BackgroundDescriptor::default(), BackgroundDescriptor::None);
        assert_eq!(BackgroundDescriptor::default().key(), "none");
    }
}
