use std::time::Duration;

use thiserror::Error;

/// A single RGBA8 video frame in host memory.
///
/// `data` is tightly packed, `width * height * 4` bytes, rows top to bottom.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Presentation timestamp relative to the start of the stream.
    pub timestamp: Duration,
    pub data: Vec<u8>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, timestamp: Duration, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            timestamp,
            data,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * 4
    }

    pub(crate) fn validate(&self) -> Result<(), RenderError> {
        if self.is_empty() {
            return Err(RenderError::EmptyFrame);
        }
        if self.data.len() != self.expected_len() {
            return Err(RenderError::FrameLength {
                expected: self.expected_len(),
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

/// Per-pixel segmentation output, one byte per pixel per plane.
///
/// `category` is nonzero where the segmenter saw a person. `confidence` is the
/// model's confidence in the *background* at that pixel, 0..=255; the state
/// update pass inverts it for pixels tagged as person.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationMasks {
    pub width: u32,
    pub height: u32,
    pub category: Vec<u8>,
    pub confidence: Vec<u8>,
}

impl SegmentationMasks {
    pub fn plane_len(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Tunables for the pre-segmentation filter chain.
///
/// Defaults are the identity: no blur, no colour change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterSettings {
    /// Gaussian blur sigma in pixels. Zero or negative disables the blur.
    pub blur: f32,
    /// Additive brightness shift applied after contrast, in normalised units.
    pub brightness: f32,
    /// Multiplicative contrast about mid-grey. 1.0 is neutral.
    pub contrast: f32,
    /// Gamma exponent denominator. 1.0 is neutral; values <= 0 skip the
    /// gamma step entirely.
    pub gamma: f32,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            blur: 0.0,
            brightness: 0.0,
            contrast: 1.0,
            gamma: 1.0,
        }
    }
}

impl FilterSettings {
    pub fn wants_blur(&self) -> bool {
        self.blur > 0.0
    }

    pub fn wants_color_adjust(&self) -> bool {
        self.brightness != 0.0 || self.contrast != 1.0 || (self.gamma > 0.0 && self.gamma != 1.0)
    }

    pub fn is_identity(&self) -> bool {
        !self.wants_blur() && !self.wants_color_adjust()
    }
}

/// Tunables for the temporal mask state update and final blend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendSettings {
    /// EMA strength towards the incoming mask, 0..=1. Higher tracks faster.
    pub smoothing: f32,
    /// Lower smoothstep edge applied to mask confidence.
    pub smoothstep_min: f32,
    /// Upper smoothstep edge applied to mask confidence.
    pub smoothstep_max: f32,
    /// Radius in pixels of the edge-softening average at the person border.
    /// Zero disables it.
    pub border_smooth: f32,
}

impl Default for BlendSettings {
    fn default() -> Self {
        Self {
            smoothing: 0.8,
            smoothstep_min: 0.75,
            smoothstep_max: 0.9,
            border_smooth: 0.0,
        }
    }
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("gpu device was lost; renderer must be recreated")]
    ContextLost,
    #[error("frame has zero width or height")]
    EmptyFrame,
    #[error("frame data is {actual} bytes, expected {expected}")]
    FrameLength { expected: usize, actual: usize },
    #[error(
        "mask dimensions {mask_width}x{mask_height} do not match frame {frame_width}x{frame_height}"
    )]
    MaskDimensions {
        mask_width: u32,
        mask_height: u32,
        frame_width: u32,
        frame_height: u32,
    },
    #[error("mask plane is {actual} bytes, expected {expected}")]
    MaskLength { expected: usize, actual: usize },
    #[error("texture readback failed: {0}")]
    Readback(String),
    #[error("background image decode failed: {0}")]
    BackgroundDecode(String),
}
