//! GPU core of the virtual background pipeline.
//!
//! Everything renders off-screen on a headless wgpu device: the
//! [`FilterPipeline`] pre-processes frames for segmentation, the
//! [`CompositingRenderer`] smooths segmentation masks over time and blends
//! the camera frame over a [`BackgroundManager`]-resolved background, and the
//! composited result is read back into host memory.

pub mod background;
pub mod compositor;
pub mod filter;
mod gpu;
mod shaders;
pub mod types;

pub use background::{BackgroundDescriptor, BackgroundManager, DEFAULT_BACKGROUND_COLOR};
pub use compositor::{cover_fit, CompositingRenderer};
pub use filter::{FilterPipeline, GaussianKernel};
pub use gpu::{ContextStatus, GpuContext};
pub use types::{
    BlendSettings, FilterSettings, RenderError, SegmentationMasks, VideoFrame,
};
