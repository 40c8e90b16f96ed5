//! Headless device acquisition and texture plumbing shared by the
//! compositing and filter passes.

mod context;
mod pipeline;
mod readback;
mod target;

pub use context::{ContextStatus, GpuContext};
pub(crate) use pipeline::{build_fullscreen_pipeline, encode_fullscreen_pass};
pub(crate) use readback::read_rgba_texture;
pub(crate) use target::{PingPongIndex, RenderTarget};
