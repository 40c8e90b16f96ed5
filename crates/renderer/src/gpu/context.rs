use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context as AnyhowContext, Result};

use crate::types::RenderError;

/// Whether the GPU device is still usable.
///
/// The device-lost notification arrives asynchronously from the driver; the
/// renderer never reacts to it inside the callback. Instead the callback flips
/// a flag and every GPU entry point checks [`GpuContext::status`] synchronously
/// before touching the device. Recovery means constructing a brand-new
/// `GpuContext` (and new pipeline instances); temporal state is not preserved
/// across a loss.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextStatus {
    Active,
    Lost,
}

/// Headless wgpu device + queue shared by every pipeline stage.
///
/// There is no surface: all passes render into off-screen targets and the
/// composited result is read back for the caller. This keeps the core free of
/// windowing concerns and lets the same context drive the filter and
/// compositing pipelines.
pub struct GpuContext {
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    adapter_name: String,
    lost: Arc<AtomicBool>,
}

impl GpuContext {
    pub fn new() -> Result<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            flags: wgpu::InstanceFlags::default(),
            memory_budget_thresholds: wgpu::MemoryBudgetThresholds::default(),
            backend_options: wgpu::BackendOptions::default(),
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .context("failed to find a suitable GPU adapter")?;

        let adapter_info = adapter.get_info();
        let limits = adapter.limits();
        tracing::debug!(
            name = %adapter_info.name,
            backend = ?adapter_info.backend,
            device_type = ?adapter_info.device_type,
            "selected GPU adapter"
        );

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("vbackground device"),
            required_features: wgpu::Features::empty(),
            required_limits: limits,
            memory_hints: wgpu::MemoryHints::MemoryUsage,
            trace: wgpu::Trace::default(),
        }))
        .context("failed to create GPU device")?;

        let lost = Arc::new(AtomicBool::new(false));
        let lost_flag = lost.clone();
        device.set_device_lost_callback(move |reason, message| {
            tracing::error!(?reason, %message, "GPU device lost; renderer is now unusable");
            lost_flag.store(true, Ordering::SeqCst);
        });

        Ok(Self {
            device,
            queue,
            adapter_name: adapter_info.name,
            lost,
        })
    }

    pub fn status(&self) -> ContextStatus {
        if self.lost.load(Ordering::SeqCst) {
            ContextStatus::Lost
        } else {
            ContextStatus::Active
        }
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    /// Gate placed in front of every GPU call path.
    pub(crate) fn ensure_active(&self) -> Result<(), RenderError> {
        match self.status() {
            ContextStatus::Active => Ok(()),
            ContextStatus::Lost => Err(RenderError::ContextLost),
        }
    }
}
