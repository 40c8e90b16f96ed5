//! Pre-segmentation filter chain: separable Gaussian blur followed by a
//! brightness/contrast/gamma adjustment.
//!
//! The filtered frame feeds the segmenter only; composition always uses the
//! raw camera frame. The Gaussian kernel and tap count are computed on the
//! CPU and uploaded as uniforms, which keeps the weights host-testable and
//! the shader a plain weighted loop.

use crate::gpu::{build_fullscreen_pipeline, encode_fullscreen_pass, GpuContext, RenderTarget};
use crate::shaders;
use crate::types::{FilterSettings, RenderError, VideoFrame};

const FRAME_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const MAX_RADIUS: u32 = 10;

/// One-sided normalised Gaussian weights.
///
/// `weights[0]` is the centre tap; index `i` is the weight shared by the
/// texels at offsets `+i` and `-i`. Normalisation accounts for both sides, so
/// `weights[0] + 2 * weights[1..].sum() == 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianKernel {
    weights: Vec<f32>,
}

impl GaussianKernel {
    pub fn new(sigma: f32) -> Self {
        let radius = ((2.5 * sigma).ceil() as u32).clamp(1, MAX_RADIUS);
        let denom = 2.0 * sigma * sigma;
        let mut weights: Vec<f32> = (0..=radius)
            .map(|offset| (-((offset * offset) as f32) / denom).exp())
            .collect();
        let total = weights[0] + 2.0 * weights[1..].iter().sum::<f32>();
        for weight in &mut weights {
            *weight /= total;
        }
        Self { weights }
    }

    /// Number of one-sided taps, centre included. At most `MAX_RADIUS + 1`.
    pub fn taps(&self) -> u32 {
        self.weights.len() as u32
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    fn packed(&self) -> [[f32; 4]; 6] {
        let mut packed = [[0.0f32; 4]; 6];
        for (index, weight) in self.weights.iter().enumerate() {
            packed[index / 4][index % 4] = *weight;
        }
        packed
    }
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct BlurUniform {
    texel: [f32; 2],
    direction: [f32; 2],
    weights: [[f32; 4]; 6],
    taps: u32,
    _pad: [u32; 3],
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct ColorUniform {
    brightness: f32,
    contrast: f32,
    gamma: f32,
    _pad: f32,
}

struct FilterTargets {
    input: RenderTarget,
    scratch: [RenderTarget; 2],
}

/// GPU filter chain. Reused across frames; textures are reallocated only when
/// the frame dimensions change.
pub struct FilterPipeline {
    blur_pipeline: wgpu::RenderPipeline,
    color_pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    blur_h_params: wgpu::Buffer,
    blur_v_params: wgpu::Buffer,
    color_params: wgpu::Buffer,
    targets: Option<FilterTargets>,
}

impl FilterPipeline {
    pub fn new(context: &GpuContext) -> Self {
        let device = &context.device;
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("filter bind group layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let blur_pipeline = build_fullscreen_pipeline(
            device,
            "blur pass",
            shaders::BLUR_FRAGMENT,
            &bind_group_layout,
            FRAME_FORMAT,
        );
        let color_pipeline = build_fullscreen_pipeline(
            device,
            "color adjust pass",
            shaders::COLOR_ADJUST_FRAGMENT,
            &bind_group_layout,
            FRAME_FORMAT,
        );

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("filter sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let make_uniform = |label: &str, size: u64| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let blur_h_params = make_uniform(
            "horizontal blur params",
            std::mem::size_of::<BlurUniform>() as u64,
        );
        let blur_v_params = make_uniform(
            "vertical blur params",
            std::mem::size_of::<BlurUniform>() as u64,
        );
        let color_params = make_uniform("color params", std::mem::size_of::<ColorUniform>() as u64);

        Self {
            blur_pipeline,
            color_pipeline,
            bind_group_layout,
            sampler,
            blur_h_params,
            blur_v_params,
            color_params,
            targets: None,
        }
    }

    /// Runs the enabled filter stages over `frame`.
    ///
    /// Returns `Ok(None)` when the settings are the identity, in which case
    /// the caller should hand the original frame to the segmenter unchanged.
    pub fn apply(
        &mut self,
        context: &GpuContext,
        frame: &VideoFrame,
        settings: &FilterSettings,
    ) -> Result<Option<VideoFrame>, RenderError> {
        if settings.is_identity() {
            return Ok(None);
        }
        context.ensure_active()?;
        frame.validate()?;

        let targets = match self.targets.take() {
            Some(targets) if targets.input.matches(frame.width, frame.height) => targets,
            _ => Self::create_targets(&context.device, frame.width, frame.height),
        };
        targets.input.upload(&context.queue, &frame.data, 4);

        if settings.wants_blur() {
            let kernel = GaussianKernel::new(settings.blur);
            let texel = [1.0 / frame.width as f32, 1.0 / frame.height as f32];
            let horizontal = BlurUniform {
                texel,
                direction: [1.0, 0.0],
                weights: kernel.packed(),
                taps: kernel.taps(),
                _pad: [0; 3],
            };
            let vertical = BlurUniform {
                direction: [0.0, 1.0],
                ..horizontal
            };
            context
                .queue
                .write_buffer(&self.blur_h_params, 0, bytemuck::bytes_of(&horizontal));
            context
                .queue
                .write_buffer(&self.blur_v_params, 0, bytemuck::bytes_of(&vertical));
        }
        if settings.wants_color_adjust() {
            let color = ColorUniform {
                brightness: settings.brightness,
                contrast: settings.contrast,
                gamma: settings.gamma,
                _pad: 0.0,
            };
            context
                .queue
                .write_buffer(&self.color_params, 0, bytemuck::bytes_of(&color));
        }

        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("filter encoder"),
            });

        // Passes ping between the two scratch targets; `source` tracks which
        // texture holds the latest stage output.
        let mut source = &targets.input;
        let mut next = 0usize;
        if settings.wants_blur() {
            for (label, pipeline, params) in [
                ("horizontal blur", &self.blur_pipeline, &self.blur_h_params),
                ("vertical blur", &self.blur_pipeline, &self.blur_v_params),
            ] {
                let destination = &targets.scratch[next];
                let bind_group = self.bind_source(&context.device, source, params);
                encode_fullscreen_pass(
                    &mut encoder,
                    label,
                    pipeline,
                    &bind_group,
                    &destination.view,
                );
                source = destination;
                next = (next + 1) % 2;
            }
        }
        if settings.wants_color_adjust() {
            let destination = &targets.scratch[next];
            let bind_group = self.bind_source(&context.device, source, &self.color_params);
            encode_fullscreen_pass(
                &mut encoder,
                "color adjust",
                &self.color_pipeline,
                &bind_group,
                &destination.view,
            );
            source = destination;
        }
        context.queue.submit(std::iter::once(encoder.finish()));

        let data = crate::gpu::read_rgba_texture(
            &context.device,
            &context.queue,
            &source.texture,
            frame.width,
            frame.height,
        )?;
        self.targets = Some(targets);
        Ok(Some(VideoFrame::new(
            frame.width,
            frame.height,
            frame.timestamp,
            data,
        )))
    }

    fn create_targets(device: &wgpu::Device, width: u32, height: u32) -> FilterTargets {
        let usage = wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC;
        FilterTargets {
            input: RenderTarget::new(
                device,
                "filter input",
                width,
                height,
                FRAME_FORMAT,
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            ),
            scratch: [
                RenderTarget::new(device, "filter scratch a", width, height, FRAME_FORMAT, usage),
                RenderTarget::new(device, "filter scratch b", width, height, FRAME_FORMAT, usage),
            ],
        }
    }

    fn bind_source(
        &self,
        device: &wgpu::Device,
        source: &RenderTarget,
        params: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("filter bind group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&source.view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params.as_entire_binding(),
                },
            ],
        })
    }
}
