//! Two-pass composition: temporal mask smoothing into a ping-pong state
//! texture, then the final blend of camera frame over the cover-fitted
//! background.

use crate::background::{BackgroundDescriptor, BackgroundManager};
use crate::gpu::{
    build_fullscreen_pipeline, encode_fullscreen_pass, GpuContext, PingPongIndex, RenderTarget,
};
use crate::shaders;
use crate::types::{BlendSettings, RenderError, SegmentationMasks, VideoFrame};

const FRAME_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;
const MASK_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R8Unorm;
// Rgba16Float keeps the EMA from stalling on small increments the way an
// 8-bit state buffer would.
const STATE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Cover-fit mapping of a background onto the canvas: the background is
/// scaled to fill the canvas completely and cropped centre-out on the axis
/// that overflows. Returned as `(scale, offset)` with the shader computing
/// `bg_uv = (uv - offset) / scale`.
pub fn cover_fit(
    canvas_width: u32,
    canvas_height: u32,
    background_width: u32,
    background_height: u32,
) -> ([f32; 2], [f32; 2]) {
    let canvas_aspect = canvas_width as f32 / canvas_height.max(1) as f32;
    let background_aspect = background_width as f32 / background_height.max(1) as f32;
    if canvas_aspect < background_aspect {
        let scale_x = background_aspect / canvas_aspect;
        ([scale_x, 1.0], [(1.0 - scale_x) / 2.0, 0.0])
    } else {
        let scale_y = canvas_aspect / background_aspect;
        ([1.0, scale_y], [0.0, (1.0 - scale_y) / 2.0])
    }
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct StateUniform {
    smoothing: f32,
    smoothstep_min: f32,
    smoothstep_max: f32,
    _pad: f32,
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct BlendUniform {
    scale: [f32; 2],
    offset: [f32; 2],
    canvas: [f32; 2],
    border_smooth: f32,
    _pad: f32,
}

struct CompositorTargets {
    frame: RenderTarget,
    category: RenderTarget,
    confidence: RenderTarget,
    state: [RenderTarget; 2],
    output: RenderTarget,
}

/// GPU compositor. Holds the temporal state between frames; recreate it
/// (together with the [`GpuContext`]) after a device loss.
pub struct CompositingRenderer {
    state_pipeline: wgpu::RenderPipeline,
    blend_pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    state_params: wgpu::Buffer,
    blend_params: wgpu::Buffer,
    targets: Option<CompositorTargets>,
    ping_pong: PingPongIndex,
    background: BackgroundManager,
}

impl CompositingRenderer {
    pub fn new(context: &GpuContext) -> Self {
        let device = &context.device;
        // Both passes bind three sampled textures, one sampler, one uniform.
        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("compositor bind group layout"),
            entries: &[
                texture_entry(0),
                texture_entry(1),
                texture_entry(2),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
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

        let state_pipeline = build_fullscreen_pipeline(
            device,
            "state update pass",
            shaders::STATE_UPDATE_FRAGMENT,
            &bind_group_layout,
            STATE_FORMAT,
        );
        let blend_pipeline = build_fullscreen_pipeline(
            device,
            "blend pass",
            shaders::BLEND_FRAGMENT,
            &bind_group_layout,
            FRAME_FORMAT,
        );

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("compositor sampler"),
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
        let state_params = make_uniform(
            "state update params",
            std::mem::size_of::<StateUniform>() as u64,
        );
        let blend_params =
            make_uniform("blend params", std::mem::size_of::<BlendUniform>() as u64);

        Self {
            state_pipeline,
            blend_pipeline,
            bind_group_layout,
            sampler,
            state_params,
            blend_params,
            targets: None,
            ping_pong: PingPongIndex::default(),
            background: BackgroundManager::new(),
        }
    }

    /// Composites one frame.
    ///
    /// With `masks` present the temporal state advances (Pass A) before the
    /// blend; without them the blend reuses the last good state, so a dropped
    /// segmentation never blanks the person. The ping-pong index toggles only
    /// after the readback succeeds.
    pub fn render(
        &mut self,
        context: &GpuContext,
        frame: &VideoFrame,
        masks: Option<&SegmentationMasks>,
        background: &BackgroundDescriptor,
        settings: &BlendSettings,
    ) -> Result<VideoFrame, RenderError> {
        context.ensure_active()?;
        frame.validate()?;
        if let Some(masks) = masks {
            if masks.width != frame.width || masks.height != frame.height {
                return Err(RenderError::MaskDimensions {
                    mask_width: masks.width,
                    mask_height: masks.height,
                    frame_width: frame.width,
                    frame_height: frame.height,
                });
            }
            for plane in [&masks.category, &masks.confidence] {
                if plane.len() != masks.plane_len() {
                    return Err(RenderError::MaskLength {
                        expected: masks.plane_len(),
                        actual: plane.len(),
                    });
                }
            }
        }

        let targets = match self.targets.take() {
            Some(targets) if targets.frame.matches(frame.width, frame.height) => targets,
            _ => {
                // New dimensions void the temporal state.
                self.ping_pong = PingPongIndex::default();
                Self::create_targets(context, frame.width, frame.height)
            }
        };

        targets.frame.upload(&context.queue, &frame.data, 4);
        if let Some(masks) = masks {
            targets.category.upload(&context.queue, &masks.category, 1);
            targets
                .confidence
                .upload(&context.queue, &masks.confidence, 1);
            let state = StateUniform {
                smoothing: settings.smoothing,
                smoothstep_min: settings.smoothstep_min,
                smoothstep_max: settings.smoothstep_max,
                _pad: 0.0,
            };
            context
                .queue
                .write_buffer(&self.state_params, 0, bytemuck::bytes_of(&state));
        }

        let prepared = self.background.resolve(context, background);
        let background_frame = prepared.frame_at(frame.timestamp);
        let (scale, offset) = cover_fit(
            frame.width,
            frame.height,
            background_frame.width,
            background_frame.height,
        );
        let blend = BlendUniform {
            scale,
            offset,
            canvas: [frame.width as f32, frame.height as f32],
            border_smooth: settings.border_smooth,
            _pad: 0.0,
        };
        context
            .queue
            .write_buffer(&self.blend_params, 0, bytemuck::bytes_of(&blend));

        let mut encoder = context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("compositor encoder"),
            });

        let updated = masks.is_some();
        if updated {
            let bind_group = bind_trio(
                &context.device,
                &self.bind_group_layout,
                &self.sampler,
                [
                    &targets.category.view,
                    &targets.confidence.view,
                    &targets.state[self.ping_pong.read()].view,
                ],
                &self.state_params,
            );
            encode_fullscreen_pass(
                &mut encoder,
                "state update",
                &self.state_pipeline,
                &bind_group,
                &targets.state[self.ping_pong.write()].view,
            );
        }

        let state_index = if updated {
            self.ping_pong.write()
        } else {
            self.ping_pong.read()
        };
        let bind_group = bind_trio(
            &context.device,
            &self.bind_group_layout,
            &self.sampler,
            [
                &targets.frame.view,
                &background_frame.view,
                &targets.state[state_index].view,
            ],
            &self.blend_params,
        );
        encode_fullscreen_pass(
            &mut encoder,
            "blend",
            &self.blend_pipeline,
            &bind_group,
            &targets.output.view,
        );
        context.queue.submit(std::iter::once(encoder.finish()));

        let data = crate::gpu::read_rgba_texture(
            &context.device,
            &context.queue,
            &targets.output.texture,
            frame.width,
            frame.height,
        )?;
        if updated {
            self.ping_pong.swap();
        }
        self.targets = Some(targets);
        Ok(VideoFrame::new(
            frame.width,
            frame.height,
            frame.timestamp,
            data,
        ))
    }

    fn create_targets(context: &GpuContext, width: u32, height: u32) -> CompositorTargets {
        let device = &context.device;
        let sampled = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
        let state_usage =
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING;
        let make_state = |label| {
            RenderTarget::new_zeroed(
                device,
                &context.queue,
                label,
                width,
                height,
                STATE_FORMAT,
                state_usage,
                8,
            )
        };
        CompositorTargets {
            frame: RenderTarget::new(device, "camera frame", width, height, FRAME_FORMAT, sampled),
            category: RenderTarget::new(
                device,
                "category mask",
                width,
                height,
                MASK_FORMAT,
                sampled,
            ),
            confidence: RenderTarget::new(
                device,
                "confidence mask",
                width,
                height,
                MASK_FORMAT,
                sampled,
            ),
            state: [make_state("mask state a"), make_state("mask state b")],
            output: RenderTarget::new(
                device,
                "composited output",
                width,
                height,
                FRAME_FORMAT,
                wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            ),
        }
    }
}

fn bind_trio(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    views: [&wgpu::TextureView; 3],
    params: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("compositor bind group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(views[0]),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(views[1]),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(views[2]),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: params.as_entire_binding(),
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cover_fit_is_identity_for_matching_aspect() {
        let (scale, offset) = cover_fit(1280, 720, 1920, 1080);
        assert_eq!(scale, [1.0, 1.0]);
        assert_eq!(offset, [0.0, 0.0]);
    }

    #[test]
    fn wider_background_is_cropped_horizontally() {
        let (scale, offset) = cover_fit(100, 100, 200, 100);
        assert_eq!(scale, [2.0, 1.0]);
        assert_eq!(offset, [-0.5, 0.0]);
        // Centre of the canvas lands on the centre of the background.
        let uv_x = (0.5 - offset[0]) / scale[0];
        assert!((uv_x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn taller_background_is_cropped_vertically() {
        let (scale, offset) = cover_fit(200, 100, 100, 100);
        assert_eq!(scale, [1.0, 2.0]);
        assert_eq!(offset, [0.0, -0.5]);
    }

    // Host mirror of the state-update fragment, for checking the temporal
    // behaviour without a GPU.
    fn state_step(raw_category: f32, confidence: f32, previous: f32, s: &BlendSettings) -> f32 {
        let (category, confidence) = if raw_category > 0.0 {
            (1.0, 1.0 - confidence)
        } else {
            (0.0, confidence)
        };
        let t = ((confidence - s.smoothstep_min) / (s.smoothstep_max - s.smoothstep_min))
            .clamp(0.0, 1.0);
        let gated = t * t * (3.0 - 2.0 * t);
        let alpha = s.smoothing * gated;
        alpha * category + (1.0 - alpha) * previous
    }

    #[test]
    fn confident_person_pixel_converges_to_one() {
        let settings = BlendSettings::default();
        let mut state = 0.0;
        for _ in 0..20 {
            state = state_step(1.0, 0.0, state, &settings);
        }
        assert!(state > 0.99, "state stalled at {state}");
        // Each step moves by exactly the smoothing factor of the remainder.
        let next = state_step(1.0, 0.0, state, &settings);
        assert!((next - (state + 0.8 * (1.0 - state))).abs() < 1e-6);
    }

    #[test]
    fn confident_background_pixel_converges_to_zero() {
        let settings = BlendSettings::default();
        let mut state = 1.0;
        for _ in 0..20 {
            state = state_step(0.0, 1.0, state, &settings);
        }
        assert!(state < 0.01, "state stalled at {state}");
    }

    #[test]
    fn low_confidence_freezes_the_state() {
        let settings = BlendSettings::default();
        // Below smoothstep_min the gate closes entirely, for both classes.
        let frozen = 0.37;
        assert_eq!(state_step(1.0, 0.9, frozen, &settings), frozen);
        assert_eq!(state_step(0.0, 0.5, frozen, &settings), frozen);
    }

    #[test]
    fn ema_rate_matches_the_smoothing_factor_exactly() {
        let settings = BlendSettings {
            smoothing: 0.8,
            smoothstep_min: 0.6,
            smoothstep_max: 0.9,
            border_smooth: 0.0,
        };
        // Confident foreground pixel: background confidence 0.05 inverts to
        // 0.95, which saturates the (0.6, 0.9) gate, so alpha is exactly the
        // smoothing factor.
        let first = state_step(1.0, 0.05, 0.0, &settings);
        assert!((first - 0.8).abs() < 1e-6);
        let second = state_step(1.0, 0.05, first, &settings);
        assert!((second - 0.96).abs() < 1e-6);
    }

    #[test]
    fn smoothstep_band_scales_the_update_rate() {
        let settings = BlendSettings::default();
        // Midway through the (0.75, 0.9) band the gate is exactly one half.
        let mid = state_step(0.0, 0.825, 1.0, &settings);
        assert!((mid - (1.0 - 0.8 * 0.5)).abs() < 1e-6);
    }
}
