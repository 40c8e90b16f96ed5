//! WGSL sources for every pass.
//!
//! All passes share a bufferless fullscreen-triangle vertex stage; fragments
//! receive a top-left-origin UV. `textureSampleLevel` is used throughout so
//! sampling stays legal inside loops and branches.

pub(crate) const FULLSCREEN_VERTEX: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    var positions = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -3.0),
        vec2<f32>(3.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );
    let pos = positions[index];
    var out: VertexOutput;
    out.position = vec4<f32>(pos, 0.0, 1.0);
    out.uv = vec2<f32>(pos.x * 0.5 + 0.5, 0.5 - pos.y * 0.5);
    return out;
}
"#;

/// One axis of the separable Gaussian. The kernel is computed on the CPU and
/// uploaded symmetric: `weights[0]` is the centre tap, index `i` covers both
/// `+i` and `-i` texels along `direction`.
pub(crate) const BLUR_FRAGMENT: &str = r#"
struct BlurParams {
    texel: vec2<f32>,
    direction: vec2<f32>,
    weights: array<vec4<f32>, 6>,
    taps: u32,
}

@group(0) @binding(0) var source: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;
@group(0) @binding(2) var<uniform> params: BlurParams;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    var color = textureSampleLevel(source, source_sampler, uv, 0.0).rgb * params.weights[0].x;
    for (var i = 1u; i < params.taps; i = i + 1u) {
        let weight = params.weights[i / 4u][i % 4u];
        let offset = params.direction * params.texel * f32(i);
        color += textureSampleLevel(source, source_sampler, uv + offset, 0.0).rgb * weight;
        color += textureSampleLevel(source, source_sampler, uv - offset, 0.0).rgb * weight;
    }
    return vec4<f32>(color, 1.0);
}
"#;

pub(crate) const COLOR_ADJUST_FRAGMENT: &str = r#"
struct ColorParams {
    brightness: f32,
    contrast: f32,
    gamma: f32,
    _pad: f32,
}

@group(0) @binding(0) var source: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;
@group(0) @binding(2) var<uniform> params: ColorParams;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    var rgb = textureSampleLevel(source, source_sampler, uv, 0.0).rgb;
    rgb = (rgb - vec3<f32>(0.5)) * params.contrast + vec3<f32>(0.5) + vec3<f32>(params.brightness);
    if (params.gamma > 0.0) {
        rgb = pow(max(rgb, vec3<f32>(0.0)), vec3<f32>(1.0 / params.gamma));
    }
    return vec4<f32>(clamp(rgb, vec3<f32>(0.0), vec3<f32>(1.0)), 1.0);
}
"#;

/// Temporal smoothing of the segmentation mask.
///
/// Category is binarised; confidence is inverted for person pixels so both
/// planes agree that 1.0 means person. The gated confidence drives an EMA
/// against the previous state texture. Output: (state, gated, 0, 1).
pub(crate) const STATE_UPDATE_FRAGMENT: &str = r#"
struct StateParams {
    smoothing: f32,
    smoothstep_min: f32,
    smoothstep_max: f32,
    _pad: f32,
}

@group(0) @binding(0) var category_tex: texture_2d<f32>;
@group(0) @binding(1) var confidence_tex: texture_2d<f32>;
@group(0) @binding(2) var state_tex: texture_2d<f32>;
@group(0) @binding(3) var mask_sampler: sampler;
@group(0) @binding(4) var<uniform> params: StateParams;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    let raw_category = textureSampleLevel(category_tex, mask_sampler, uv, 0.0).r;
    var confidence = textureSampleLevel(confidence_tex, mask_sampler, uv, 0.0).r;
    var category = 0.0;
    if (raw_category > 0.0) {
        category = 1.0;
        confidence = 1.0 - confidence;
    }
    let gated = smoothstep(params.smoothstep_min, params.smoothstep_max, confidence);
    let alpha = params.smoothing * gated;
    let previous = textureSampleLevel(state_tex, mask_sampler, uv, 0.0).r;
    let state = alpha * category + (1.0 - alpha) * previous;
    return vec4<f32>(state, gated, 0.0, 1.0);
}
"#;

/// Final composition: person pixels from the camera frame, everything else
/// from the cover-fitted background. Optional border smoothing re-runs the
/// whole blend at 8 neighbouring offsets (centre counted twice) and averages
/// the composited colours, a box blur confined to the transition band so
/// fully-person and fully-background areas stay crisp.
pub(crate) const BLEND_FRAGMENT: &str = r#"
struct BlendParams {
    scale: vec2<f32>,
    offset: vec2<f32>,
    canvas: vec2<f32>,
    border_smooth: f32,
    _pad: f32,
}

@group(0) @binding(0) var frame_tex: texture_2d<f32>;
@group(0) @binding(1) var background_tex: texture_2d<f32>;
@group(0) @binding(2) var state_tex: texture_2d<f32>;
@group(0) @binding(3) var blend_sampler: sampler;
@group(0) @binding(4) var<uniform> params: BlendParams;

fn blend_at(uv: vec2<f32>) -> vec3<f32> {
    let frame = textureSampleLevel(frame_tex, blend_sampler, uv, 0.0).rgb;
    let bg_uv = clamp((uv - params.offset) / params.scale, vec2<f32>(0.0), vec2<f32>(1.0));
    let background = textureSampleLevel(background_tex, blend_sampler, bg_uv, 0.0).rgb;
    let person = textureSampleLevel(state_tex, blend_sampler, uv, 0.0).r;
    return mix(background, frame, person);
}

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    var color = blend_at(uv);
    let person = textureSampleLevel(state_tex, blend_sampler, uv, 0.0).r;
    if (params.border_smooth > 0.0 && person > 0.1 && person < 0.5) {
        let delta = vec2<f32>(params.border_smooth) / params.canvas;
        var sum = color * 2.0;
        sum += blend_at(uv + vec2<f32>(delta.x, 0.0));
        sum += blend_at(uv - vec2<f32>(delta.x, 0.0));
        sum += blend_at(uv + vec2<f32>(0.0, delta.y));
        sum += blend_at(uv - vec2<f32>(0.0, delta.y));
        sum += blend_at(uv + delta);
        sum += blend_at(uv - delta);
        sum += blend_at(uv + vec2<f32>(delta.x, -delta.y));
        sum += blend_at(uv + vec2<f32>(-delta.x, delta.y));
        color = sum / 10.0;
    }
    return vec4<f32>(color, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn validate(label: &str, source: &str) {
        let module = naga::front::wgsl::parse_str(source)
            .unwrap_or_else(|err| panic!("{label} failed to parse: {err}"));
        naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::default(),
        )
        .validate(&module)
        .unwrap_or_else(|err| panic!("{label} failed validation: {err:?}"));
    }

    #[test]
    fn vertex_shader_is_valid_wgsl() {
        validate("fullscreen vertex", FULLSCREEN_VERTEX);
    }

    #[test]
    fn fragment_shaders_are_valid_wgsl() {
        validate("blur", BLUR_FRAGMENT);
        validate("color adjust", COLOR_ADJUST_FRAGMENT);
        validate("state update", STATE_UPDATE_FRAGMENT);
        validate("blend", BLEND_FRAGMENT);
    }
}
