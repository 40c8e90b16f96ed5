//! Runtime-tunable pipeline options.
//!
//! Options travel as full-value snapshots; there is no partial patching, so
//! a consumer always sees a consistent set. Out-of-range values are clamped
//! with a warning instead of rejected, keeping a live stream running on bad
//! input.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use renderer::{BackgroundDescriptor, BlendSettings, FilterSettings};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineOptions {
    /// EMA strength of the temporal mask smoothing, 0..=1.
    pub smoothing: f32,
    pub smoothstep_min: f32,
    pub smoothstep_max: f32,
    /// Gaussian blur sigma applied to the segmenter's input, 0 disables.
    pub blur: f32,
    pub brightness: f32,
    pub contrast: f32,
    pub gamma: f32,
    /// Person border softening radius in pixels, 0 disables.
    pub border_smooth: f32,
    /// Rebuild the segmenter after this many segmented frames, 0 disables.
    pub restart_every: u32,
    pub background: BackgroundOption,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            smoothing: 0.8,
            smoothstep_min: 0.75,
            smoothstep_max: 0.9,
            blur: 0.0,
            brightness: 0.0,
            contrast: 1.0,
            gamma: 1.0,
            border_smooth: 0.0,
            restart_every: 0,
            background: BackgroundOption::None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackgroundOption {
    #[default]
    None,
    Color {
        r: u8,
        g: u8,
        b: u8,
        #[serde(default = "opaque")]
        a: u8,
    },
    Image {
        path: PathBuf,
    },
    Video {
        path: PathBuf,
    },
}

fn opaque() -> u8 {
    255
}

impl BackgroundOption {
    pub fn to_descriptor(&self) -> BackgroundDescriptor {
        match self {
            Self::None => BackgroundDescriptor::None,
            Self::Color { r, g, b, a } => BackgroundDescriptor::Color([*r, *g, *b, *a]),
            Self::Image { path } => BackgroundDescriptor::Image(path.clone()),
            Self::Video { path } => BackgroundDescriptor::Video(path.clone()),
        }
    }
}

impl PipelineOptions {
    /// Clamps every field into its valid range, warning about each change.
    /// An inverted smoothstep band falls back to the defaults because a
    /// degenerate band would divide by zero in the gate.
    pub fn sanitized(&self) -> Self {
        let mut options = self.clone();
        let mut clamp = |name: &str, value: &mut f32, min: f32, max: f32| {
            let clamped = value.clamp(min, max);
            if clamped != *value {
                tracing::warn!(option = name, given = *value, used = clamped, "option out of range");
                *value = clamped;
            }
        };
        clamp("smoothing", &mut options.smoothing, 0.0, 1.0);
        clamp("smoothstep_min", &mut options.smoothstep_min, 0.0, 1.0);
        clamp("smoothstep_max", &mut options.smoothstep_max, 0.0, 1.0);
        clamp("blur", &mut options.blur, 0.0, f32::MAX);
        clamp("brightness", &mut options.brightness, -1.0, 1.0);
        clamp("contrast", &mut options.contrast, 0.0, f32::MAX);
        clamp("gamma", &mut options.gamma, 0.0, f32::MAX);
        clamp("border_smooth", &mut options.border_smooth, 0.0, f32::MAX);
        if options.smoothstep_min >= options.smoothstep_max {
            let defaults = Self::default();
            tracing::warn!(
                min = options.smoothstep_min,
                max = options.smoothstep_max,
                "inverted smoothstep band, restoring defaults"
            );
            options.smoothstep_min = defaults.smoothstep_min;
            options.smoothstep_max = defaults.smoothstep_max;
        }
        options
    }

    pub fn filter_settings(&self) -> FilterSettings {
        FilterSettings {
            blur: self.blur,
            brightness: self.brightness,
            contrast: self.contrast,
            gamma: self.gamma,
        }
    }

    pub fn blend_settings(&self) -> BlendSettings {
        BlendSettings {
            smoothing: self.smoothing,
            smoothstep_min: self.smoothstep_min,
            smoothstep_max: self.smoothstep_max,
            border_smooth: self.border_smooth,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_the_defaults() {
        let options: PipelineOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options, PipelineOptions::default());
        assert_eq!(options.smoothing, 0.8);
        assert_eq!(options.smoothstep_min, 0.75);
        assert_eq!(options.smoothstep_max, 0.9);
    }

    #[test]
    fn background_variants_deserialize_by_tag() {
        let options: PipelineOptions = serde_json::from_str(
            r#"{"background": {"type": "color", "r": 10, "g": 20, "b": 30}}"#,
        )
        .unwrap();
        assert_eq!(
            options.background.to_descriptor(),
            BackgroundDescriptor::Color([10, 20, 30, 255])
        );

        let options: PipelineOptions = serde_json::from_str(
            r#"{"background": {"type": "video", "path": "/tmp/loop.gif"}}"#,
        )
        .unwrap();
        assert_eq!(
            options.background.to_descriptor(),
            BackgroundDescriptor::Video(PathBuf::from("/tmp/loop.gif"))
        );
    }

    #[test]
    fn sanitize_clamps_out_of_range_values() {
        let options = PipelineOptions {
            smoothing: 1.7,
            blur: -2.0,
            contrast: -0.5,
            brightness: 4.0,
            ..PipelineOptions::default()
        }
        .sanitized();
        assert_eq!(options.smoothing, 1.0);
        assert_eq!(options.blur, 0.0);
        assert_eq!(options.contrast, 0.0);
        assert_eq!(options.brightness, 1.0);
    }

    #[test]
    fn inverted_smoothstep_band_restores_defaults() {
        let options = PipelineOptions {
            smoothstep_min: 0.9,
            smoothstep_max: 0.2,
            ..PipelineOptions::default()
        }
        .sanitized();
        assert_eq!(options.smoothstep_min, 0.75);
        assert_eq!(options.smoothstep_max, 0.9);
    }

    #[test]
    fn settings_views_carry_the_matching_fields() {
        let options = PipelineOptions {
            blur: 2.5,
            gamma: 2.2,
            smoothing: 0.5,
            border_smooth: 3.0,
            ..PipelineOptions::default()
        };
        assert_eq!(options.filter_settings().blur, 2.5);
        assert_eq!(options.filter_settings().gamma, 2.2);
        assert_eq!(options.blend_settings().smoothing, 0.5);
        assert_eq!(options.blend_settings().border_smooth, 3.0);
    }

    #[test]
    fn options_roundtrip_through_json() {
        let options = PipelineOptions {
            blur: 4.0,
            restart_every: 120,
            background: BackgroundOption::Image {
                path: PathBuf::from("/tmp/office.png"),
            },
            ..PipelineOptions::default()
        };
        let json = serde_json::to_string(&options).unwrap();
        let back: PipelineOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, options);
    }
}
