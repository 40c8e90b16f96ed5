use std::path::PathBuf;

use clap::Parser;

/// Demo driver: pushes synthetic green-screen frames through the full
/// pipeline and writes the last composited frame as a PNG.
#[derive(Debug, Parser)]
#[command(name = "vbackground", version, about)]
pub struct Args {
    /// Frame width in pixels.
    #[arg(long, default_value_t = 320)]
    pub width: u32,

    /// Frame height in pixels.
    #[arg(long, default_value_t = 180)]
    pub height: u32,

    /// Number of synthetic frames to process.
    #[arg(long, default_value_t = 90)]
    pub frames: u32,

    /// Options JSON file applied at startup.
    #[arg(long)]
    pub options: Option<PathBuf>,

    /// Background image file (PNG, JPEG, BMP).
    #[arg(long)]
    pub background_image: Option<PathBuf>,

    /// Looping background animation (GIF).
    #[arg(long, conflicts_with = "background_image")]
    pub background_video: Option<PathBuf>,

    /// Solid background colour as "r,g,b".
    #[arg(
        long,
        value_parser = parse_color,
        conflicts_with_all = ["background_image", "background_video"]
    )]
    pub background_color: Option<[u8; 3]>,

    /// Gaussian blur sigma for the segmenter's input.
    #[arg(long)]
    pub blur: Option<f32>,

    /// Temporal smoothing strength, 0 to 1.
    #[arg(long)]
    pub smoothing: Option<f32>,

    /// Person border softening radius in pixels.
    #[arg(long)]
    pub border_smooth: Option<f32>,

    /// Rebuild the segmenter after this many frames (0 disables).
    #[arg(long)]
    pub restart_every: Option<u32>,

    /// Where to write the composited PNG.
    #[arg(long, default_value = "composited.png")]
    pub output: PathBuf,
}

fn parse_color(value: &str) -> Result<[u8; 3], String> {
    let parts: Vec<&str> = value.split(',').collect();
    if parts.len() != 3 {
        return Err(format!("expected \"r,g,b\", got \"{value}\""));
    }
    let mut color = [0u8; 3];
    for (slot, part) in color.iter_mut().zip(parts) {
        *slot = part
            .trim()
            .parse()
            .map_err(|_| format!("invalid colour channel \"{part}\""))?;
    }
    Ok(color)
}
