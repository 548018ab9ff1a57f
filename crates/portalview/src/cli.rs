use std::path::PathBuf;

use clap::Parser;
use portalconfig::PackedColor;
use renderer::Rect;

#[derive(Parser, Debug)]
#[command(
    name = "portalview",
    author,
    version,
    about = "Render every frame of a portal close animation to PNG"
)]
pub struct Cli {
    /// Effect configuration (TOML). Defaults to `portal.toml` in the config directory.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override the animation duration in seconds.
    #[arg(long, value_name = "SECONDS")]
    pub duration: Option<f64>,

    /// Override the portal color (`#9d4edd`, `0x9d4edd`).
    #[arg(long, value_name = "COLOR", value_parser = parse_color)]
    pub color: Option<PackedColor>,

    /// Override the swirl rotation speed.
    #[arg(long, value_name = "SPEED")]
    pub rotation_speed: Option<f32>,

    /// Override the whirl strength.
    #[arg(long, value_name = "AMOUNT")]
    pub whirling: Option<f32>,

    /// Monitor size in pixels.
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size, default_value = "640x400")]
    pub canvas: (u32, u32),

    /// Closing window in global coordinates (`WIDTHxHEIGHT+X+Y`). Centred on the monitor by default.
    #[arg(long, value_name = "WxH+X+Y", value_parser = parse_window_geometry)]
    pub window: Option<Rect>,

    /// Global position of the monitor's top-left corner.
    #[arg(long, value_name = "X,Y", value_parser = parse_origin, default_value = "0,0")]
    pub monitor_origin: (f32, f32),

    /// Simulated frame rate.
    #[arg(long, value_name = "FPS", value_parser = parse_fps, default_value_t = 60.0)]
    pub fps: f64,

    /// PNG used as the window's captured appearance.
    #[arg(long, value_name = "PNG", conflicts_with = "no_snapshot")]
    pub snapshot: Option<PathBuf>,

    /// Simulate a window without a snapshot (flat fallback quad).
    #[arg(long)]
    pub no_snapshot: bool,

    /// Fixed seed for the pattern generator.
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Rendering backend: `software` or `gpu`.
    #[arg(long, value_name = "BACKEND", value_parser = parse_backend, default_value = "software")]
    pub backend: Backend,

    /// Directory that receives `frame_NNNN.png` and `frames.json`.
    #[arg(long, value_name = "DIR", default_value = "portalview-frames")]
    pub output: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Software,
    Gpu,
}

impl Backend {
    pub fn name(self) -> &'static str {
        match self {
            Backend::Software => "software",
            Backend::Gpu => "gpu",
        }
    }
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_backend(value: &str) -> Result<Backend, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "software" | "cpu" => Ok(Backend::Software),
        "gpu" | "wgpu" => Ok(Backend::Gpu),
        "" => Err("backend must not be empty".to_string()),
        other => Err(format!(
            "unknown backend '{other}'; expected software or gpu"
        )),
    }
}

pub fn parse_color(value: &str) -> Result<PackedColor, String> {
    PackedColor::parse(value)
}

pub fn parse_fps(value: &str) -> Result<f64, String> {
    let fps: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("invalid frame rate '{value}'"))?;
    if !fps.is_finite() || fps <= 0.0 || fps > 240.0 {
        return Err("frame rate must be within (0, 240]".into());
    }
    Ok(fps)
}

pub fn parse_size(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid width".to_string())?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| "invalid height".to_string())?;
    if width == 0 || height == 0 {
        return Err("dimensions must be greater than zero".into());
    }
    Ok((width, height))
}

pub fn parse_origin(value: &str) -> Result<(f32, f32), String> {
    let (x, y) = value
        .trim()
        .split_once(',')
        .ok_or_else(|| "expected X,Y".to_string())?;
    let x = x
        .trim()
        .parse::<f32>()
        .map_err(|_| "invalid horizontal origin".to_string())?;
    let y = y
        .trim()
        .parse::<f32>()
        .map_err(|_| "invalid vertical origin".to_string())?;
    Ok((x, y))
}

/// Parses X11-style geometry, `WIDTHxHEIGHT+X+Y`. Offsets may be negative.
pub fn parse_window_geometry(value: &str) -> Result<Rect, String> {
    let trimmed = value.trim();
    let split = trimmed
        .find(['+', '-'])
        .ok_or_else(|| "expected WIDTHxHEIGHT+X+Y".to_string())?;
    let (size, offsets) = trimmed.split_at(split);
    let (width, height) = parse_size(size)?;

    let second = offsets[1..]
        .find(['+', '-'])
        .map(|index| index + 1)
        .ok_or_else(|| "expected both X and Y offsets".to_string())?;
    let (x, y) = offsets.split_at(second);
    let parse_offset = |raw: &str| {
        raw.trim_start_matches('+')
            .parse::<f32>()
            .map_err(|_| format!("invalid offset '{raw}'"))
    };

    Ok(Rect::new(
        parse_offset(x)?,
        parse_offset(y)?,
        width as f32,
        height as f32,
    ))
}
