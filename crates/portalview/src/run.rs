use std::fs;
use std::path::Path;
use std::time::Duration;

use animator::{Clock, ManualClock, Monitor, PortalEffect, RenderStage, SeedGenerator, WindowId};
use anyhow::{anyhow, bail, Context, Result};
use image::RgbaImage;
use portalconfig::PortalConfig;
use renderer::gpu::{GpuContext, OffscreenTarget, RenderTarget, WgpuBackend};
use renderer::{EffectResources, GpuBackend, Rect, SnapshotImage, SoftwareBackend};
use tracing_subscriber::EnvFilter;

use crate::cli::{Backend, Cli};
use crate::host::{paint_fills, synthetic_snapshot, PreviewHost};
use crate::paths::AppPaths;
use crate::report::{FrameRecord, FrameReport};

const BACKGROUND: [u8; 4] = [24, 26, 33, 255];
const PREVIEW_WINDOW: WindowId = WindowId::new(0x1);

pub fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

pub fn run(args: Cli) -> Result<()> {
    let config = load_config(&args)?;
    let scene = Scene::from_args(&args);
    let snapshot = load_snapshot(&args, scene.window)?;

    fs::create_dir_all(&args.output)
        .with_context(|| format!("failed to create output directory {}", args.output.display()))?;

    tracing::info!(
        backend = args.backend.name(),
        duration_ms = config.duration.as_millis() as u64,
        color = %config.color,
        fps = args.fps,
        textured = snapshot.is_some(),
        output = %args.output.display(),
        "rendering portal preview"
    );

    let mut report = FrameReport::new(
        args.backend.name(),
        args.fps,
        config.duration.as_secs_f64(),
        snapshot.is_some(),
    );
    let seeds = match args.seed {
        Some(seed) => SeedGenerator::from_seed(seed),
        None => SeedGenerator::from_entropy(),
    };

    let frames = match args.backend {
        Backend::Software => {
            let effect = PortalEffect::with_parts(
                EffectResources::new(SoftwareBackend::new()),
                config,
                ManualClock::default(),
                seeds,
            );
            let mut host = PreviewHost::new();
            host.map_window(PREVIEW_WINDOW, scene.window, snapshot.map(SnapshotImage::new));
            let mut surface = SoftwareSurface::new(scene.width, scene.height);
            simulate(effect, &mut host, &mut surface, &scene, &mut report, &args.output)?
        }
        Backend::Gpu => {
            let context = GpuContext::headless().context("gpu backend requested")?;
            tracing::info!(adapter = %context.adapter_name, "using GPU adapter");
            let backend = WgpuBackend::from_context(&context);
            let snapshot = snapshot.map(|image| backend.upload(&image));
            let effect = PortalEffect::with_parts(
                EffectResources::new(backend),
                config,
                ManualClock::default(),
                seeds,
            );
            let mut host = PreviewHost::new();
            host.map_window(PREVIEW_WINDOW, scene.window, snapshot);
            let mut surface = GpuSurface::new(&context, scene.width, scene.height);
            simulate(effect, &mut host, &mut surface, &scene, &mut report, &args.output)?
        }
    };

    report.write(&args.output)?;
    tracing::info!(frames, output = %args.output.display(), "preview complete");
    Ok(())
}

fn load_config(args: &Cli) -> Result<PortalConfig> {
    let path = match &args.config {
        Some(path) => Some(path.clone()),
        None => {
            let candidate = AppPaths::discover()?.config_file();
            candidate.is_file().then_some(candidate)
        }
    };

    let mut config = match path {
        Some(path) => {
            let raw = fs::read_to_string(&path)
                .with_context(|| format!("failed to read configuration {}", path.display()))?;
            let config = PortalConfig::from_toml_str(&raw)
                .with_context(|| format!("invalid configuration in {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded portal configuration");
            config
        }
        None => PortalConfig::default(),
    };

    if let Some(seconds) = args.duration {
        if seconds.is_nan() || seconds <= 0.0 {
            bail!("--duration must be a positive number of seconds");
        }
        config.duration =
            Duration::try_from_secs_f64(seconds).context("--duration is out of range")?;
    }
    if let Some(color) = args.color {
        config.color = color;
    }
    if let Some(speed) = args.rotation_speed {
        config.rotation_speed = speed;
    }
    if let Some(whirling) = args.whirling {
        config.whirling = whirling;
    }

    config.validate()?;
    Ok(config)
}

fn load_snapshot(args: &Cli, window: Rect) -> Result<Option<RgbaImage>> {
    if args.no_snapshot {
        return Ok(None);
    }
    match &args.snapshot {
        Some(path) => {
            let image = image::open(path)
                .with_context(|| format!("failed to open snapshot {}", path.display()))?;
            Ok(Some(image.to_rgba8()))
        }
        None => Ok(Some(synthetic_snapshot(
            window.width.round() as u32,
            window.height.round() as u32,
        ))),
    }
}

struct Scene {
    monitor: Monitor,
    window: Rect,
    width: u32,
    height: u32,
    frame_interval: Duration,
}

impl Scene {
    fn from_args(args: &Cli) -> Self {
        let (width, height) = args.canvas;
        let (origin_x, origin_y) = args.monitor_origin;
        let window = args.window.unwrap_or_else(|| {
            Rect::new(
                origin_x + width as f32 / 4.0,
                origin_y + height as f32 / 4.0,
                width as f32 / 2.0,
                height as f32 / 2.0,
            )
        });
        Self {
            monitor: Monitor::new(
                "preview",
                Rect::new(origin_x, origin_y, width as f32, height as f32),
            ),
            window,
            width,
            height,
            frame_interval: Duration::from_secs_f64(1.0 / args.fps),
        }
    }
}

/// Where one simulated frame is drawn and how it gets back to the CPU.
trait FrameSurface {
    type Target;

    fn begin_frame(&mut self) -> Result<()>;
    fn target_mut(&mut self) -> &mut Self::Target;
    fn finish_frame(&mut self) -> Result<RgbaImage>;
}

struct SoftwareSurface {
    frame: RgbaImage,
}

impl SoftwareSurface {
    fn new(width: u32, height: u32) -> Self {
        Self {
            frame: RgbaImage::from_pixel(width, height, image::Rgba(BACKGROUND)),
        }
    }
}

impl FrameSurface for SoftwareSurface {
    type Target = RgbaImage;

    fn begin_frame(&mut self) -> Result<()> {
        for pixel in self.frame.pixels_mut() {
            *pixel = image::Rgba(BACKGROUND);
        }
        Ok(())
    }

    fn target_mut(&mut self) -> &mut RgbaImage {
        &mut self.frame
    }

    fn finish_frame(&mut self) -> Result<RgbaImage> {
        Ok(self.frame.clone())
    }
}

struct GpuSurface {
    device: wgpu::Device,
    queue: wgpu::Queue,
    offscreen: OffscreenTarget,
}

impl GpuSurface {
    fn new(context: &GpuContext, width: u32, height: u32) -> Self {
        Self {
            device: context.device.clone(),
            queue: context.queue.clone(),
            offscreen: OffscreenTarget::new(&context.device, width, height),
        }
    }
}

impl FrameSurface for GpuSurface {
    type Target = RenderTarget;

    fn begin_frame(&mut self) -> Result<()> {
        let [r, g, b, a] = BACKGROUND.map(|channel| f64::from(channel) / 255.0);
        self.offscreen.clear(&self.device, &self.queue, [r, g, b, a]);
        Ok(())
    }

    fn target_mut(&mut self) -> &mut RenderTarget {
        self.offscreen.target_mut()
    }

    fn finish_frame(&mut self) -> Result<RgbaImage> {
        self.offscreen.read_rgba(&self.device, &self.queue)
    }
}

/// Closes the preview window and steps the clock until the animation is gone.
///
/// Each frame runs tick then render, like a compositor frame.
fn simulate<B, S>(
    mut effect: PortalEffect<B, ManualClock>,
    host: &mut PreviewHost<B::Image, B::Target>,
    surface: &mut S,
    scene: &Scene,
    report: &mut FrameReport,
    output: &Path,
) -> Result<u32>
where
    B: GpuBackend,
    S: FrameSurface<Target = B::Target>,
{
    let start = effect.clock().now();
    effect.on_window_close(host, PREVIEW_WINDOW, None);
    if !effect.has_active_animations() {
        return Err(anyhow!(
            "window {}x{}+{}+{} was not animated",
            scene.window.width,
            scene.window.height,
            scene.window.x,
            scene.window.y
        ));
    }

    let mut index = 0u32;
    loop {
        let now = effect.clock().now();
        effect.on_tick(host, now);
        if !effect.has_active_animations() {
            break;
        }

        surface.begin_frame()?;
        effect.on_render(
            host,
            surface.target_mut(),
            RenderStage::LastMoment,
            Some(&scene.monitor),
            now,
        );
        let mut frame = surface.finish_frame()?;
        paint_fills(&mut frame, &host.take_fills());

        let path = output.join(format!("frame_{index:04}.png"));
        frame
            .save(&path)
            .with_context(|| format!("failed to write frame {}", path.display()))?;

        let progress = effect
            .registry()
            .get(PREVIEW_WINDOW)
            .map(|record| record.progress(now));
        tracing::debug!(frame = index, progress = ?progress, "rendered frame");
        report.push(FrameRecord {
            index,
            time_secs: now.duration_since(start).as_secs_f64(),
            progress,
            active: effect.registry().len(),
        });

        index += 1;
        effect.clock().advance(scene.frame_interval);
    }

    tracing::debug!(
        damaged_regions = host.damaged_regions(),
        damaged_monitors = host.damaged_monitors(),
        "host redraw requests"
    );
    effect.shutdown();
    Ok(index)
}
