//! Event entry points of the effect.
//!
//! [`PortalEffect`] is the context object the host integration owns and feeds
//! with [`HostEvent`]s. It never returns errors to the host: every failure is
//! logged here and the affected call becomes a no-op.

use std::time::Instant;

use portalconfig::{ConfigSource, PortalConfig};
use renderer::{EffectResources, GpuBackend, KernelParams, QuadDraw, Rect, Rgba};
use tracing::{debug, info, trace, warn};

use crate::capture::try_capture;
use crate::clock::{Clock, SystemClock};
use crate::host::{EventKind, HostEvent, HostServices, Monitor, RenderStage, WindowId};
use crate::registry::{AnimationRecord, AnimationRegistry};
use crate::seed::SeedGenerator;

/// Events the effect must be subscribed to.
pub const SUBSCRIPTIONS: [EventKind; 4] = [
    EventKind::CloseWindow,
    EventKind::Tick,
    EventKind::Render,
    EventKind::ConfigReloaded,
];

/// The stage at which the effect draws.
pub const DRAW_STAGE: RenderStage = RenderStage::LastMoment;

pub struct PortalEffect<B: GpuBackend, C: Clock = SystemClock> {
    config: PortalConfig,
    registry: AnimationRegistry<B::Image>,
    resources: EffectResources<B>,
    seeds: SeedGenerator,
    clock: C,
    unavailable_reported: bool,
}

impl<B: GpuBackend> PortalEffect<B> {
    pub fn new(backend: B, config: PortalConfig) -> Self {
        Self::with_parts(
            EffectResources::new(backend),
            config,
            SystemClock,
            SeedGenerator::from_entropy(),
        )
    }
}

impl<B: GpuBackend, C: Clock> PortalEffect<B, C> {
    pub fn with_parts(
        resources: EffectResources<B>,
        config: PortalConfig,
        clock: C,
        seeds: SeedGenerator,
    ) -> Self {
        Self {
            config,
            registry: AnimationRegistry::new(),
            resources,
            seeds,
            clock,
            unavailable_reported: false,
        }
    }

    pub fn subscriptions(&self) -> &'static [EventKind] {
        &SUBSCRIPTIONS
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn registry(&self) -> &AnimationRegistry<B::Image> {
        &self.registry
    }

    pub fn resources(&self) -> &EffectResources<B> {
        &self.resources
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn has_active_animations(&self) -> bool {
        !self.registry.is_empty()
    }

    /// Routes one host event to its handler.
    pub fn dispatch<H>(&mut self, host: &mut H, target: &mut B::Target, event: HostEvent<'_>)
    where
        H: HostServices<Image = B::Image, Target = B::Target>,
    {
        match event {
            HostEvent::CloseWindow { window, geometry } => {
                self.on_window_close(host, window, geometry)
            }
            HostEvent::Tick { now } => self.on_tick(host, now),
            HostEvent::Render {
                stage,
                monitor,
                now,
            } => self.on_render(host, target, stage, monitor, now),
            HostEvent::ConfigReloaded(config) => self.reload_config(config),
        }
    }

    /// Starts the closing animation for `window`.
    ///
    /// Repeated closes of a window that is still animating are ignored.
    pub fn on_window_close<H>(&mut self, host: &mut H, window: WindowId, geometry: Option<Rect>)
    where
        H: HostServices<Image = B::Image>,
    {
        if window.is_null() {
            warn!("close event without a window; ignoring");
            return;
        }
        if self.registry.contains(window) {
            debug!(window = %window, "window is already animating");
            return;
        }

        let Some(geometry) = geometry.or_else(|| host.window_geometry(window)) else {
            warn!(window = %window, "no geometry for closing window; skipping animation");
            return;
        };
        if !geometry.has_area() {
            warn!(
                window = %window,
                width = geometry.width,
                height = geometry.height,
                "closing window has no visible area; skipping animation"
            );
            return;
        }

        let image = try_capture(host, window);
        let record = AnimationRecord {
            window,
            geometry,
            start: self.clock.now(),
            duration: self.config.duration,
            seed: self.seeds.next_seed(),
            image,
        };
        info!(
            window = %window,
            duration_ms = record.duration.as_millis() as u64,
            textured = record.image.is_some(),
            "starting close animation"
        );
        self.registry.insert(record);
        host.damage_region(geometry);
    }

    /// Drops finished animations and asks for the rest to be redrawn.
    pub fn on_tick<H: HostServices>(&mut self, host: &mut H, now: Instant) {
        if self.registry.is_empty() {
            return;
        }

        for window in self.registry.prune(now) {
            debug!(window = %window, "close animation finished");
        }
        for record in self.registry.iter() {
            host.damage_region(record.geometry);
        }
    }

    /// Draws every active animation onto `monitor`.
    pub fn on_render<H>(
        &mut self,
        host: &mut H,
        target: &mut B::Target,
        stage: RenderStage,
        monitor: Option<&Monitor>,
        now: Instant,
    ) where
        H: HostServices<Image = B::Image, Target = B::Target>,
    {
        if stage != DRAW_STAGE || self.registry.is_empty() {
            return;
        }
        let Some(monitor) = monitor else {
            warn!("render pass without a monitor; skipping frame");
            return;
        };

        for window in self.registry.prune(now) {
            debug!(window = %window, "close animation finished");
        }
        if self.registry.is_empty() {
            return;
        }

        if let Err(err) = self.resources.ensure_initialized() {
            if !self.unavailable_reported {
                warn!(error = %err, "portal effect unavailable; windows close without animation");
                self.unavailable_reported = true;
            }
            return;
        }
        self.unavailable_reported = false;

        let color = self.config.color.to_rgb();
        for record in self.registry.iter() {
            let progress = record.progress(now);
            let rect = monitor.to_local(record.geometry);
            trace!(window = %record.window, progress, monitor = %monitor.name, "drawing close animation");

            match &record.image {
                Some(image) => {
                    let draw = QuadDraw {
                        rect,
                        params: KernelParams {
                            progress,
                            duration: record.duration.as_secs_f32(),
                            size: [record.geometry.width, record.geometry.height],
                            seed: record.seed,
                            color,
                            rotation_speed: self.config.rotation_speed,
                            whirling: self.config.whirling,
                        },
                        image,
                    };
                    if let Err(err) = self.resources.draw(target, &draw) {
                        warn!(window = %record.window, error = %err, "failed to draw close animation");
                    }
                }
                None => {
                    let remaining = 1.0 - progress;
                    host.fill_rect(
                        target,
                        rect.scaled_about_center(remaining),
                        Rgba::from_rgb(color, remaining),
                    );
                }
            }
        }

        host.damage_monitor(monitor);
    }

    /// Replaces the configuration for animations started from now on.
    pub fn reload_config(&mut self, config: PortalConfig) {
        if let Err(err) = config.validate() {
            warn!(error = %err, "rejected configuration reload; keeping previous values");
            return;
        }
        info!(
            duration_ms = config.duration.as_millis() as u64,
            rotation_speed = config.rotation_speed,
            whirling = config.whirling,
            color = %config.color,
            "portal configuration reloaded"
        );
        self.config = config;
    }

    /// Re-reads the configuration from the host's key/value store.
    pub fn reload_from(&mut self, source: &dyn ConfigSource) {
        match PortalConfig::from_source(source) {
            Ok(config) => self.reload_config(config),
            Err(err) => {
                warn!(error = %err, "failed to read portal configuration; keeping previous values")
            }
        }
    }

    /// Releases GPU resources and forgets an earlier initialization failure.
    ///
    /// The next render initializes again.
    pub fn reset_gpu(&mut self) {
        self.resources.teardown();
        self.unavailable_reported = false;
    }

    /// Stops every animation and releases GPU resources.
    pub fn shutdown(&mut self) {
        if !self.registry.is_empty() {
            info!(
                remaining = self.registry.len(),
                "dropping unfinished close animations"
            );
        }
        self.registry.clear();
        self.resources.teardown();
    }
}
