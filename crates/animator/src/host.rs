//! What the effect needs from the compositor, and what it hears from it.

use std::fmt;
use std::time::Instant;

use portalconfig::PortalConfig;
use renderer::{Rect, Rgba};

/// Opaque identity of a window. Never dereferenced; the window may be gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WindowId(u64);

impl WindowId {
    /// The identity a host hands over when it has no window.
    pub const NULL: WindowId = WindowId(0);

    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// An output, in global layout coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Monitor {
    pub name: String,
    pub bounds: Rect,
}

impl Monitor {
    pub fn new(name: impl Into<String>, bounds: Rect) -> Self {
        Self {
            name: name.into(),
            bounds,
        }
    }

    /// Moves a global rectangle into this monitor's local space.
    pub fn to_local(&self, rect: Rect) -> Rect {
        rect.translated(-self.bounds.x, -self.bounds.y)
    }
}

/// Stages of a compositor frame at which render callbacks fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderStage {
    Pre,
    Begin,
    PostWindows,
    /// Last pass before the frame is presented. The effect draws here.
    LastMoment,
    Post,
}

/// Compositor services consumed by the effect.
///
/// Implemented by the host integration; tests substitute recording doubles.
pub trait HostServices {
    /// Previously rendered window appearance.
    type Image: Clone;
    /// Surface the current frame is drawn into.
    type Target;

    fn window_geometry(&self, window: WindowId) -> Option<Rect>;

    /// Snapshot already cached for `window`, if any.
    fn cached_snapshot(&self, window: WindowId) -> Option<Self::Image>;

    /// Asks the host to capture `window` now. The result lands in the cache.
    fn request_snapshot(&mut self, window: WindowId);

    fn damage_region(&mut self, region: Rect);

    fn damage_monitor(&mut self, monitor: &Monitor);

    /// Draws a flat, straight-alpha rectangle in target-local pixels.
    fn fill_rect(&mut self, target: &mut Self::Target, rect: Rect, color: Rgba);
}

/// Event names the effect subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    CloseWindow,
    Tick,
    Render,
    ConfigReloaded,
}

/// Typed payloads of the subscribed events.
#[derive(Debug, Clone)]
pub enum HostEvent<'a> {
    /// A window started closing. `geometry` is global position and size, when
    /// the host already knows it.
    CloseWindow {
        window: WindowId,
        geometry: Option<Rect>,
    },
    Tick {
        now: Instant,
    },
    Render {
        stage: RenderStage,
        monitor: Option<&'a Monitor>,
        now: Instant,
    },
    ConfigReloaded(PortalConfig),
}

impl HostEvent<'_> {
    pub fn kind(&self) -> EventKind {
        match self {
            HostEvent::CloseWindow { .. } => EventKind::CloseWindow,
            HostEvent::Tick { .. } => EventKind::Tick,
            HostEvent::Render { .. } => EventKind::Render,
            HostEvent::ConfigReloaded(_) => EventKind::ConfigReloaded,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_window_is_recognised() {
        assert!(WindowId::NULL.is_null());
        assert!(!WindowId::new(0x55d0).is_null());
        assert_eq!(WindowId::new(0x55d0).to_string(), "0x55d0");
    }

    #[test]
    fn monitor_translates_into_local_space() {
        let monitor = Monitor::new("DP-1", Rect::new(1920.0, 0.0, 2560.0, 1440.0));
        let local = monitor.to_local(Rect::new(2000.0, 100.0, 300.0, 200.0));
        assert_eq!(local, Rect::new(80.0, 100.0, 300.0, 200.0));
    }

    #[test]
    fn events_report_their_kind() {
        let now = Instant::now();
        assert_eq!(HostEvent::Tick { now }.kind(), EventKind::Tick);
        assert_eq!(
            HostEvent::CloseWindow {
                window: WindowId::new(1),
                geometry: None
            }
            .kind(),
            EventKind::CloseWindow
        );
    }
}
