//! Animation lifecycle of the portal closing effect.
//!
//! The host integration owns one [`PortalEffect`] and forwards the subscribed
//! events to it:
//!
//! - `CloseWindow` captures the window (best effort) and starts a record
//! - `Tick` prunes finished records and requests redraws of the rest
//! - `Render` at [`RenderStage::LastMoment`] draws each record through
//!   [`renderer::EffectResources`], or a flat fallback quad without a snapshot
//!
//! Everything runs on the host's render thread. Nothing here spawns threads or
//! blocks.

pub mod capture;
pub mod clock;
pub mod driver;
pub mod host;
pub mod registry;
pub mod seed;

pub use capture::try_capture;
pub use clock::{Clock, ManualClock, SystemClock};
pub use driver::{PortalEffect, DRAW_STAGE, SUBSCRIPTIONS};
pub use host::{EventKind, HostEvent, HostServices, Monitor, RenderStage, WindowId};
pub use registry::{progress_at, AnimationRecord, AnimationRegistry};
pub use seed::SeedGenerator;
