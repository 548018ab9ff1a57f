use tracing::debug;

use crate::host::{HostServices, WindowId};

/// Best-effort lookup of a window's last rendered appearance.
///
/// Uses the host cache, otherwise asks for a fresh snapshot and looks again.
/// `None` is an ordinary outcome: the caller falls back to a flat quad.
pub fn try_capture<H: HostServices>(host: &mut H, window: WindowId) -> Option<H::Image> {
    if let Some(image) = host.cached_snapshot(window) {
        debug!(window = %window, "reusing cached window snapshot");
        return Some(image);
    }

    debug!(window = %window, "requesting window snapshot");
    host.request_snapshot(window);

    let image = host.cached_snapshot(window);
    if image.is_none() {
        debug!(window = %window, "no snapshot available for closing window");
    }
    image
}
