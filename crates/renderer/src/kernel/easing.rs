//! Back-easing curves and the time envelopes built on top of them.

/// Fraction of progress spent opening the portal.
pub const PORTAL_OPEN_TIME: f32 = 0.4;
/// Fraction of progress spent closing the portal.
pub const PORTAL_CLOSE_TIME: f32 = 0.4;
/// Fraction of progress over which the window is pulled in.
pub const WINDOW_OPEN_TIME: f32 = 0.35;
/// Width of the wobble pulse, relative to [`WINDOW_OPEN_TIME`].
pub const PORTAL_WOBBLE_TIME: f32 = 0.8;

/// Anticipating ease: dips below zero before accelerating to one.
pub fn ease_in_back(x: f32, overshoot: f32) -> f32 {
    (overshoot + 1.0) * x * x * x - overshoot * x * x
}

/// Overshooting ease: passes one before settling back onto it.
pub fn ease_out_back(x: f32, overshoot: f32) -> f32 {
    let t = x - 1.0;
    1.0 + (overshoot + 1.0) * t * t * t + overshoot * t * t
}

/// Open/close envelope of the portal.
///
/// Grows from 0 with an overshoot during the first [`PORTAL_OPEN_TIME`],
/// holds at 1, then shrinks back to 0 over the last [`PORTAL_CLOSE_TIME`].
pub fn portal_scale(progress: f32) -> f32 {
    if progress < PORTAL_OPEN_TIME {
        ease_out_back(progress / PORTAL_OPEN_TIME, 1.5)
    } else if progress > 1.0 - PORTAL_CLOSE_TIME {
        ease_out_back(
            1.0 - (progress - 1.0 + PORTAL_CLOSE_TIME) / PORTAL_CLOSE_TIME,
            1.5,
        )
    } else {
        1.0
    }
}

/// Strength of the settle-in wobble, peaking when the window finishes entering.
pub fn wobble_envelope(progress: f32) -> f32 {
    let t = progress / WINDOW_OPEN_TIME;
    let pulse = (1.0 - ((t - 1.0) / PORTAL_WOBBLE_TIME).abs()).clamp(0.0, 1.0);
    ease_in_back(pulse, 1.7)
}

/// Eased pull of the window into the portal, `0` untouched and `1` fully absorbed.
pub fn window_pull(progress: f32) -> f32 {
    ease_in_back((progress / WINDOW_OPEN_TIME).clamp(0.0, 1.0), 1.2)
}
