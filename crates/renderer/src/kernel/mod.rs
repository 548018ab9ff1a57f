//! CPU reference of the portal effect.
//!
//! [`shade`] is a pure function of its inputs and mirrors the WGSL program in
//! [`crate::shader`] line for line, so every layer can be sampled and checked
//! without a GPU. The effect is built from two independent samples:
//!
//! - the *portal*: a whirling disc of noise bands, a glowing rim and additive
//!   sparkles whose envelope opens and closes with [`easing::portal_scale`];
//! - the *window*: the captured appearance being scaled, squished and tilted
//!   into the portal while it fades out.
//!
//! The window is composited over the portal and the result is premultiplied.

pub mod easing;
pub mod noise;

use cgmath::{vec2, vec3, vec4, InnerSpace, Vector2, Vector3, Vector4};

use crate::types::{ImageSampler, KernelParams, Rgba};

use easing::{portal_scale, window_pull, wobble_envelope};
use noise::simplex2d;

const PORTAL_WOBBLE_STRENGTH: f32 = 1.2;
const GLOW_EDGE_WIDTH: f32 = 5.0;
const WINDOW_SCALE: f32 = 0.3;
const WINDOW_SQUISH: f32 = 1.0;
const WINDOW_TILT: f32 = -1.0;
const NOISE_THRESHOLD: f32 = 0.6;
const SPARKLE_EXPONENT: i32 = 50;

/// Evaluates the effect at surface coordinate `uv` (top-left origin).
///
/// `window` is the captured appearance; without one only the portal is drawn.
/// The returned color is premultiplied by its alpha.
pub fn shade(uv: [f32; 2], params: &KernelParams, window: Option<&dyn ImageSampler>) -> Rgba {
    let uv = vec2(uv[0], uv[1]);
    let portal = portal_color(uv, params);
    let window = match window {
        Some(image) => window_color(uv, params.progress, image),
        None => Vector4::new(0.0, 0.0, 0.0, 0.0),
    };
    let color = alpha_over(portal, window);
    Rgba::new(color.x * color.w, color.y * color.w, color.z * color.w, color.w)
}

/// Straight-alpha "over": composites `foreground` on top of `background`.
pub fn alpha_over(background: Vector4<f32>, foreground: Vector4<f32>) -> Vector4<f32> {
    let alpha = foreground.w + background.w * (1.0 - foreground.w);
    let weight = background.w * (1.0 - foreground.w);
    let rgb = (foreground.truncate() * foreground.w + background.truncate() * weight)
        / alpha.max(0.001);
    rgb.extend(alpha)
}

/// Polar rotation plus a radius-dependent angular warp.
pub fn whirl(coords: Vector2<f32>, warping: f32, rotation: f32) -> Vector2<f32> {
    let dist = coords.magnitude();
    let angle = coords.y.atan2(coords.x) + rotation + warping * (-dist).exp();
    vec2(angle.cos(), angle.sin()) * dist
}

fn whirled(coords: Vector2<f32>, params: &KernelParams, speed: f32, warp: f32) -> Vector2<f32> {
    let rotation = params.rotation_speed * params.progress * params.duration * speed;
    let warping = params.whirling * (6.0 + 1.5 * params.progress) * warp;
    whirl(coords, warping, rotation)
}

fn random_displace(coords: Vector2<f32>, scale: f32, seed: Vector2<f32>) -> Vector2<f32> {
    let base = coords * scale + seed;
    vec2(
        simplex2d(base) - 0.5,
        simplex2d(base + vec2(7.89, 123.0)) - 0.5,
    )
}

fn darken(color: Vector3<f32>, amount: f32) -> Vector3<f32> {
    color * (1.0 - amount)
}

fn lighten(color: Vector3<f32>, amount: f32) -> Vector3<f32> {
    color + (vec3(1.0, 1.0, 1.0) - color) * amount
}

fn mix3(a: Vector3<f32>, b: Vector3<f32>, t: f32) -> Vector3<f32> {
    a + (b - a) * t
}

fn mix(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

fn clamp4(color: Vector4<f32>) -> Vector4<f32> {
    vec4(
        color.x.clamp(0.0, 1.0),
        color.y.clamp(0.0, 1.0),
        color.z.clamp(0.0, 1.0),
        color.w.clamp(0.0, 1.0),
    )
}

/// Noise frequency normalization so larger windows do not get finer detail.
pub fn detail_scale(size: [f32; 2]) -> f32 {
    10000.0 / (size[0] + size[1]).max(1.0) * 0.5
}

/// Straight-alpha portal layer stack.
pub fn portal_color(uv: Vector2<f32>, params: &KernelParams) -> Vector4<f32> {
    let base = vec3(params.color[0], params.color[1], params.color[2]);
    let seed = vec2(params.seed[0], params.seed[1]);

    let mut coords = (uv - vec2(0.5, 0.5)) * 2.0 * 1.5;
    let scale = portal_scale(params.progress);
    coords /= (scale * 0.5 + 0.5).max(0.01);

    let dist = coords.magnitude();
    let wobble = coords
        * ((1.0 - dist) * (-dist).exp() * wobble_envelope(params.progress) * PORTAL_WOBBLE_STRENGTH);
    let detail = detail_scale(params.size);

    // Background disc.
    let mut layer_coords = whirled(coords - wobble, params, 0.25, 1.0);
    let displace = random_displace(layer_coords, 2.1, seed);
    layer_coords += displace * 0.1;
    let dist = layer_coords.magnitude();
    let alpha = if dist > 1.0 { 0.0 } else { 1.0 };
    let mut color = mix3(darken(base, 0.8), darken(base, 0.2), dist.powi(5)).extend(alpha);
    let rand_val = displace.dot(displace);

    // Slow band.
    let noise = simplex2d(layer_coords / detail + vec2(12.3, 56.4) + seed);
    let band_alpha = if noise > NOISE_THRESHOLD { alpha } else { 0.0 };
    color = alpha_over(color, darken(base, 0.3).extend(band_alpha));

    // Fast band.
    let mut layer_coords = whirled(coords - wobble * 1.5, params, 0.75, 0.5);
    let displace = random_displace(layer_coords, 12.2, seed);
    layer_coords += displace * 0.1;
    let noise = simplex2d(layer_coords / detail * 1.3 + seed);
    let band_alpha = if noise > NOISE_THRESHOLD { alpha } else { 0.0 };
    color = alpha_over(color, base.extend(band_alpha));

    color = clamp4(color);

    // Glowing rim.
    let edge = mix(1.0, 5.0, rand_val) * GLOW_EDGE_WIDTH * detail - 150.0 * (dist - 1.0).abs();
    color = alpha_over(color, base.extend(edge.clamp(0.0, 1.0)));

    // Sparkles, added on top.
    let layer_coords = whirled(coords - wobble * 1.8, params, 1.25, 0.0);
    let noise = simplex2d(layer_coords / detail * 3.0 + seed);
    let sparkle = (noise * rand_val + 0.9)
        .max(0.0)
        .powi(SPARKLE_EXPONENT)
        .clamp(0.0, 1.0);
    let glint = lighten(base, 0.8) * sparkle;
    color = vec4(color.x + glint.x, color.y + glint.y, color.z + glint.z, color.w);

    color.w *= scale.clamp(0.0, 1.0).powi(2);
    clamp4(color)
}

/// Straight-alpha sample of the window being pulled into the portal.
pub fn window_color(uv: Vector2<f32>, progress: f32, image: &dyn ImageSampler) -> Vector4<f32> {
    let pull = window_pull(progress);

    let mut coords = uv * 2.0 - vec2(1.0, 1.0);
    coords /= mix(1.0, WINDOW_SCALE, pull);
    coords.y /= mix(1.0, 1.0 - 0.2 * WINDOW_SQUISH, pull);
    coords.x /= mix(1.0, 1.0 - 0.1 * WINDOW_TILT * coords.y, pull);
    let coords = coords * 0.5 + vec2(0.5, 0.5);

    if !(0.0..=1.0).contains(&coords.x) || !(0.0..=1.0).contains(&coords.y) {
        return vec4(0.0, 0.0, 0.0, 0.0);
    }

    let sample = image.sample([coords.x, coords.y]);
    let fade = ((1.0 - pull) * 3.0).clamp(0.0, 1.0);
    vec4(sample.r, sample.g, sample.b, sample.a * fade)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    struct Solid(Rgba);

    impl ImageSampler for Solid {
        fn sample(&self, _uv: [f32; 2]) -> Rgba {
            self.0
        }
    }

    fn params(progress: f32) -> KernelParams {
        KernelParams {
            progress,
            duration: 0.5,
            size: [800.0, 600.0],
            seed: [12.5, 401.0],
            ..KernelParams::default()
        }
    }

    #[test]
    fn portal_is_invisible_at_both_ends() {
        for progress in [0.0, 1.0] {
            for uv in [[0.5, 0.5], [0.1, 0.9], [0.0, 0.0]] {
                let sample = shade(uv, &params(progress), None);
                assert!(sample.a.abs() < 1e-6, "alpha {} at {uv:?}", sample.a);
            }
        }
    }

    #[test]
    fn portal_centre_is_opaque_mid_animation() {
        let sample = shade([0.5, 0.5], &params(0.5), None);
        assert!(sample.a > 0.99, "centre alpha {}", sample.a);
    }

    #[test]
    fn portal_corner_is_transparent() {
        let p = KernelParams {
            size: [4000.0, 3000.0],
            ..params(0.5)
        };
        let sample = shade([0.0, 0.0], &p, None);
        assert!(sample.a < 1e-6, "corner alpha {}", sample.a);
    }

    #[test]
    fn output_is_premultiplied_and_bounded() {
        for step in 0..=10 {
            let p = params(step as f32 / 10.0);
            for y in 0..8 {
                for x in 0..8 {
                    let uv = [x as f32 / 7.0, y as f32 / 7.0];
                    let sample = shade(uv, &p, None);
                    for channel in [sample.r, sample.g, sample.b] {
                        assert!(channel.is_finite());
                        assert!(channel <= sample.a + 1e-5);
                    }
                    assert!((0.0..=1.0).contains(&sample.a));
                }
            }
        }
    }

    #[test]
    fn window_is_untouched_at_start() {
        let red = Solid(Rgba::new(1.0, 0.0, 0.0, 1.0));
        let sample = shade([0.2, 0.7], &params(0.0), Some(&red));
        assert!((sample.r - 1.0).abs() < 1e-5);
        assert!(sample.g.abs() < 1e-5);
        assert!((sample.a - 1.0).abs() < 1e-5);
    }

    #[test]
    fn window_shrinks_away_from_corners() {
        let red = Solid(Rgba::new(1.0, 0.0, 0.0, 1.0));
        let corner = window_color(vec2(0.02, 0.02), 0.3, &red);
        assert_eq!(corner.w, 0.0);
        let centre = window_color(vec2(0.5, 0.5), 0.3, &red);
        assert!(centre.w > 0.0);
    }

    #[test]
    fn window_has_faded_once_absorbed() {
        let red = Solid(Rgba::new(1.0, 0.0, 0.0, 1.0));
        let sample = window_color(vec2(0.5, 0.5), 0.5, &red);
        assert!(sample.w < 1e-5);
    }

    #[test]
    fn seed_decorrelates_patterns() {
        let a = params(0.5);
        let b = KernelParams {
            seed: [733.0, 91.25],
            ..a
        };
        let differs = (0..16).any(|y| {
            (0..16).any(|x| {
                let uv = [x as f32 / 15.0, y as f32 / 15.0];
                shade(uv, &a, None) != shade(uv, &b, None)
            })
        });
        assert!(differs);
        assert_eq!(shade([0.3, 0.4], &a, None), shade([0.3, 0.4], &a, None));
    }

    #[test]
    fn alpha_over_respects_coverage() {
        let background = vec4(0.0, 0.0, 1.0, 1.0);
        let opaque = alpha_over(background, vec4(1.0, 0.0, 0.0, 1.0));
        assert_eq!(opaque, vec4(1.0, 0.0, 0.0, 1.0));
        let clear = alpha_over(background, vec4(1.0, 0.0, 0.0, 0.0));
        assert_eq!(clear, background);
        let half = alpha_over(vec4(0.0, 0.0, 0.0, 0.0), vec4(0.0, 1.0, 0.0, 0.5));
        assert!((half.y - 1.0).abs() < 1e-6);
        assert!((half.w - 0.5).abs() < 1e-6);
    }

    #[test]
    fn detail_scale_is_resolution_invariant() {
        assert!((detail_scale([800.0, 600.0]) * 1400.0 - 5000.0).abs() < 1e-2);
        assert!(detail_scale([400.0, 300.0]) > detail_scale([800.0, 600.0]));
    }

    proptest! {
        #[test]
        fn samples_are_premultiplied_everywhere(
            u in 0.0f32..=1.0,
            v in 0.0f32..=1.0,
            progress in 0.0f32..=1.0,
            seed_x in 0.0f32..1000.0,
            seed_y in 0.0f32..1000.0,
        ) {
            let p = KernelParams {
                progress,
                seed: [seed_x, seed_y],
                size: [640.0, 480.0],
                ..KernelParams::default()
            };
            let sample = shade([u, v], &p, None);
            prop_assert!((0.0..=1.0).contains(&sample.a));
            prop_assert!(sample.r <= sample.a + 1e-5);
            prop_assert!(sample.g <= sample.a + 1e-5);
            prop_assert!(sample.b <= sample.a + 1e-5);
        }
    }
}
