//! 2D simplex gradient noise, bit-compatible with the shader's `simplex2d`.

use cgmath::{vec2, InnerSpace, Vector2};

const SKEW: [f32; 4] = [
    0.211_324_87,  // (3 - sqrt(3)) / 6
    0.366_025_4,   // (sqrt(3) - 1) / 2
    -0.577_350_26, // -1 + 2 * SKEW[0]
    0.024_390_243, // 1 / 41
];

/// GLSL-style `fract`, which floors rather than truncates.
pub(crate) fn fract(x: f32) -> f32 {
    x - x.floor()
}

fn mod289(x: f32) -> f32 {
    x - (x * (1.0 / 289.0)).floor() * 289.0
}

fn permute(x: f32) -> f32 {
    mod289((x * 34.0 + 1.0) * x)
}

/// Samples simplex noise at `v`. The result lies roughly in `[-1, 1]`.
pub fn simplex2d(v: Vector2<f32>) -> f32 {
    let skew = (v.x + v.y) * SKEW[1];
    let cell = vec2((v.x + skew).floor(), (v.y + skew).floor());
    let unskew = (cell.x + cell.y) * SKEW[0];
    let x0 = vec2(v.x - cell.x + unskew, v.y - cell.y + unskew);

    let step = if x0.x > x0.y {
        vec2(1.0, 0.0)
    } else {
        vec2(0.0, 1.0)
    };
    let x1 = vec2(x0.x + SKEW[0] - step.x, x0.y + SKEW[0] - step.y);
    let x2 = vec2(x0.x + SKEW[2], x0.y + SKEW[2]);

    let cell = vec2(mod289(cell.x), mod289(cell.y));
    let hashes = [
        permute(permute(cell.y) + cell.x),
        permute(permute(cell.y + step.y) + cell.x + step.x),
        permute(permute(cell.y + 1.0) + cell.x + 1.0),
    ];

    let mut total = 0.0;
    for (hash, offset) in hashes.into_iter().zip([x0, x1, x2]) {
        let mut falloff = (0.5 - offset.dot(offset)).max(0.0);
        falloff *= falloff;
        falloff *= falloff;

        let gx = 2.0 * fract(hash * SKEW[3]) - 1.0;
        let h = gx.abs() - 0.5;
        let a0 = gx - (gx + 0.5).floor();
        falloff *= 1.792_842_9 - 0.853_734_7 * (a0 * a0 + h * h);

        total += falloff * (a0 * offset.x + h * offset.y);
    }
    130.0 * total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noise_is_deterministic() {
        let point = vec2(3.25, -7.5);
        assert_eq!(simplex2d(point), simplex2d(point));
    }

    #[test]
    fn noise_is_zero_on_lattice_origin() {
        assert!(simplex2d(vec2(0.0, 0.0)).abs() < 1e-6);
    }

    #[test]
    fn noise_stays_bounded_and_varies() {
        let mut min = f32::MAX;
        let mut max = f32::MIN;
        for y in 0..64 {
            for x in 0..64 {
                let value = simplex2d(vec2(x as f32 * 0.173, y as f32 * 0.219));
                assert!(value.is_finite());
                assert!(value.abs() <= 1.1, "noise {value} out of range");
                min = min.min(value);
                max = max.max(value);
            }
        }
        assert!(max - min > 0.5);
    }

    #[test]
    fn fract_floors_negative_values() {
        assert!((fract(-0.25) - 0.75).abs() < 1e-6);
        assert!((fract(2.5) - 0.5).abs() < 1e-6);
    }
}
