use bytemuck::{Pod, Zeroable};

/// Axis-aligned rectangle in pixels. Origin is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// True when both dimensions are finite and strictly positive.
    pub fn has_area(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }

    pub fn translated(&self, dx: f32, dy: f32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            ..*self
        }
    }

    /// Scales the rectangle about its centre.
    pub fn scaled_about_center(&self, scale: f32) -> Self {
        let center_x = self.x + self.width / 2.0;
        let center_y = self.y + self.height / 2.0;
        let width = self.width * scale;
        let height = self.height * scale;
        Self {
            x: center_x - width / 2.0,
            y: center_y - height / 2.0,
            width,
            height,
        }
    }
}

/// Straight (non-premultiplied) RGBA color.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rgba {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba {
        r: 0.0,
        g: 0.0,
        b: 0.0,
        a: 0.0,
    };

    pub fn new(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn from_rgb(rgb: [f32; 3], a: f32) -> Self {
        Self::new(rgb[0], rgb[1], rgb[2], a)
    }

    pub fn to_array(self) -> [f32; 4] {
        [self.r, self.g, self.b, self.a]
    }
}

/// Per-draw inputs of the portal effect, shared by the CPU kernel and the GPU program.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KernelParams {
    /// Normalized animation time in `[0, 1]`.
    pub progress: f32,
    /// Animation duration in seconds.
    pub duration: f32,
    /// Surface size in pixels, used to keep noise frequency resolution-invariant.
    pub size: [f32; 2],
    pub seed: [f32; 2],
    pub color: [f32; 3],
    pub rotation_speed: f32,
    pub whirling: f32,
}

impl Default for KernelParams {
    fn default() -> Self {
        Self {
            progress: 0.0,
            duration: 0.5,
            size: [1.0, 1.0],
            seed: [0.0, 0.0],
            color: [0.616, 0.306, 0.867],
            rotation_speed: 2.0,
            whirling: 1.0,
        }
    }
}

/// Interleaved position + texture coordinate vertex of the effect quad.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub tex_coord: [f32; 2],
}

/// Unit quad laid out as a triangle strip: top-left, top-right, bottom-left, bottom-right.
pub const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex {
        position: [0.0, 0.0],
        tex_coord: [0.0, 0.0],
    },
    QuadVertex {
        position: [1.0, 0.0],
        tex_coord: [1.0, 0.0],
    },
    QuadVertex {
        position: [0.0, 1.0],
        tex_coord: [0.0, 1.0],
    },
    QuadVertex {
        position: [1.0, 1.0],
        tex_coord: [1.0, 1.0],
    },
];

/// Reads colors out of a captured window appearance.
pub trait ImageSampler {
    /// Samples the image at `uv` in `[0, 1]²` (top-left origin), returning straight RGBA.
    fn sample(&self, uv: [f32; 2]) -> Rgba;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_scales_about_center() {
        let rect = Rect::new(10.0, 20.0, 100.0, 50.0);
        let half = rect.scaled_about_center(0.5);
        assert_eq!(half, Rect::new(35.0, 32.5, 50.0, 25.0));
        assert!(!rect.scaled_about_center(0.0).has_area());
    }

    #[test]
    fn rect_area_rejects_degenerate_sizes() {
        assert!(Rect::new(0.0, 0.0, 1.0, 1.0).has_area());
        assert!(!Rect::new(0.0, 0.0, 0.0, 1.0).has_area());
        assert!(!Rect::new(0.0, 0.0, f32::NAN, 1.0).has_area());
        assert!(!Rect::new(0.0, 0.0, 4.0, -2.0).has_area());
    }

    #[test]
    fn quad_is_a_unit_strip() {
        for vertex in QUAD_VERTICES {
            assert_eq!(vertex.position, vertex.tex_coord);
        }
        assert_eq!(std::mem::size_of::<QuadVertex>(), 16);
    }
}
