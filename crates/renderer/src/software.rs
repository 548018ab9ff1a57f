//! CPU rasterizer that runs the effect kernel per pixel.
//!
//! Slow, but needs no adapter: the preview tool uses it by default and the
//! tests use it to check what a frame looks like.

use std::sync::Arc;

use image::RgbaImage;

use crate::kernel;
use crate::resources::{GpuBackend, GpuError, QuadDraw};
use crate::shader::{validate_program, ParameterSlots};
use crate::types::{ImageSampler, QuadVertex, Rect, Rgba};

/// Shared, immutable window snapshot with bilinear sampling.
#[derive(Debug, Clone)]
pub struct SnapshotImage(Arc<RgbaImage>);

impl SnapshotImage {
    pub fn new(image: RgbaImage) -> Self {
        Self(Arc::new(image))
    }

    pub fn image(&self) -> &RgbaImage {
        &self.0
    }

    fn texel(&self, x: i64, y: i64) -> Rgba {
        let (width, height) = self.0.dimensions();
        let x = x.clamp(0, i64::from(width) - 1) as u32;
        let y = y.clamp(0, i64::from(height) - 1) as u32;
        let [r, g, b, a] = self.0.get_pixel(x, y).0;
        Rgba::new(
            f32::from(r) / 255.0,
            f32::from(g) / 255.0,
            f32::from(b) / 255.0,
            f32::from(a) / 255.0,
        )
    }
}

impl ImageSampler for SnapshotImage {
    fn sample(&self, uv: [f32; 2]) -> Rgba {
        let (width, height) = self.0.dimensions();
        if width == 0 || height == 0 {
            return Rgba::TRANSPARENT;
        }
        let x = uv[0] * width as f32 - 0.5;
        let y = uv[1] * height as f32 - 0.5;
        let (x0, y0) = (x.floor(), y.floor());
        let (fx, fy) = (x - x0, y - y0);
        let (x0, y0) = (x0 as i64, y0 as i64);

        let top = lerp(self.texel(x0, y0), self.texel(x0 + 1, y0), fx);
        let bottom = lerp(self.texel(x0, y0 + 1), self.texel(x0 + 1, y0 + 1), fx);
        lerp(top, bottom, fy)
    }
}

fn lerp(a: Rgba, b: Rgba, t: f32) -> Rgba {
    Rgba::new(
        a.r + (b.r - a.r) * t,
        a.g + (b.g - a.g) * t,
        a.b + (b.b - a.b) * t,
        a.a + (b.a - a.a) * t,
    )
}

/// Source-over blend of a premultiplied colour onto one pixel.
pub fn blend_premultiplied(pixel: &mut image::Rgba<u8>, src: Rgba) {
    let inverse = 1.0 - src.a.clamp(0.0, 1.0);
    let src = [src.r, src.g, src.b, src.a];
    for (channel, value) in pixel.0.iter_mut().zip(src) {
        let dst = f32::from(*channel) / 255.0;
        let out = (value + dst * inverse).clamp(0.0, 1.0);
        *channel = (out * 255.0).round() as u8;
    }
}

/// Pixel range covered by `rect`, clipped to the target.
pub fn covered_pixels(rect: Rect, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
    if !rect.has_area() {
        return None;
    }
    let x0 = rect.x.max(0.0).floor();
    let y0 = rect.y.max(0.0).floor();
    let x1 = (rect.x + rect.width).min(width as f32).ceil();
    let y1 = (rect.y + rect.height).min(height as f32).ceil();
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    Some((x0 as u32, y0 as u32, x1 as u32, y1 as u32))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoftwareProgram;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SoftwareQuad {
    uv_origin: [f32; 2],
    uv_extent: [f32; 2],
}

#[derive(Debug, Default)]
pub struct SoftwareBackend {
    pixels_shaded: u64,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kernel evaluations since creation.
    pub fn pixels_shaded(&self) -> u64 {
        self.pixels_shaded
    }
}

impl GpuBackend for SoftwareBackend {
    type Program = SoftwareProgram;
    type Quad = SoftwareQuad;
    type Image = SnapshotImage;
    type Target = RgbaImage;

    fn compile(&mut self, source: &str) -> Result<SoftwareProgram, GpuError> {
        validate_program(source).map_err(|err| GpuError::Compile(err.to_string()))?;
        Ok(SoftwareProgram)
    }

    fn bind_parameters(
        &mut self,
        _program: &mut SoftwareProgram,
        _slots: &ParameterSlots,
    ) -> Result<(), GpuError> {
        Ok(())
    }

    fn create_quad(&mut self, vertices: &[QuadVertex]) -> Result<SoftwareQuad, GpuError> {
        let (first, last) = match vertices {
            [first, .., last] => (first, last),
            _ => {
                return Err(GpuError::Buffer(format!(
                    "quad needs 4 vertices, got {}",
                    vertices.len()
                )))
            }
        };
        Ok(SoftwareQuad {
            uv_origin: first.tex_coord,
            uv_extent: [
                last.tex_coord[0] - first.tex_coord[0],
                last.tex_coord[1] - first.tex_coord[1],
            ],
        })
    }

    fn draw(
        &mut self,
        target: &mut RgbaImage,
        _program: &SoftwareProgram,
        quad: &SoftwareQuad,
        draw: &QuadDraw<'_, SnapshotImage>,
    ) -> Result<(), GpuError> {
        let (width, height) = target.dimensions();
        let Some((x0, y0, x1, y1)) = covered_pixels(draw.rect, width, height) else {
            return Ok(());
        };
        let rect = draw.rect;
        for y in y0..y1 {
            for x in x0..x1 {
                let local = [
                    (x as f32 + 0.5 - rect.x) / rect.width,
                    (y as f32 + 0.5 - rect.y) / rect.height,
                ];
                if !(0.0..=1.0).contains(&local[0]) || !(0.0..=1.0).contains(&local[1]) {
                    continue;
                }
                let uv = [
                    quad.uv_origin[0] + quad.uv_extent[0] * local[0],
                    quad.uv_origin[1] + quad.uv_extent[1] * local[1],
                ];
                let color = kernel::shade(uv, &draw.params, Some(draw.image));
                blend_premultiplied(target.get_pixel_mut(x, y), color);
                self.pixels_shaded += 1;
            }
        }
        Ok(())
    }

    fn release_program(&mut self, _program: SoftwareProgram) {}

    fn release_quad(&mut self, _quad: SoftwareQuad) {}
}

#[cfg(test)]
mod tests {
    use image::Rgba as Pixel;

    use super::*;
    use crate::resources::EffectResources;
    use crate::types::KernelParams;

    fn red_snapshot() -> SnapshotImage {
        SnapshotImage::new(RgbaImage::from_pixel(4, 4, Pixel([255, 0, 0, 255])))
    }

    #[test]
    fn bilinear_sampling_clamps_to_edges() {
        let mut image = RgbaImage::from_pixel(2, 1, Pixel([0, 0, 0, 255]));
        image.put_pixel(1, 0, Pixel([255, 255, 255, 255]));
        let snapshot = SnapshotImage::new(image);
        assert_eq!(snapshot.sample([0.0, 0.5]).r, 0.0);
        assert_eq!(snapshot.sample([1.0, 0.5]).r, 1.0);
        let middle = snapshot.sample([0.5, 0.5]).r;
        assert!((middle - 0.5).abs() < 1e-6);
    }

    #[test]
    fn blending_respects_coverage() {
        let mut pixel = Pixel([0, 0, 255, 255]);
        blend_premultiplied(&mut pixel, Rgba::new(0.5, 0.0, 0.0, 0.5));
        assert_eq!(pixel.0, [128, 0, 128, 255]);
        let mut pixel = Pixel([10, 20, 30, 255]);
        blend_premultiplied(&mut pixel, Rgba::TRANSPARENT);
        assert_eq!(pixel.0, [10, 20, 30, 255]);
    }

    #[test]
    fn covered_pixels_clip_to_target() {
        assert_eq!(
            covered_pixels(Rect::new(-5.0, 2.0, 10.0, 4.0), 8, 8),
            Some((0, 2, 5, 6))
        );
        assert_eq!(covered_pixels(Rect::new(20.0, 0.0, 4.0, 4.0), 8, 8), None);
        assert_eq!(covered_pixels(Rect::new(0.0, 0.0, 0.0, 4.0), 8, 8), None);
    }

    #[test]
    fn draws_window_untouched_at_start() {
        let mut resources = EffectResources::new(SoftwareBackend::new());
        resources.ensure_initialized().unwrap();
        let mut target = RgbaImage::from_pixel(16, 16, Pixel([0, 0, 0, 255]));
        let snapshot = red_snapshot();
        resources
            .draw(
                &mut target,
                &QuadDraw {
                    rect: Rect::new(4.0, 4.0, 8.0, 8.0),
                    params: KernelParams {
                        size: [8.0, 8.0],
                        ..KernelParams::default()
                    },
                    image: &snapshot,
                },
            )
            .unwrap();
        assert_eq!(target.get_pixel(8, 8).0, [255, 0, 0, 255]);
        assert_eq!(target.get_pixel(1, 1).0, [0, 0, 0, 255]);
        assert_eq!(resources.backend().pixels_shaded(), 64);
    }

    #[test]
    fn nothing_is_left_at_completion() {
        let mut resources = EffectResources::new(SoftwareBackend::new());
        resources.ensure_initialized().unwrap();
        let mut target = RgbaImage::from_pixel(16, 16, Pixel([0, 0, 0, 255]));
        let snapshot = red_snapshot();
        resources
            .draw(
                &mut target,
                &QuadDraw {
                    rect: Rect::new(0.0, 0.0, 16.0, 16.0),
                    params: KernelParams {
                        progress: 1.0,
                        size: [16.0, 16.0],
                        ..KernelParams::default()
                    },
                    image: &snapshot,
                },
            )
            .unwrap();
        assert!(target.pixels().all(|pixel| pixel.0 == [0, 0, 0, 255]));
    }

    #[test]
    fn invalid_program_is_a_compile_error() {
        let mut resources = EffectResources::with_source(SoftwareBackend::new(), "fn broken( {");
        assert!(matches!(
            resources.ensure_initialized(),
            Err(GpuError::Compile(_))
        ));
    }
}
