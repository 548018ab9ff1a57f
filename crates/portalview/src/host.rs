use std::collections::HashMap;
use std::marker::PhantomData;

use animator::{HostServices, Monitor, WindowId};
use image::RgbaImage;
use renderer::software::{blend_premultiplied, covered_pixels};
use renderer::{Rect, Rgba};

/// A pretend compositor with one monitor and a handful of windows.
///
/// Flat fills are queued and painted onto the read-back frame, so the same
/// host serves both the CPU and the GPU target.
pub struct PreviewHost<I, T> {
    windows: HashMap<WindowId, Rect>,
    snapshots: HashMap<WindowId, I>,
    fills: Vec<(Rect, Rgba)>,
    damaged_regions: usize,
    damaged_monitors: usize,
    _target: PhantomData<fn(&mut T)>,
}

impl<I, T> Default for PreviewHost<I, T> {
    fn default() -> Self {
        Self {
            windows: HashMap::new(),
            snapshots: HashMap::new(),
            fills: Vec::new(),
            damaged_regions: 0,
            damaged_monitors: 0,
            _target: PhantomData,
        }
    }
}

impl<I, T> PreviewHost<I, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps a window. With `snapshot` the window also has a cached appearance.
    pub fn map_window(&mut self, window: WindowId, geometry: Rect, snapshot: Option<I>) {
        self.windows.insert(window, geometry);
        if let Some(image) = snapshot {
            self.snapshots.insert(window, image);
        }
    }

    pub fn take_fills(&mut self) -> Vec<(Rect, Rgba)> {
        std::mem::take(&mut self.fills)
    }

    pub fn damaged_regions(&self) -> usize {
        self.damaged_regions
    }

    pub fn damaged_monitors(&self) -> usize {
        self.damaged_monitors
    }
}

impl<I: Clone, T> HostServices for PreviewHost<I, T> {
    type Image = I;
    type Target = T;

    fn window_geometry(&self, window: WindowId) -> Option<Rect> {
        self.windows.get(&window).copied()
    }

    fn cached_snapshot(&self, window: WindowId) -> Option<I> {
        self.snapshots.get(&window).cloned()
    }

    fn request_snapshot(&mut self, window: WindowId) {
        tracing::debug!(window = %window, "preview host has no live surfaces to capture");
    }

    fn damage_region(&mut self, _region: Rect) {
        self.damaged_regions += 1;
    }

    fn damage_monitor(&mut self, _monitor: &Monitor) {
        self.damaged_monitors += 1;
    }

    fn fill_rect(&mut self, _target: &mut T, rect: Rect, color: Rgba) {
        self.fills.push((rect, color));
    }
}

/// Paints straight-alpha flat fills onto a finished frame.
pub fn paint_fills(frame: &mut RgbaImage, fills: &[(Rect, Rgba)]) {
    let (width, height) = frame.dimensions();
    for &(rect, color) in fills {
        let Some((x0, y0, x1, y1)) = covered_pixels(rect, width, height) else {
            continue;
        };
        let premultiplied = Rgba::new(
            color.r * color.a,
            color.g * color.a,
            color.b * color.a,
            color.a,
        );
        for y in y0..y1 {
            for x in x0..x1 {
                blend_premultiplied(frame.get_pixel_mut(x, y), premultiplied);
            }
        }
    }
}

/// Stand-in window appearance: a title bar over a diagonal gradient.
pub fn synthetic_snapshot(width: u32, height: u32) -> RgbaImage {
    let title_bar = (height / 10).max(1);
    RgbaImage::from_fn(width.max(1), height.max(1), |x, y| {
        if y < title_bar {
            return image::Rgba([40, 42, 54, 255]);
        }
        let u = x as f32 / width.max(1) as f32;
        let v = y as f32 / height.max(1) as f32;
        image::Rgba([
            (60.0 + 150.0 * u) as u8,
            (90.0 + 120.0 * v) as u8,
            (200.0 - 80.0 * u) as u8,
            255,
        ])
    })
}
