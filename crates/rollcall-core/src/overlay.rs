//! Detection overlay: bounding boxes drawn into a transparent RGBA canvas
//! that sits on top of the live video.
//!
//! All drawing happens in the canvas's backing pixel space. Detection boxes
//! arrive in the capture device's native pixel space and are scaled by
//! `backing / native`, never by any on-screen display size.

use crate::types::{BoundingBox, DetectionResult};
use image::{ImageError, Rgba, RgbaImage};
use std::path::Path;

const STROKE_WIDTH: u32 = 2;
const ACCENT: Rgba<u8> = Rgba([0x4f, 0xd1, 0xc5, 0xff]);
const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// How the backing buffer is sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackingSize {
    /// Resize to the source's native resolution on every render.
    FollowSource,
    Fixed { width: u32, height: u32 },
}

pub struct OverlayRenderer {
    canvas: RgbaImage,
    backing: BackingSize,
    stroke: Rgba<u8>,
    stroke_width: u32,
}

impl OverlayRenderer {
    pub fn new(backing: BackingSize) -> Self {
        let canvas = match backing {
            BackingSize::FollowSource => RgbaImage::new(0, 0),
            BackingSize::Fixed { width, height } => RgbaImage::new(width, height),
        };
        Self {
            canvas,
            backing,
            stroke: ACCENT,
            stroke_width: STROKE_WIDTH,
        }
    }

    pub fn canvas(&self) -> &RgbaImage {
        &self.canvas
    }

    /// Clear the previous overlay and draw `result`'s boxes.
    ///
    /// Returns whether any face is present.
    pub fn render(&mut self, result: &DetectionResult, native: (u32, u32)) -> bool {
        if let BackingSize::FollowSource = self.backing {
            if self.canvas.dimensions() != native {
                self.canvas = RgbaImage::new(native.0, native.1);
            }
        }
        self.clear();

        let (cw, ch) = self.canvas.dimensions();
        if native.0 == 0 || native.1 == 0 || cw == 0 || ch == 0 {
            return result.face_present();
        }
        let sx = cw as f32 / native.0 as f32;
        let sy = ch as f32 / native.1 as f32;

        for face in &result.faces {
            let b = face.scaled(sx, sy);
            if !b.is_drawable() {
                tracing::debug!(?face, "skipping undrawable box");
                continue;
            }
            self.stroke_rect(&b);
        }

        tracing::trace!(faces = result.faces.len(), sx, sy, "overlay rendered");
        result.face_present()
    }

    /// Wipe every pixel back to transparent.
    pub fn clear(&mut self) {
        for px in self.canvas.pixels_mut() {
            *px = TRANSPARENT;
        }
    }

    pub fn save_png(&self, path: &Path) -> Result<(), ImageError> {
        self.canvas.save_with_format(path, image::ImageFormat::Png)
    }

    /// Stroke an axis-aligned rectangle, clipped to the canvas.
    ///
    /// Edges are pinned just outside the canvas before conversion, so work is
    /// bounded by the canvas size however far the box reaches.
    fn stroke_rect(&mut self, b: &BoundingBox) {
        let (cw, ch) = self.canvas.dimensions();
        let t = self.stroke_width as i64;
        let pin = |v: f32, limit: u32| -> i64 {
            let lo = -(t as f32) - 1.0;
            let hi = (limit as i64 + t + 1) as f32;
            v.round().clamp(lo, hi) as i64
        };
        let x0 = pin(b.x, cw);
        let y0 = pin(b.y, ch);
        let x1 = pin(b.x + b.width, cw) - 1;
        let y1 = pin(b.y + b.height, ch) - 1;
        if x1 < x0 || y1 < y0 {
            return;
        }

        for py in y0.max(0)..=y1.min(ch as i64 - 1) {
            let on_edge_row = py < y0 + t || py > y1 - t;
            for px in x0.max(0)..=x1.min(cw as i64 - 1) {
                if on_edge_row || px < x0 + t || px > x1 - t {
                    self.canvas.put_pixel(px as u32, py as u32, self.stroke);
                }
            }
        }
    }
}
