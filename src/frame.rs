//! Frame container and pixel-space helpers.
//!
//! Frames are stored in BGR24, the native order of the capture backends.
//! The perception adapter converts to RGB once per frame for the model
//! families that require it; everything downstream works on typed results,
//! not pixels. Overlay primitives mutate the frame in place and exist for
//! diagnostics and snapshot annotation only; they never feed back into
//! detection.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// BGR color triple for overlay drawing.
pub type Color = (u8, u8, u8);

pub const ALERT_RED: Color = (0, 0, 255);
pub const BANNER_WHITE: Color = (255, 255, 255);

/// Axis-aligned pixel-space box, corner coordinates.
///
/// Coordinates may extend past the frame edge; all consumers clamp.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.x1 + self.x2) as f32 / 2.0,
            (self.y1 + self.y2) as f32 / 2.0,
        )
    }

    pub fn center_distance(&self, other: &BoundingBox) -> f32 {
        let (ax, ay) = self.center();
        let (bx, by) = other.center();
        ((ax - bx).powi(2) + (ay - by).powi(2)).sqrt()
    }

    /// Clamp to frame bounds. Returns `None` when nothing remains.
    pub fn clamped(&self, width: u32, height: u32) -> Option<BoundingBox> {
        let x1 = self.x1.max(0);
        let y1 = self.y1.max(0);
        let x2 = self.x2.min(width as i32);
        let y2 = self.y2.min(height as i32);
        if x1 >= x2 || y1 >= y2 {
            return None;
        }
        Some(BoundingBox { x1, y1, x2, y2 })
    }
}

/// One sampled image plus capture metadata.
///
/// Owned by the stream driver for the duration of one iteration.
pub struct Frame {
    /// BGR24 pixel data, row-major, no padding.
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonically increasing per-session sequence number.
    pub seq: u64,
    /// Capture time, seconds since the Unix epoch.
    pub captured_at_s: u64,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, seq: u64, captured_at_s: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} BGR bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            seq,
            captured_at_s,
        })
    }

    pub fn bgr(&self) -> &[u8] {
        &self.data
    }

    /// One RGB copy per frame for the landmark/object model families.
    pub fn to_rgb(&self) -> Vec<u8> {
        let mut rgb = self.data.clone();
        for pixel in rgb.chunks_exact_mut(3) {
            pixel.swap(0, 2);
        }
        rgb
    }

    /// Extract a BGR crop, clamped to the frame. `None` when the box has no
    /// overlap with the frame (invalid face boxes are skipped, not errors).
    pub fn crop_bgr(&self, bbox: &BoundingBox) -> Option<(Vec<u8>, u32, u32)> {
        let clamped = bbox.clamped(self.width, self.height)?;
        let crop_w = (clamped.x2 - clamped.x1) as usize;
        let crop_h = (clamped.y2 - clamped.y1) as usize;
        let mut crop = Vec::with_capacity(crop_w * crop_h * 3);
        for row in clamped.y1..clamped.y2 {
            let start = (row as usize * self.width as usize + clamped.x1 as usize) * 3;
            let end = start + crop_w * 3;
            crop.extend_from_slice(&self.data[start..end]);
        }
        Some((crop, crop_w as u32, crop_h as u32))
    }

    // ---------------- overlay primitives ----------------

    /// Hollow rectangle, 2px stroke.
    pub fn draw_box(&mut self, bbox: &BoundingBox, color: Color) {
        let Some(clamped) = bbox.clamped(self.width, self.height) else {
            return;
        };
        for row in clamped.y1..clamped.y2 {
            for col in clamped.x1..clamped.x2 {
                let on_edge = row - clamped.y1 < 2
                    || clamped.y2 - row <= 2
                    || col - clamped.x1 < 2
                    || clamped.x2 - col <= 2;
                if on_edge {
                    self.put_pixel(col as u32, row as u32, color);
                }
            }
        }
    }

    /// Solid banner strip across the top of the frame.
    pub fn fill_banner(&mut self, rows: u32, color: Color) {
        let rows = rows.min(self.height);
        for row in 0..rows {
            for col in 0..self.width {
                self.put_pixel(col, row, color);
            }
        }
    }

    fn put_pixel(&mut self, x: u32, y: u32, color: Color) {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        self.data[idx] = color.0;
        self.data[idx + 1] = color.1;
        self.data[idx + 2] = color.2;
    }
}
