//! Region of interest: where the instrument digits sit in the camera frame.

use serde::{Deserialize, Serialize};

/// Smallest width or height an ROI can shrink to.
pub const MIN_ROI_SIZE: i32 = 10;

/// Pixel step used by the ROI buttons and keyboard shortcuts.
pub const ROI_STEP: i32 = 5;

/// Which edge or dimension of the ROI an adjustment applies to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoiAxis {
    X,
    Y,
    Width,
    Height,
}

/// A rectangle in absolute frame pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Default for Roi {
    fn default() -> Self {
        Self {
            x: 150,
            y: 240,
            width: 200,
            height: 120,
        }
    }
}

impl Roi {
    /// Creates an ROI, clamping width and height to `MIN_ROI_SIZE`.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        let mut roi = Self { x, y, width, height };
        roi.clamp_size();
        roi
    }

    /// Applies `delta` to one axis, then re-clamps the size.
    pub fn adjust(&mut self, axis: RoiAxis, delta: i32) {
        match axis {
            RoiAxis::X => self.x = self.x.saturating_add(delta),
            RoiAxis::Y => self.y = self.y.saturating_add(delta),
            RoiAxis::Width => self.width = self.width.saturating_add(delta),
            RoiAxis::Height => self.height = self.height.saturating_add(delta),
        }
        self.clamp_size();
    }

    fn clamp_size(&mut self) {
        self.width = self.width.max(MIN_ROI_SIZE);
        self.height = self.height.max(MIN_ROI_SIZE);
    }

    /// Intersects the ROI with a `frame_w` x `frame_h` frame.
    ///
    /// Returns `(x, y, width, height)` in frame pixels, or `None` when the
    /// ROI is degenerate or lies entirely outside the frame.
    pub fn clip_to(&self, frame_w: u32, frame_h: u32) -> Option<(u32, u32, u32, u32)> {
        if self.width <= 0 || self.height <= 0 {
            return None;
        }

        let x0 = i64::from(self.x).max(0);
        let y0 = i64::from(self.y).max(0);
        let x1 = (i64::from(self.x) + i64::from(self.width)).min(i64::from(frame_w));
        let y1 = (i64::from(self.y) + i64::from(self.height)).min(i64::from(frame_h));

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some((x0 as u32, y0 as u32, (x1 - x0) as u32, (y1 - y0) as u32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adjust_moves_position() {
        let mut roi = Roi::new(100, 100, 50, 50);
        roi.adjust(RoiAxis::X, -5);
        roi.adjust(RoiAxis::Y, 5);
        assert_eq!((roi.x, roi.y), (95, 105));
    }

    #[test]
    fn test_adjust_clamps_size() {
        let mut roi = Roi::new(0, 0, 20, 20);
        roi.adjust(RoiAxis::Width, -100);
        roi.adjust(RoiAxis::Height, -15);
        assert_eq!(roi.width, MIN_ROI_SIZE);
        assert_eq!(roi.height, MIN_ROI_SIZE);
    }

    #[test]
    fn test_new_clamps_degenerate_size() {
        let roi = Roi::new(0, 0, 0, -4);
        assert_eq!((roi.width, roi.height), (MIN_ROI_SIZE, MIN_ROI_SIZE));
    }

    #[test]
    fn test_clip_inside() {
        let roi = Roi::new(10, 20, 30, 40);
        assert_eq!(roi.clip_to(100, 100), Some((10, 20, 30, 40)));
    }

    #[test]
    fn test_clip_partially_outside() {
        let roi = Roi::new(-5, 90, 20, 20);
        assert_eq!(roi.clip_to(100, 100), Some((0, 90, 15, 10)));
    }

    #[test]
    fn test_clip_fully_outside() {
        let roi = Roi::new(200, 200, 20, 20);
        assert_eq!(roi.clip_to(100, 100), None);
    }

    #[test]
    fn test_clip_rejects_non_positive_size() {
        // Only reachable by building the struct directly
        let roi = Roi { x: 0, y: 0, width: 0, height: 10 };
        assert_eq!(roi.clip_to(100, 100), None);
    }
}
