use image::{GrayImage, Luma, RgbImage};
use serde::{Deserialize, Serialize};

use super::roi::Roi;

/// Fixed threshold used until the operator picks another.
pub const DEFAULT_THRESHOLD: u8 = 150;

/// How the binarization threshold is chosen for each frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ThresholdPolicy {
    /// Operator-supplied threshold (0-255).
    Fixed { value: u8 },
    /// Recomputed per crop with Otsu's method.
    Otsu,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self::Fixed {
            value: DEFAULT_THRESHOLD,
        }
    }
}

/// The two images produced for one frame, plus the threshold that was applied.
#[derive(Clone, Debug)]
pub struct Preprocessed {
    /// Greyscale ROI crop (debug preview)
    pub gray: GrayImage,
    /// Binarized crop: digit ink black (0), background white (255)
    pub binary: GrayImage,
    /// Threshold actually used (the computed one under `Otsu`)
    pub threshold: u8,
}

/// Crops the ROI from `frame`, converts to greyscale and binarizes it.
///
/// Returns `None` when no reading is possible: the ROI has a non-positive
/// size or does not overlap the frame. An ROI hanging off the frame edge is
/// clipped to the visible part.
pub fn preprocess(frame: &RgbImage, roi: &Roi, policy: ThresholdPolicy) -> Option<Preprocessed> {
    let (w, h) = frame.dimensions();
    let (x, y, cw, ch) = roi.clip_to(w, h)?;

    let crop = image::imageops::crop_imm(frame, x, y, cw, ch).to_image();
    let gray = image::imageops::grayscale(&crop);

    let threshold = match policy {
        ThresholdPolicy::Fixed { value } => value,
        ThresholdPolicy::Otsu => otsu_threshold(&gray),
    };
    let binary = binarize(&gray, threshold);

    Some(Preprocessed {
        gray,
        binary,
        threshold,
    })
}

/// Pixels at or below `threshold` become black (ink), the rest white.
///
/// The instrument shows dark segments on a light panel, so the darker
/// class is the foreground.
pub fn binarize(gray: &GrayImage, threshold: u8) -> GrayImage {
    let (width, height) = gray.dimensions();
    let mut output = GrayImage::new(width, height);

    for (x, y, pixel) in gray.enumerate_pixels() {
        let value = if pixel[0] <= threshold { 0u8 } else { 255u8 };
        output.put_pixel(x, y, Luma([value]));
    }

    output
}

/// Otsu's method: picks the threshold `t` that maximizes the between-class
/// variance of the two classes `[0, t]` and `(t, 255]`, which is the same as
/// minimizing the weighted intra-class variance.
///
/// A uniform image has no separating threshold; its single intensity is
/// returned so everything falls in one class.
pub fn otsu_threshold(gray: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for pixel in gray.pixels() {
        histogram[pixel[0] as usize] += 1;
    }

    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 0;
    }

    let sum_all: f64 = histogram
        .iter()
        .enumerate()
        .map(|(value, &count)| value as f64 * count as f64)
        .sum();

    let mut weight_bg = 0u64;
    let mut sum_bg = 0.0f64;
    let mut best_threshold = 0u8;
    let mut best_variance = -1.0f64;

    for t in 0..256usize {
        weight_bg += histogram[t];
        if weight_bg == 0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0 {
            break;
        }

        sum_bg += t as f64 * histogram[t] as f64;
        let mean_bg = sum_bg / weight_bg as f64;
        let mean_fg = (sum_all - sum_bg) / weight_fg as f64;
        let diff = mean_bg - mean_fg;
        let between = weight_bg as f64 * weight_fg as f64 * diff * diff;

        if between > best_variance {
            best_variance = between;
            best_threshold = t as u8;
        }
    }

    if best_variance < 0.0 {
        // Single intensity: every pixel is in the lower class
        histogram
            .iter()
            .position(|&count| count > 0)
            .map(|v| v as u8)
            .unwrap_or(0)
    } else {
        best_threshold
    }
}
