//! Replays still images from a folder as if they were camera frames.
//!
//! Useful for tuning the ROI and threshold against recorded photos of the
//! instrument, and for running the tool without a webcam.

use super::FrameSource;
use anyhow::{bail, Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

pub struct ReplaySource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next_index: usize,
    interval: Duration,
    shown_at: Option<Instant>,
    current: Option<RgbImage>,
}

/// Lists the image files in `dir`, sorted by name.
fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read replay folder {}", dir.display()))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    Ok(files)
}

impl ReplaySource {
    pub fn open(dir: &Path, frame_interval_ms: u64) -> Result<Self> {
        let files = list_images(dir)?;
        if files.is_empty() {
            bail!("Replay folder {} contains no images", dir.display());
        }

        log::info!("Replaying {} images from {}", files.len(), dir.display());

        Ok(Self {
            dir: dir.to_path_buf(),
            files,
            next_index: 0,
            interval: Duration::from_millis(frame_interval_ms),
            shown_at: None,
            current: None,
        })
    }

    fn advance(&mut self) -> Result<RgbImage> {
        let path = &self.files[self.next_index];
        self.next_index = (self.next_index + 1) % self.files.len();

        let frame = image::open(path)
            .with_context(|| format!("Failed to load replay frame {}", path.display()))?
            .to_rgb8();
        Ok(frame)
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<RgbImage> {
        let due = match (self.shown_at, &self.current) {
            (Some(at), Some(_)) => at.elapsed() >= self.interval,
            _ => true,
        };

        if due {
            // Mark the attempt even on failure so a bad file is not retried every tick
            self.shown_at = Some(Instant::now());
            let frame = self.advance()?;
            self.current = Some(frame);
        }

        match &self.current {
            Some(frame) => Ok(frame.clone()),
            None => bail!("No replay frame loaded"),
        }
    }

    fn describe(&self) -> String {
        format!("replay of {}", self.dir.display())
    }
}
