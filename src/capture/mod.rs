//! Frame acquisition.
//!
//! This module provides:
//! - The `FrameSource` trait the processing loop pulls frames from
//! - A replay source that loops over images in a folder (`replay`)
//! - A live camera source behind the `camera` feature (`camera`)

#[cfg(feature = "camera")]
pub mod camera;
pub mod replay;

use crate::config::CameraConfig;
use anyhow::Result;
use image::RgbImage;

/// A source of RGB frames. Calls must not block for longer than one frame.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<RgbImage>;

    /// Short description for the logs.
    fn describe(&self) -> String;
}

/// Opens the source selected in the configuration.
///
/// Failure here is fatal for the application: without video there is no
/// reference reading.
pub fn open(config: &CameraConfig) -> Result<Box<dyn FrameSource>> {
    match config {
        CameraConfig::Replay {
            dir,
            frame_interval_ms,
        } => {
            let source = replay::ReplaySource::open(dir, *frame_interval_ms)?;
            Ok(Box::new(source))
        }
        #[cfg(feature = "camera")]
        CameraConfig::Device { index } => Ok(Box::new(camera::CameraSource::open(*index)?)),
        #[cfg(not(feature = "camera"))]
        CameraConfig::Device { index } => anyhow::bail!(
            "Camera {} requested, but this build has no camera support. \
             Rebuild with `--features camera` or use a replay source",
            index
        ),
    }
}
