//! Live webcam frames through `nokhwa`.

use super::FrameSource;
use anyhow::{anyhow, Context, Result};
use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;

pub struct CameraSource {
    camera: Camera,
    name: String,
}

impl CameraSource {
    pub fn open(index: u32) -> Result<Self> {
        let requested =
            RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestFrameRate);
        let mut camera = Camera::new(CameraIndex::Index(index), requested)
            .with_context(|| format!("Cannot open camera {}", index))?;
        camera
            .open_stream()
            .with_context(|| format!("Cannot start streaming from camera {}", index))?;

        let name = camera.info().human_name();
        let res = camera.resolution();
        log::info!(
            "Opened camera {} ({}) at {}x{}",
            index,
            name,
            res.width(),
            res.height()
        );

        Ok(Self { camera, name })
    }
}

impl FrameSource for CameraSource {
    fn next_frame(&mut self) -> Result<RgbImage> {
        let buffer = self.camera.frame().context("Camera frame grab failed")?;
        let decoded = buffer
            .decode_image::<RgbFormat>()
            .context("Camera frame decode failed")?;

        // Rebuild through the raw buffer so nokhwa's `image` version does not leak out
        let (width, height) = (decoded.width(), decoded.height());
        RgbImage::from_raw(width, height, decoded.into_raw())
            .ok_or_else(|| anyhow!("Camera returned a truncated {}x{} frame", width, height))
    }

    fn describe(&self) -> String {
        format!("camera '{}'", self.name)
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        if let Err(e) = self.camera.stop_stream() {
            log::warn!("Failed to stop camera stream: {}", e);
        } else {
            log::info!("Camera released");
        }
    }
}
