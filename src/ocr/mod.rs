//! Reading the instrument display from camera frames.
//!
//! Pipeline per frame: crop + binarize the ROI, run the OCR engine, filter
//! the text through the plausibility rules. The consensus buffer then turns
//! the stream of accepted readings into one stable value.

pub mod consensus;
pub mod engine;
pub mod preprocess;
pub mod roi;
pub mod setup;
pub mod validate;

pub use consensus::{ConsensusBuffer, StableReading};
pub use engine::{OcrEngine, TesseractEngine};
pub use preprocess::{Preprocessed, ThresholdPolicy};
pub use roi::{Roi, RoiAxis};
pub use setup::find_tesseract_executable;
pub use validate::{validate, ValidatedReading};

use image::RgbImage;

/// Everything one frame produced, for the consensus buffer and the debug previews.
#[derive(Clone, Debug)]
pub struct FrameReading {
    pub images: Preprocessed,
    /// Text returned by the engine (empty when the engine failed)
    pub raw_text: String,
    pub reading: Option<ValidatedReading>,
    /// Why the engine produced no text, if it failed
    pub engine_error: Option<String>,
}

/// High-level function: frame → preprocessed crops → text → validated reading.
///
/// Returns `None` when the ROI leaves nothing to read. An engine failure is
/// reported in `engine_error` and otherwise treated as a rejected frame; the
/// caller decides how loudly to log it.
pub fn read_frame(
    frame: &RgbImage,
    roi: &Roi,
    policy: ThresholdPolicy,
    engine: &dyn OcrEngine,
) -> Option<FrameReading> {
    let images = preprocess::preprocess(frame, roi, policy)?;

    let (raw_text, engine_error) = match engine.recognize(&images.binary) {
        Ok(text) => (text, None),
        Err(e) => (String::new(), Some(format!("{:#}", e))),
    };

    log::debug!("OCR read: '{}'", raw_text);
    let reading = validate(&raw_text);

    Some(FrameReading {
        images,
        raw_text,
        reading,
        engine_error,
    })
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedEngine;
    use super::*;

    fn frame() -> RgbImage {
        RgbImage::from_pixel(64, 48, image::Rgb([200, 200, 200]))
    }

    #[test]
    fn test_read_frame_accepts_plausible_text() {
        let engine = ScriptedEngine::always(" 4200\n");
        let out = read_frame(&frame(), &Roi::new(0, 0, 32, 16), ThresholdPolicy::Otsu, &engine)
            .unwrap();
        assert_eq!(out.reading.unwrap().as_str(), "4200");
        assert_eq!(out.images.binary.dimensions(), (32, 16));
    }

    #[test]
    fn test_read_frame_rejects_noise() {
        let engine = ScriptedEngine::always("42O0");
        let out = read_frame(&frame(), &Roi::default(), ThresholdPolicy::default(), &engine);
        // Default ROI (150,240) is outside a 64x48 frame
        assert!(out.is_none());

        let out = read_frame(&frame(), &Roi::new(0, 0, 20, 20), ThresholdPolicy::default(), &engine)
            .unwrap();
        assert!(out.reading.is_none());
    }

    #[test]
    fn test_read_frame_engine_failure_is_rejection() {
        let engine = ScriptedEngine::new(&[None]);
        let out = read_frame(&frame(), &Roi::new(0, 0, 20, 20), ThresholdPolicy::Otsu, &engine)
            .unwrap();
        assert!(out.raw_text.is_empty());
        assert!(out.reading.is_none());
        assert!(out.engine_error.is_some());
    }
}
