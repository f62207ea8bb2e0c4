//! Read-only snapshot the processing loop publishes for the GUI.

use std::sync::Arc;

use image::{GrayImage, RgbImage};

use super::history::HistorySample;
use crate::ocr::preprocess::DEFAULT_THRESHOLD;
use crate::ocr::{Roi, StableReading};
use crate::serial::LinkState;
use crate::telemetry::SensorSnapshot;

#[derive(Clone)]
pub struct Dashboard {
    pub sensor: SensorSnapshot,
    pub stable: StableReading,
    /// Share of the buffer held by the leading value at the last vote
    pub confidence: Option<f64>,
    pub buffer_len: usize,
    pub buffer_capacity: usize,
    /// Last text the OCR engine returned, accepted or not
    pub last_raw_text: String,

    pub link: LinkState,
    pub link_target: String,
    pub link_attempts: u32,

    pub roi: Roi,
    pub auto_threshold: bool,
    /// Threshold set with the slider
    pub fixed_threshold: u8,
    /// Threshold applied to the last frame (Otsu result in auto mode)
    pub threshold_in_use: Option<u8>,

    /// Increments with every new frame; the GUI re-uploads textures on change
    pub frame_seq: u64,
    pub frame: Option<Arc<RgbImage>>,
    pub gray: Option<Arc<GrayImage>>,
    pub binary: Option<Arc<GrayImage>>,

    pub history: Vec<HistorySample>,
    /// Feedback for the operator (command sent, chart exported, ...)
    pub status_message: Option<String>,
    /// Set when the processing loop has stopped on an error
    pub fault: Option<String>,
    pub running: bool,
}

impl Default for Dashboard {
    fn default() -> Self {
        Self {
            sensor: SensorSnapshot::default(),
            stable: StableReading::Unknown,
            confidence: None,
            buffer_len: 0,
            buffer_capacity: 0,
            last_raw_text: String::new(),
            link: LinkState::Disconnected,
            link_target: String::new(),
            link_attempts: 0,
            roi: Roi::default(),
            auto_threshold: false,
            fixed_threshold: DEFAULT_THRESHOLD,
            threshold_in_use: None,
            frame_seq: 0,
            frame: None,
            gray: None,
            binary: None,
            history: Vec::new(),
            status_message: None,
            fault: None,
            running: true,
        }
    }
}

fn or_placeholder(value: Option<&str>, placeholder: &str) -> String {
    value.map(str::to_string).unwrap_or_else(|| placeholder.to_string())
}

impl Dashboard {
    pub fn temperature_text(&self) -> String {
        or_placeholder(self.sensor.temperature.as_deref(), "--.-")
    }

    pub fn humidity_text(&self) -> String {
        or_placeholder(self.sensor.humidity.as_deref(), "--.-")
    }

    pub fn pressure_text(&self) -> String {
        or_placeholder(self.sensor.pressure.as_deref(), "----")
    }

    pub fn sensor_co2_text(&self) -> String {
        or_placeholder(self.sensor.co2.as_deref(), "----")
    }

    pub fn ocr_co2_text(&self) -> String {
        self.stable.to_string()
    }

    pub fn device_state_text(&self) -> String {
        self.sensor
            .pcb2_state
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "---".to_string())
    }

    pub fn pcb1_state_text(&self) -> String {
        or_placeholder(self.sensor.pcb1_state.as_deref(), "---")
    }

    pub fn cooler_text(&self) -> String {
        or_placeholder(self.sensor.cooler.as_deref(), "---")
    }

    pub fn confidence_text(&self) -> String {
        match self.confidence {
            Some(c) => format!("{:.0}%", c * 100.0),
            None => "---".to_string(),
        }
    }
}
