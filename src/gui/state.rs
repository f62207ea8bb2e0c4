//! GUI-side state: text entries, slider mirror, keyboard mapping.
//!
//! Nothing here touches the processing state; user actions become `Intent`s.

use eframe::egui::Key;

use crate::app::Intent;
use crate::ocr::preprocess::DEFAULT_THRESHOLD;
use crate::ocr::roi::ROI_STEP;
use crate::ocr::{RoiAxis, ThresholdPolicy};
use crate::serial::{parse_amount, DeviceCommand, QUICK_SETPOINT_PPM};

/// What a keyboard shortcut does.
#[derive(Clone, Debug, PartialEq)]
pub enum KeyAction {
    Send(Intent),
    Quit,
}

/// Shortcut table. Only consulted while no text field has focus.
pub fn key_action(key: Key) -> Option<KeyAction> {
    let roi = |axis, delta| KeyAction::Send(Intent::AdjustRoi { axis, delta });
    let cmd = |command| KeyAction::Send(Intent::SendCommand(command));

    match key {
        Key::W => Some(roi(RoiAxis::Y, -ROI_STEP)),
        Key::S => Some(roi(RoiAxis::Y, ROI_STEP)),
        Key::A => Some(roi(RoiAxis::X, -ROI_STEP)),
        Key::D => Some(roi(RoiAxis::X, ROI_STEP)),
        Key::Z => Some(cmd(DeviceCommand::SetCo2(QUICK_SETPOINT_PPM))),
        Key::K => Some(cmd(DeviceCommand::CalibrateSensor)),
        Key::P => Some(cmd(DeviceCommand::OpenAll)),
        Key::T => Some(cmd(DeviceCommand::ToggleCooler)),
        Key::Q => Some(KeyAction::Quit),
        _ => None,
    }
}

/// Keys checked every frame.
pub const SHORTCUT_KEYS: [Key; 9] = [
    Key::W,
    Key::A,
    Key::S,
    Key::D,
    Key::Z,
    Key::K,
    Key::P,
    Key::T,
    Key::Q,
];

#[derive(Debug)]
pub struct GuiState {
    /// CO2 setpoint entry (ppm)
    pub setpoint_input: String,
    /// Valve pulse entry (ms)
    pub pulse_input: String,
    /// Shown under the command bar when an entry is not an integer
    pub input_error: Option<String>,
    /// Mirror of the fixed threshold for the slider
    pub threshold: u8,
    pub auto_threshold: bool,
    /// Display width of the camera view
    pub preview_width: f32,
}

impl GuiState {
    pub fn new(policy: ThresholdPolicy, preview_width: f32) -> Self {
        let (threshold, auto_threshold) = match policy {
            ThresholdPolicy::Fixed { value } => (value, false),
            ThresholdPolicy::Otsu => (DEFAULT_THRESHOLD, true),
        };

        Self {
            setpoint_input: QUICK_SETPOINT_PPM.to_string(),
            pulse_input: "500".to_string(),
            input_error: None,
            threshold,
            auto_threshold,
            preview_width,
        }
    }

    /// Builds `SET_CO2` from the setpoint entry, or records why not.
    pub fn setpoint_command(&mut self) -> Option<DeviceCommand> {
        self.command_from_entry(true)
    }

    /// Builds `PULSE` from the pulse entry, or records why not.
    pub fn pulse_command(&mut self) -> Option<DeviceCommand> {
        self.command_from_entry(false)
    }

    fn command_from_entry(&mut self, setpoint: bool) -> Option<DeviceCommand> {
        let (text, what) = if setpoint {
            (&self.setpoint_input, "CO2 setpoint")
        } else {
            (&self.pulse_input, "Pulse duration")
        };

        match parse_amount(text) {
            Some(value) => {
                self.input_error = None;
                Some(if setpoint {
                    DeviceCommand::SetCo2(value)
                } else {
                    DeviceCommand::Pulse(value)
                })
            }
            None => {
                self.input_error = Some(format!(
                    "{} must be a whole number, got '{}'",
                    what,
                    text.trim()
                ));
                None
            }
        }
    }
}
