//! Outbound commands understood by the ESP32 firmware.
//!
//! Each command serializes to one ASCII line; the link manager appends the
//! newline that frames it.

use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Drive the chamber to a CO2 setpoint in ppm
    SetCo2(u32),
    /// Open the injection valve for the given milliseconds
    Pulse(u32),
    CalibrateSensor,
    ToggleCooler,
    /// Panic: open every valve
    OpenAll,
}

impl fmt::Display for DeviceCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetCo2(ppm) => write!(f, "SET_CO2({})", ppm),
            Self::Pulse(ms) => write!(f, "PULSE({})", ms),
            Self::CalibrateSensor => f.write_str("CALIBRATE_SENSOR"),
            Self::ToggleCooler => f.write_str("TOGGLE_COOLER"),
            Self::OpenAll => f.write_str("OPEN_ALL"),
        }
    }
}

/// Setpoint sent by the `Z` shortcut.
pub const QUICK_SETPOINT_PPM: u32 = 800;

/// Parses the integer typed into a command-bar entry.
pub fn parse_amount(text: &str) -> Option<u32> {
    text.trim().parse::<u32>().ok()
}
