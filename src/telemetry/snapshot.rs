//! Last known values reported by the chamber controller.

use std::fmt;

/// Keys the firmware sends in a telemetry line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TelemetryKey {
    Temp,
    Hum,
    Pres,
    Co2,
    Pcb1State,
    Pcb2State,
    Cooler,
}

impl TelemetryKey {
    pub const ALL: [TelemetryKey; 7] = [
        TelemetryKey::Temp,
        TelemetryKey::Hum,
        TelemetryKey::Pres,
        TelemetryKey::Co2,
        TelemetryKey::Pcb1State,
        TelemetryKey::Pcb2State,
        TelemetryKey::Cooler,
    ];

    /// Wire name of the key.
    pub fn name(self) -> &'static str {
        match self {
            TelemetryKey::Temp => "TEMP",
            TelemetryKey::Hum => "HUM",
            TelemetryKey::Pres => "PRES",
            TelemetryKey::Co2 => "CO2",
            TelemetryKey::Pcb1State => "PCB1_STATE",
            TelemetryKey::Pcb2State => "PCB2_STATE",
            TelemetryKey::Cooler => "COOLER",
        }
    }

    /// Looks up a wire name. Older firmware sent the device state as `STATUS`.
    pub fn from_name(name: &str) -> Option<Self> {
        if name == "STATUS" {
            return Some(TelemetryKey::Pcb2State);
        }
        Self::ALL.into_iter().find(|k| k.name() == name)
    }
}

impl fmt::Display for TelemetryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// State machine position of the chamber controller (PCB2).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceState {
    Idle,
    ExecutingSetpoint,
    SetpointStable,
    ExecutingCalibration,
    Pulse,
    PanicMode,
    /// Code not in the table; the raw value is kept for the logs
    Unknown(String),
}

impl DeviceState {
    pub fn from_code(raw: &str) -> Self {
        match raw.trim().parse::<i64>() {
            Ok(0) => DeviceState::Idle,
            Ok(1) => DeviceState::ExecutingSetpoint,
            Ok(2) => DeviceState::SetpointStable,
            Ok(3) => DeviceState::ExecutingCalibration,
            Ok(4) => DeviceState::Pulse,
            Ok(5) => DeviceState::PanicMode,
            _ => DeviceState::Unknown(raw.trim().to_string()),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DeviceState::Idle => "IDLE",
            DeviceState::ExecutingSetpoint => "EXECUTING_SETPOINT",
            DeviceState::SetpointStable => "SETPOINT_STABLE",
            DeviceState::ExecutingCalibration => "EXECUTING_CALIBRATION",
            DeviceState::Pulse => "PULSE",
            DeviceState::PanicMode => "PANIC_MODE",
            DeviceState::Unknown(_) => "UNKNOWN_STATE",
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sensor values as last reported. `None` means never received.
///
/// Measurements keep the device's text so the dashboard and the data log show
/// exactly what was sent.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SensorSnapshot {
    pub temperature: Option<String>,
    pub humidity: Option<String>,
    pub pressure: Option<String>,
    pub co2: Option<String>,
    pub pcb1_state: Option<String>,
    pub pcb2_state: Option<DeviceState>,
    pub cooler: Option<String>,
}

impl SensorSnapshot {
    /// Stores one field. Other fields are left as they were.
    pub fn set(&mut self, key: TelemetryKey, value: &str) {
        let value = value.trim();
        match key {
            TelemetryKey::Temp => self.temperature = Some(value.to_string()),
            TelemetryKey::Hum => self.humidity = Some(value.to_string()),
            TelemetryKey::Pres => self.pressure = Some(value.to_string()),
            TelemetryKey::Co2 => self.co2 = Some(value.to_string()),
            TelemetryKey::Pcb1State => self.pcb1_state = Some(value.to_string()),
            TelemetryKey::Pcb2State => self.pcb2_state = Some(DeviceState::from_code(value)),
            TelemetryKey::Cooler => self.cooler = Some(value.to_string()),
        }
    }

    /// CO2 as a number, for plotting. `None` if unknown or not numeric.
    pub fn co2_ppm(&self) -> Option<f64> {
        self.co2.as_deref()?.parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_table() {
        assert_eq!(DeviceState::from_code("0"), DeviceState::Idle);
        assert_eq!(DeviceState::from_code("2").name(), "SETPOINT_STABLE");
        assert_eq!(DeviceState::from_code("5"), DeviceState::PanicMode);
        assert_eq!(DeviceState::from_code("99").name(), "UNKNOWN_STATE");
        assert_eq!(DeviceState::from_code("abc"), DeviceState::Unknown("abc".into()));
    }

    #[test]
    fn test_key_names_round_trip() {
        for key in TelemetryKey::ALL {
            assert_eq!(TelemetryKey::from_name(key.name()), Some(key));
        }
        assert_eq!(TelemetryKey::from_name("STATUS"), Some(TelemetryKey::Pcb2State));
        assert_eq!(TelemetryKey::from_name("temp"), None);
    }

    #[test]
    fn test_co2_accessor() {
        let mut snap = SensorSnapshot::default();
        assert_eq!(snap.co2_ppm(), None);

        snap.set(TelemetryKey::Temp, " 24.5 ");
        snap.set(TelemetryKey::Co2, "812");
        assert_eq!(snap.temperature.as_deref(), Some("24.5"));
        assert_eq!(snap.co2_ppm(), Some(812.0));

        snap.set(TelemetryKey::Co2, "n/a");
        assert_eq!(snap.co2_ppm(), None);
    }
}
