//! Decoding of the controller's `KEY:VALUE;KEY:VALUE` telemetry lines.

pub mod snapshot;

pub use snapshot::{DeviceState, SensorSnapshot, TelemetryKey};

/// What a received line turned out to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineKind {
    /// At least one recognized key. `complete` lines are worth a data-log row.
    Telemetry { complete: bool },
    /// Free text from the firmware (boot messages, acknowledgements, ...)
    DeviceLog,
}

/// Keys that must all be present for a line to count as a complete frame.
pub const DEFAULT_REQUIRED_KEYS: [TelemetryKey; 3] =
    [TelemetryKey::Pcb2State, TelemetryKey::Temp, TelemetryKey::Co2];

#[derive(Clone, Debug)]
pub struct TelemetryParser {
    required: Vec<TelemetryKey>,
}

impl Default for TelemetryParser {
    fn default() -> Self {
        Self::new(DEFAULT_REQUIRED_KEYS.to_vec())
    }
}

impl TelemetryParser {
    pub fn new(required: Vec<TelemetryKey>) -> Self {
        Self { required }
    }

    /// Applies every recognized `KEY:VALUE` segment of `line` to `snapshot`.
    ///
    /// Segments without a `:` and unknown keys are skipped one by one; the
    /// rest of the line is still used.
    pub fn apply_line(&self, line: &str, snapshot: &mut SensorSnapshot) -> LineKind {
        let mut seen: Vec<TelemetryKey> = Vec::new();

        for segment in line.split(';') {
            let Some((key, value)) = segment.split_once(':') else {
                if !segment.trim().is_empty() {
                    log::trace!("Skipping telemetry segment without ':': '{}'", segment);
                }
                continue;
            };

            let Some(key) = TelemetryKey::from_name(key.trim()) else {
                continue;
            };

            snapshot.set(key, value);
            if !seen.contains(&key) {
                seen.push(key);
            }
        }

        if seen.is_empty() {
            return LineKind::DeviceLog;
        }

        let complete = self.required.iter().all(|k| seen.contains(k));
        LineKind::Telemetry { complete }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> (LineKind, SensorSnapshot) {
        let mut snap = SensorSnapshot::default();
        let kind = TelemetryParser::default().apply_line(line, &mut snap);
        (kind, snap)
    }

    #[test]
    fn test_state_and_temperature() {
        let (kind, snap) = parse("PCB2_STATE:2;TEMP:24.5");
        assert_eq!(snap.pcb2_state, Some(DeviceState::SetpointStable));
        assert_eq!(snap.temperature.as_deref(), Some("24.5"));
        // CO2 missing
        assert_eq!(kind, LineKind::Telemetry { complete: false });
    }

    #[test]
    fn test_unmapped_state_code() {
        let (_, snap) = parse("PCB2_STATE:99");
        assert_eq!(snap.pcb2_state.unwrap().name(), "UNKNOWN_STATE");
    }

    #[test]
    fn test_partial_update_keeps_other_fields() {
        let parser = TelemetryParser::default();
        let mut snap = SensorSnapshot::default();

        parser.apply_line("TEMP:21.0;HUM:45.2;PRES:1013", &mut snap);
        parser.apply_line("TEMP:22.5", &mut snap);

        assert_eq!(snap.temperature.as_deref(), Some("22.5"));
        assert_eq!(snap.humidity.as_deref(), Some("45.2"));
        assert_eq!(snap.pressure.as_deref(), Some("1013"));
    }

    #[test]
    fn test_complete_frame() {
        let (kind, snap) =
            parse("TEMP:24.1;HUM:40;PRES:1012;CO2:812;PCB1_STATE:1;PCB2_STATE:1;COOLER:ON");
        assert_eq!(kind, LineKind::Telemetry { complete: true });
        assert_eq!(snap.co2_ppm(), Some(812.0));
        assert_eq!(snap.cooler.as_deref(), Some("ON"));
        assert_eq!(snap.pcb1_state.as_deref(), Some("1"));
    }

    #[test]
    fn test_status_alias() {
        let (kind, snap) = parse("STATUS:0;TEMP:20;CO2:400");
        assert_eq!(snap.pcb2_state, Some(DeviceState::Idle));
        assert_eq!(kind, LineKind::Telemetry { complete: true });
    }

    #[test]
    fn test_malformed_segment_skipped() {
        let (kind, snap) = parse("TEMP:23.0;garbage;HUM:50;;CO2");
        assert_eq!(snap.temperature.as_deref(), Some("23.0"));
        assert_eq!(snap.humidity.as_deref(), Some("50"));
        assert_eq!(snap.co2, None);
        assert_eq!(kind, LineKind::Telemetry { complete: false });
    }

    #[test]
    fn test_value_keeps_later_colons() {
        let (_, snap) = parse("COOLER:ON:FAN2");
        assert_eq!(snap.cooler.as_deref(), Some("ON:FAN2"));
    }

    #[test]
    fn test_free_text_is_device_log() {
        let (kind, snap) = parse("ESP32 ready, firmware v2.1");
        assert_eq!(kind, LineKind::DeviceLog);
        assert_eq!(snap, SensorSnapshot::default());

        // Colon present but no known key
        let (kind, _) = parse("WARN: valve 3 slow");
        assert_eq!(kind, LineKind::DeviceLog);
    }

    #[test]
    fn test_required_keys_are_configurable() {
        let parser = TelemetryParser::new(vec![TelemetryKey::Co2]);
        let mut snap = SensorSnapshot::default();
        assert_eq!(
            parser.apply_line("CO2:500", &mut snap),
            LineKind::Telemetry { complete: true }
        );
        assert_eq!(
            parser.apply_line("TEMP:20", &mut snap),
            LineKind::Telemetry { complete: false }
        );
    }
}
