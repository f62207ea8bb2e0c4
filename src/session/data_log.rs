//! CSV log of calibration data.
//!
//! One row per stabilized OCR reading or complete telemetry frame. The file
//! is opened in append mode for every row, so whatever was written before a
//! crash stays on disk.

use crate::ocr::ValidatedReading;
use crate::telemetry::SensorSnapshot;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

const CSV_HEADER: &str =
    "date,time,source,ocr_co2_ppm,sensor_co2_ppm,temperature_c,humidity_pct,pressure_hpa";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordSource {
    /// The camera reading of the reference instrument changed
    Ocr,
    /// A complete telemetry frame from the controller
    Sensor,
}

impl RecordSource {
    fn as_str(self) -> &'static str {
        match self {
            RecordSource::Ocr => "OCR",
            RecordSource::Sensor => "SENSOR",
        }
    }
}

/// One data-log row. Both sides are recorded so rows can be compared later.
#[derive(Clone, Debug)]
pub struct LogRecord {
    pub timestamp: DateTime<Local>,
    pub source: RecordSource,
    pub ocr_co2: Option<ValidatedReading>,
    pub sensor: SensorSnapshot,
}

impl LogRecord {
    pub fn new(
        source: RecordSource,
        ocr_co2: Option<&ValidatedReading>,
        sensor: &SensorSnapshot,
    ) -> Self {
        Self {
            timestamp: Local::now(),
            source,
            ocr_co2: ocr_co2.cloned(),
            sensor: sensor.clone(),
        }
    }

    fn to_csv_line(&self) -> String {
        let ocr = self
            .ocr_co2
            .as_ref()
            .map(|r| r.as_str().to_string())
            .unwrap_or_default();

        [
            self.timestamp.format("%d/%m/%Y").to_string(),
            self.timestamp.format("%H:%M:%S").to_string(),
            self.source.as_str().to_string(),
            ocr,
            csv_field(self.sensor.co2.as_deref()),
            csv_field(self.sensor.temperature.as_deref()),
            csv_field(self.sensor.humidity.as_deref()),
            csv_field(self.sensor.pressure.as_deref()),
        ]
        .join(",")
    }
}

/// Device text goes into the CSV verbatim unless it would break the row.
fn csv_field(value: Option<&str>) -> String {
    match value {
        None => String::new(),
        Some(v) if v.contains([',', '"', '\n']) => format!("\"{}\"", v.replace('"', "\"\"")),
        Some(v) => v.to_string(),
    }
}

#[derive(Clone, Debug)]
pub struct DataLog {
    path: PathBuf,
}

impl DataLog {
    /// Prepares the log file, stamping the header if the file is new or empty.
    ///
    /// Existing rows are never touched.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create data log directory {}", parent.display())
                })?;
            }
        }

        let has_content = fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false);
        if !has_content {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to create data log {}", path.display()))?;
            writeln!(file, "{}", CSV_HEADER).context("Failed to write data log header")?;
        }

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one row.
    pub fn append(&self, record: &LogRecord) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open data log {}", self.path.display()))?;

        writeln!(file, "{}", record.to_csv_line()).context("Failed to write data log row")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::validate::reading;
    use crate::telemetry::TelemetryKey;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 1).unwrap()
    }

    #[test]
    fn test_open_writes_header_once() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("data_logger.csv");

        let log = DataLog::open(&path).unwrap();
        log.append(&LogRecord::new(RecordSource::Sensor, None, &SensorSnapshot::default()))
            .unwrap();

        DataLog::open(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], CSV_HEADER);
    }

    #[test]
    fn test_open_preserves_foreign_content() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "Fecha,Hora\n01/01/2024,10:00:00\n").unwrap();

        DataLog::open(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("Fecha,Hora"));
        assert!(!content.contains(CSV_HEADER));
    }

    #[test]
    fn test_empty_file_gets_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        fs::write(&path, "").unwrap();

        DataLog::open(&path).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), format!("{}\n", CSV_HEADER));
    }

    #[test]
    fn test_ocr_row_carries_sensor_values() {
        let mut sensor = SensorSnapshot::default();
        sensor.set(TelemetryKey::Co2, "812");
        sensor.set(TelemetryKey::Temp, "24.5");

        let mut record = LogRecord::new(RecordSource::Ocr, Some(&reading("800")), &sensor);
        record.timestamp = fixed_time();

        assert_eq!(record.to_csv_line(), "07/03/2024,09:05:01,OCR,800,812,24.5,,");
    }

    #[test]
    fn test_sensor_row_without_ocr() {
        let mut sensor = SensorSnapshot::default();
        sensor.set(TelemetryKey::Co2, "400");
        sensor.set(TelemetryKey::Hum, "41");
        sensor.set(TelemetryKey::Pres, "1013.2");

        let mut record = LogRecord::new(RecordSource::Sensor, None, &sensor);
        record.timestamp = fixed_time();

        assert_eq!(record.to_csv_line(), "07/03/2024,09:05:01,SENSOR,,400,,41,1013.2");
    }

    #[test]
    fn test_csv_field_quotes_separators() {
        assert_eq!(csv_field(Some("1,5")), "\"1,5\"");
        assert_eq!(csv_field(Some("a\"b")), "\"a\"\"b\"");
        assert_eq!(csv_field(None), "");
    }

    #[test]
    fn test_append_multiple_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.csv");
        let log = DataLog::open(&path).unwrap();

        for _ in 0..3 {
            let snapshot = SensorSnapshot::default();
            let record = LogRecord::new(RecordSource::Ocr, Some(&reading("350")), &snapshot);
            log.append(&record).unwrap();
        }

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 4);
        assert!(content.lines().skip(1).all(|l| l.contains(",OCR,350,")));
    }
}
