//! Application configuration.
//!
//! Loaded once at startup from `config.json` (next to the executable, then
//! in the working directory), validated, and passed by value to the parts
//! that need it. Every field has a default, so a partial file is fine.

use crate::logging;
use crate::ocr::{Roi, ThresholdPolicy};
use crate::telemetry::{TelemetryKey, DEFAULT_REQUIRED_KEYS};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Upper bounds for sizes read from config. Far above any useful value.
const MAX_VALIDATION_BUFFER: usize = 1_000;
const MAX_HISTORY_LEN: usize = 100_000;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Port name, e.g. `COM3` or `/dev/ttyUSB0`
    pub port: String,
    pub baud_rate: u32,
    /// Minimum wait between reconnect attempts
    pub reconnect_backoff_secs: u64,
    /// Read timeout of the opened port; keeps every read short
    pub read_timeout_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "COM3".to_string(),
            baud_rate: 115200,
            reconnect_backoff_secs: 10,
            read_timeout_ms: 20,
        }
    }
}

/// Where frames come from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum CameraConfig {
    /// A webcam, by system index
    Device {
        #[serde(default)]
        index: u32,
    },
    /// Still images in a folder, played in name order and looped
    Replay {
        dir: PathBuf,
        #[serde(default = "default_frame_interval_ms")]
        frame_interval_ms: u64,
    },
}

fn default_frame_interval_ms() -> u64 {
    500
}

impl Default for CameraConfig {
    fn default() -> Self {
        CameraConfig::Device { index: 0 }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseractConfig {
    /// Explicit path to the executable; searched for when absent
    pub command_path: Option<PathBuf>,
    /// Page segmentation mode passed as `--psm`
    pub psm: u8,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            command_path: None,
            psm: 6,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationBufferConfig {
    /// Number of accepted readings the majority vote looks at
    pub size: usize,
    /// Share of the buffer the winning value must hold, in (0, 1]
    pub confidence_threshold: f64,
}

impl Default for ValidationBufferConfig {
    fn default() -> Self {
        Self {
            size: 15,
            confidence_threshold: 0.6,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub roi: Roi,
    pub threshold: ThresholdPolicy,
    pub validation_buffer: ValidationBufferConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Keys that make a telemetry line worth a data-log row
    pub required_keys: Vec<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            required_keys: DEFAULT_REQUIRED_KEYS
                .iter()
                .map(|k| k.name().to_string())
                .collect(),
        }
    }
}

impl TelemetryConfig {
    pub fn parsed_keys(&self) -> Result<Vec<TelemetryKey>> {
        if self.required_keys.is_empty() {
            bail!("telemetry.required_keys must name at least one key");
        }
        self.required_keys
            .iter()
            .map(|name| {
                TelemetryKey::from_name(name.trim())
                    .with_context(|| format!("Unknown telemetry key '{}' in required_keys", name))
            })
            .collect()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GuiConfig {
    pub window_title: String,
    /// Display width of the camera view in points
    pub preview_width: f32,
}

impl Default for GuiConfig {
    fn default() -> Self {
        Self {
            window_title: "Sistema de Calibración Asistida".to_string(),
            preview_width: 640.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub serial: SerialConfig,
    pub camera: CameraConfig,
    pub tesseract: TesseractConfig,
    pub detection: DetectionConfig,
    pub telemetry: TelemetryConfig,
    pub gui: GuiConfig,
    /// CSV data log; relative paths live under `<exe_dir>/data/`
    pub data_log: PathBuf,
    /// Points kept for the live plot
    pub history_len: usize,
    pub tick_interval_ms: u64,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            camera: CameraConfig::default(),
            tesseract: TesseractConfig::default(),
            detection: DetectionConfig::default(),
            telemetry: TelemetryConfig::default(),
            gui: GuiConfig::default(),
            data_log: PathBuf::from("data_logger.csv"),
            history_len: 300,
            tick_interval_ms: 30,
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Rejects values the rest of the program cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.trim().is_empty() {
            bail!("serial.port must not be empty");
        }
        if self.serial.baud_rate == 0 {
            bail!("serial.baud_rate must be greater than zero");
        }

        let buffer = &self.detection.validation_buffer;
        if buffer.size == 0 || buffer.size > MAX_VALIDATION_BUFFER {
            bail!(
                "detection.validation_buffer.size must be between 1 and {}, got {}",
                MAX_VALIDATION_BUFFER,
                buffer.size
            );
        }
        if !(buffer.confidence_threshold > 0.0 && buffer.confidence_threshold <= 1.0) {
            bail!(
                "detection.validation_buffer.confidence_threshold must be in (0, 1], got {}",
                buffer.confidence_threshold
            );
        }

        if self.tesseract.psm > 13 {
            bail!("tesseract.psm must be between 0 and 13, got {}", self.tesseract.psm);
        }
        if self.history_len == 0 || self.history_len > MAX_HISTORY_LEN {
            bail!(
                "history_len must be between 1 and {}, got {}",
                MAX_HISTORY_LEN,
                self.history_len
            );
        }

        self.telemetry.parsed_keys()?;
        logging::parse_level(&self.log_level)?;
        Ok(())
    }

    /// Parses and validates one config file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }
}

/// A configuration and where it came from (`None` = built-in defaults).
pub struct LoadedConfig {
    pub config: AppConfig,
    pub source: Option<PathBuf>,
}

/// Loads the first `config.json` among `candidates`.
///
/// A missing file means defaults. A file that exists but does not parse is an
/// error: silently running on defaults would talk to the wrong port.
pub fn load(candidates: &[PathBuf]) -> Result<LoadedConfig> {
    for path in candidates {
        if path.exists() {
            let config = AppConfig::load_from(path)?;
            return Ok(LoadedConfig {
                config,
                source: Some(path.clone()),
            });
        }
    }

    Ok(LoadedConfig {
        config: AppConfig::default(),
        source: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.detection.validation_buffer.size, 15);
        assert_eq!(
            config.telemetry.parsed_keys().unwrap(),
            DEFAULT_REQUIRED_KEYS.to_vec()
        );
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let json = r#"{
            "serial": { "port": "/dev/ttyUSB0" },
            "detection": { "threshold": { "mode": "otsu" },
                           "roi": { "x": 10, "y": 20, "width": 30, "height": 40 } }
        }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.detection.threshold, ThresholdPolicy::Otsu);
        assert_eq!(config.detection.roi, Roi::new(10, 20, 30, 40));
        assert_eq!(config.tick_interval_ms, 30);
    }

    #[test]
    fn test_camera_variants() {
        let replay: CameraConfig =
            serde_json::from_str(r#"{ "source": "replay", "dir": "frames" }"#).unwrap();
        assert_eq!(
            replay,
            CameraConfig::Replay {
                dir: PathBuf::from("frames"),
                frame_interval_ms: 500
            }
        );

        let device: CameraConfig = serde_json::from_str(r#"{ "source": "device" }"#).unwrap();
        assert_eq!(device, CameraConfig::Device { index: 0 });
    }

    #[test]
    fn test_validation_errors() {
        let mut config = AppConfig::default();
        config.detection.validation_buffer.size = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.detection.validation_buffer.confidence_threshold = 0.0;
        assert!(config.validate().is_err());
        config.detection.validation_buffer.confidence_threshold = 1.5;
        assert!(config.validate().is_err());
        config.detection.validation_buffer.confidence_threshold = 1.0;
        assert!(config.validate().is_ok());

        let mut config = AppConfig::default();
        config.serial.baud_rate = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.serial.port = "  ".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.telemetry.required_keys = vec!["TEMP".into(), "FOO".into()];
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.telemetry.required_keys.clear();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_oversized_buffers_rejected() {
        let mut config = AppConfig::default();
        config.detection.validation_buffer.size = usize::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("validation_buffer.size"));

        config.detection.validation_buffer.size = MAX_VALIDATION_BUFFER;
        assert!(config.validate().is_ok());

        config.history_len = MAX_HISTORY_LEN + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_status_alias_accepted_as_required_key() {
        let mut config = AppConfig::default();
        config.telemetry.required_keys = vec!["STATUS".into(), "TEMP".into(), "CO2".into()];
        assert_eq!(
            config.telemetry.parsed_keys().unwrap()[0],
            TelemetryKey::Pcb2State
        );
    }

    #[test]
    fn test_load_missing_uses_defaults() {
        let dir = tempdir().unwrap();
        let loaded = load(&[dir.path().join("config.json")]).unwrap();
        assert!(loaded.source.is_none());
        assert_eq!(loaded.config.serial.port, "COM3");
    }

    #[test]
    fn test_load_first_existing_candidate() {
        let dir = tempdir().unwrap();
        let second = dir.path().join("second.json");
        fs::write(&second, r#"{ "history_len": 50 }"#).unwrap();

        let loaded = load(&[dir.path().join("first.json"), second.clone()]).unwrap();
        assert_eq!(loaded.source, Some(second));
        assert_eq!(loaded.config.history_len, 50);
    }

    #[test]
    fn test_load_unparseable_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ serial: oops").unwrap();
        assert!(load(&[path]).is_err());
    }
}
