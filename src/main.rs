//! Vaisala calibration assistant
//!
//! Reads the CO2 display of a reference instrument through a camera, compares
//! it with the telemetry of an ESP32-controlled chamber, logs both to CSV and
//! lets the operator drive the chamber from a dashboard.

// Hide console window on Windows for release builds
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod analysis;
mod app;
mod capture;
mod config;
mod gui;
mod logging;
mod ocr;
mod paths;
mod serial;
mod session;
mod telemetry;

use anyhow::{anyhow, Context, Result};
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;

use app::{Calibrator, CalibratorParts};
use config::AppConfig;
use ocr::{ConsensusBuffer, TesseractEngine};
use serial::{SerialLink, SerialPortConnector};
use session::DataLog;
use telemetry::TelemetryParser;

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = if let Some(loc) = panic_info.location() {
            format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column())
        } else {
            String::new()
        };
        let thread = std::thread::current()
            .name()
            .unwrap_or("unnamed")
            .to_string();

        logging::write_panic_report(
            &paths::get_log_file(),
            &format!("thread '{}'{}: {}", thread, location, msg),
        );
    }));
}

fn main() -> Result<()> {
    install_panic_hook();

    // Ensure output directories exist
    paths::ensure_directories().context("Failed to create logs/ and data/ directories")?;
    let log_path = paths::get_log_file();

    let loaded = match config::load(&paths::config_candidates()) {
        Ok(loaded) => loaded,
        Err(e) => {
            // Still get the reason into the log file
            let _ = logging::init(&log_path, LevelFilter::Info);
            log::error!("Configuration error: {:#}", e);
            return Err(e);
        }
    };

    let level = logging::parse_level(&loaded.config.log_level)?;
    logging::init(&log_path, level)?;
    log::info!(
        "Starting {} v{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
    match &loaded.source {
        Some(path) => log::info!("Config loaded from {}", path.display()),
        None => log::info!("config.json not found. Using default config."),
    }

    if let Err(e) = run(loaded.config) {
        log::error!("Fatal: {:#}", e);
        return Err(e);
    }

    log::info!("Application exited normally");
    Ok(())
}

fn build_engine(config: &AppConfig) -> TesseractEngine {
    let configured = config.tesseract.command_path.as_deref();
    let executable = match ocr::find_tesseract_executable(configured) {
        Ok(path) => path,
        Err(e) => {
            log::warn!("{:#}", e);
            log::warn!("OCR will not produce readings until Tesseract is available");
            PathBuf::from("tesseract")
        }
    };

    let engine = TesseractEngine::new(executable, config.tesseract.psm);
    match engine.version() {
        Ok(version) => log::info!("OCR engine: {}", version),
        Err(e) => log::warn!("Tesseract check failed: {:#}", e),
    }
    engine
}

fn run(config: AppConfig) -> Result<()> {
    let engine = build_engine(&config);

    let ports = serial::list_ports();
    if ports.is_empty() {
        log::info!("No serial ports detected");
    } else {
        log::info!("Serial ports: {}", ports.join(", "));
    }

    let data_log_path = paths::resolve_data_path(&config.data_log);
    let data_log = DataLog::open(&data_log_path)?;
    log::info!("Data log: {}", data_log.path().display());

    let parser = TelemetryParser::new(config.telemetry.parsed_keys()?);
    let connector = SerialPortConnector {
        port_name: config.serial.port.clone(),
        baud_rate: config.serial.baud_rate,
        read_timeout: Duration::from_millis(config.serial.read_timeout_ms),
    };
    let backoff = Duration::from_secs(config.serial.reconnect_backoff_secs);

    let camera = config.camera.clone();
    let detection = config.detection.clone();
    let history_len = config.history_len;
    let chart_dir = paths::get_data_dir();

    // The frame source is opened on the processing thread; failure aborts startup
    let worker = app::spawn(
        move |intents, dashboard| {
            let source = capture::open(&camera).context("Cannot open video source")?;
            log::info!("Video source: {}", source.describe());

            let buffer = &detection.validation_buffer;
            let parts = CalibratorParts {
                source,
                engine: Box::new(engine),
                link: SerialLink::new(connector, backoff),
                parser,
                consensus: ConsensusBuffer::new(buffer.size, buffer.confidence_threshold),
                roi: detection.roi,
                threshold: detection.threshold,
                data_log,
                history_len,
                chart_dir,
            };
            Ok(Calibrator::new(parts, intents, dashboard))
        },
        Duration::from_millis(config.tick_interval_ms),
    )?;

    let gui_result = gui::run_gui(
        &config.gui,
        config.detection.threshold,
        worker.intents(),
        worker.dashboard(),
    );

    log::info!("Window closed, shutting down");
    worker.stop().context("Processing loop failed")?;

    gui_result.map_err(|e| anyhow!("GUI error: {}", e))
}
