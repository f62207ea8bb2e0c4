//! Operational logging.
//!
//! Installs a `log` backend that writes every record to the console and
//! appends it to `logs/calibrator.log`, each line prefixed with a local
//! timestamp. The CSV data log is separate (see `session::data_log`).

use anyhow::{anyhow, Context, Result};
use chrono::Local;
use log::{LevelFilter, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

struct TeeLogger {
    level: LevelFilter,
    file: Mutex<Option<File>>,
}

impl log::Log for TeeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_line(record);
        print!("{}", line);
        if let Ok(mut guard) = self.file.lock() {
            if let Some(file) = guard.as_mut() {
                let _ = file.write_all(line.as_bytes());
            }
        }
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
        if let Ok(mut guard) = self.file.lock() {
            if let Some(file) = guard.as_mut() {
                let _ = file.flush();
            }
        }
    }
}

fn format_line(record: &Record) -> String {
    let timestamp = Local::now().format("%H:%M:%S%.3f");
    format!(
        "[{}] {:<5} {}: {}\n",
        timestamp,
        record.level(),
        record.target(),
        record.args()
    )
}

/// Parses a level name such as `"info"` or `"debug"`.
pub fn parse_level(name: &str) -> Result<LevelFilter> {
    name.parse::<LevelFilter>()
        .map_err(|_| anyhow!("Unknown log level '{}'", name))
}

/// Installs the console + file logger. Call once at startup.
///
/// If the log file cannot be opened, logging continues on the console only.
pub fn init(log_path: &Path, level: LevelFilter) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .map_err(|e| eprintln!("Cannot open {}: {}", log_path.display(), e))
        .ok();

    let logger = TeeLogger {
        level,
        file: Mutex::new(file),
    };

    log::set_boxed_logger(Box::new(logger)).context("Logger already installed")?;
    log::set_max_level(level);
    Ok(())
}

/// Appends a panic report straight to the log file.
///
/// Used from the panic hook, where the logger itself may be unusable.
pub fn write_panic_report(log_path: &Path, message: &str) {
    let line = format!("[{}] [PANIC] {}\n", Local::now().format("%H:%M:%S%.3f"), message);
    eprint!("{}", line);
    if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(log_path) {
        let _ = file.write_all(line.as_bytes());
    }
}
