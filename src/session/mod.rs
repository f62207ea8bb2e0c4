//! Durable record of the calibration session.

pub mod data_log;

pub use data_log::{DataLog, LogRecord, RecordSource};
