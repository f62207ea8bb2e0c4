//! Offline views of the session history.
//!
//! This module provides:
//! - PNG chart of sensor vs OCR CO2 over time (`chart`)

pub mod chart;

pub use chart::{export_history, timestamped_path};
