//! The processing side of the application.
//!
//! This module provides:
//! - Operator intents sent from the GUI (`intent`)
//! - The per-tick processing logic (`calibrator`)
//! - The snapshot published for the GUI (`dashboard`)
//! - CO2 history for plotting (`history`)
//! - The worker thread that drives it all (`runner`)

pub mod calibrator;
pub mod dashboard;
pub mod history;
pub mod intent;
pub mod runner;

pub use calibrator::{Calibrator, CalibratorParts, TickOutcome};
pub use dashboard::Dashboard;
pub use history::HistorySample;
pub use intent::Intent;
pub use runner::spawn;
