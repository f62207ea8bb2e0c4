//! Serial link to the ESP32 that drives the calibration chamber.

pub mod commands;
pub mod link;
pub mod transport;

pub use commands::{parse_amount, DeviceCommand, QUICK_SETPOINT_PPM};
pub use link::{LinkState, SerialLink};
pub use transport::{list_ports, Connector, SerialPortConnector};
