//! The byte-level seam under the link manager.
//!
//! `Connector` opens a port, `LinkPort` is what an open port must offer.
//! Production code uses the `serialport` crate; tests script both.

use serialport::{ClearBuffer, SerialPort, SerialPortType};
use std::io::{self, Read, Write};
use std::time::Duration;

pub trait LinkPort: Read + Write + Send {
    /// Bytes that can be read right now without blocking.
    fn bytes_available(&mut self) -> io::Result<usize>;

    /// Drops whatever the device sent before we were listening.
    fn discard_input(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub trait Connector: Send {
    type Port: LinkPort;

    fn open(&mut self) -> io::Result<Self::Port>;

    /// Human-readable target, e.g. `COM3 @ 115200`.
    fn describe(&self) -> String;
}

impl LinkPort for Box<dyn SerialPort> {
    fn bytes_available(&mut self) -> io::Result<usize> {
        self.bytes_to_read()
            .map(|n| n as usize)
            .map_err(io::Error::from)
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(io::Error::from)
    }
}

/// Opens a real serial port.
#[derive(Clone, Debug)]
pub struct SerialPortConnector {
    pub port_name: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

impl Connector for SerialPortConnector {
    type Port = Box<dyn SerialPort>;

    fn open(&mut self) -> io::Result<Self::Port> {
        serialport::new(&self.port_name, self.baud_rate)
            .timeout(self.read_timeout)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(io::Error::from)
    }

    fn describe(&self) -> String {
        format!("{} @ {}", self.port_name, self.baud_rate)
    }
}

/// Lists the serial ports present on this machine, for diagnostics.
pub fn list_ports() -> Vec<String> {
    let Ok(ports) = serialport::available_ports() else {
        return Vec::new();
    };

    let mut out: Vec<String> = ports
        .into_iter()
        .map(|p| match p.port_type {
            SerialPortType::UsbPort(info) => {
                let parts: Vec<String> = [info.manufacturer, info.product]
                    .into_iter()
                    .flatten()
                    .collect();
                if parts.is_empty() {
                    format!("{}: USB Serial", p.port_name)
                } else {
                    format!("{}: {}", p.port_name, parts.join(" "))
                }
            }
            SerialPortType::BluetoothPort => format!("{}: Bluetooth", p.port_name),
            SerialPortType::PciPort => format!("{}: PCI", p.port_name),
            SerialPortType::Unknown => p.port_name,
        })
        .collect();

    out.sort();
    out
}
