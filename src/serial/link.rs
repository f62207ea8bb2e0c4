//! Connection manager for the microcontroller link.
//!
//! The cable gets unplugged, the ESP32 resets, the port vanishes. None of
//! that is fatal: every transport error drops the link to `Disconnected`
//! and the processing loop keeps calling `connect()`, which retries no more
//! often than the backoff allows.

use std::io::{self, ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use super::transport::{Connector, LinkPort};

/// Longest line accepted before the receive buffer is considered garbage.
const MAX_LINE_BYTES: usize = 4096;

/// Upper bound on a single read from the port.
const READ_CHUNK: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connected,
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Disconnected => write!(f, "Disconnected"),
            LinkState::Connected => write!(f, "Connected"),
        }
    }
}

pub struct SerialLink<C: Connector> {
    connector: C,
    port: Option<C::Port>,
    backoff: Duration,
    last_attempt: Option<Instant>,
    attempts: u32,
    rx_buf: Vec<u8>,
}

impl<C: Connector> SerialLink<C> {
    pub fn new(connector: C, backoff: Duration) -> Self {
        Self {
            connector,
            port: None,
            backoff,
            last_attempt: None,
            attempts: 0,
            rx_buf: Vec::new(),
        }
    }

    pub fn state(&self) -> LinkState {
        if self.port.is_some() {
            LinkState::Connected
        } else {
            LinkState::Disconnected
        }
    }

    /// Number of open attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn describe(&self) -> String {
        self.connector.describe()
    }

    /// Opens the link if it is down and the backoff has elapsed.
    ///
    /// Returns whether the link is connected after the call.
    pub fn connect(&mut self) -> bool {
        if self.port.is_some() {
            return true;
        }

        if let Some(last) = self.last_attempt {
            if last.elapsed() < self.backoff {
                return false;
            }
        }

        self.last_attempt = Some(Instant::now());
        self.attempts += 1;
        log::info!("Connecting to serial port {}...", self.connector.describe());

        match self.connector.open() {
            Ok(mut port) => {
                if let Err(e) = port.discard_input() {
                    log::debug!("Could not clear serial input buffer: {}", e);
                }
                self.rx_buf.clear();
                self.port = Some(port);
                log::info!("Serial port {} connected", self.connector.describe());
                true
            }
            Err(e) => {
                log::warn!(
                    "Connection to {} failed: {}. Retrying in {}s",
                    self.connector.describe(),
                    e,
                    self.backoff.as_secs()
                );
                false
            }
        }
    }

    /// Returns the next complete line, without blocking.
    ///
    /// `None` when disconnected, when no full line has arrived yet, or when
    /// the read failed (the link is then dropped).
    pub fn read_line(&mut self) -> Option<String> {
        if self.port.is_none() {
            return None;
        }

        loop {
            if let Some(line) = self.take_buffered_line() {
                if line.is_empty() {
                    continue;
                }
                return Some(line);
            }

            let port = self.port.as_mut()?;
            let available = match port.bytes_available() {
                Ok(0) => return None,
                Ok(n) => n.min(READ_CHUNK),
                Err(e) => {
                    self.handle_disconnect(&e);
                    return None;
                }
            };

            let mut chunk = vec![0u8; available];
            match port.read(&mut chunk) {
                Ok(0) => return None,
                Ok(n) => self.rx_buf.extend_from_slice(&chunk[..n]),
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    return None;
                }
                Err(e) => {
                    self.handle_disconnect(&e);
                    return None;
                }
            }

            if self.rx_buf.len() > MAX_LINE_BYTES && !self.rx_buf.contains(&b'\n') {
                log::warn!(
                    "Discarding {} bytes of unterminated serial input",
                    self.rx_buf.len()
                );
                self.rx_buf.clear();
            }
        }
    }

    /// Pops one `\n`-terminated line off the receive buffer.
    fn take_buffered_line(&mut self) -> Option<String> {
        let pos = self.rx_buf.iter().position(|&b| b == b'\n')?;
        let raw: Vec<u8> = self.rx_buf.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&raw).trim().to_string())
    }

    /// Writes `command` followed by a newline.
    ///
    /// Returns `false` if the link is down or the write failed.
    pub fn send_command(&mut self, command: &str) -> bool {
        let Some(port) = self.port.as_mut() else {
            log::warn!("Cannot send '{}': serial port not available", command);
            return false;
        };

        let line = format!("{}\n", command);
        match port.write_all(line.as_bytes()).and_then(|()| port.flush()) {
            Ok(()) => {
                log::info!("Command sent to ESP32: {}", command);
                true
            }
            Err(e) => {
                self.handle_disconnect(&e);
                false
            }
        }
    }

    fn handle_disconnect(&mut self, err: &io::Error) {
        if self.port.take().is_some() {
            log::warn!("Serial connection lost: {}", err);
        }
        self.rx_buf.clear();
        // Wait a full backoff before trying the port again
        self.last_attempt = Some(Instant::now());
    }

    /// Releases the port.
    pub fn close(&mut self) {
        if self.port.take().is_some() {
            log::info!("Serial port closed");
        }
        self.rx_buf.clear();
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::super::transport::{Connector, LinkPort};
    use std::collections::VecDeque;
    use std::io::{self, Read, Write};
    use std::sync::{Arc, Mutex};

    /// What the fake device currently does; shared between test and port.
    #[derive(Default)]
    pub struct FakeDevice {
        pub present: bool,
        pub incoming: VecDeque<u8>,
        pub written: Vec<u8>,
        pub fail_reads: bool,
        pub fail_writes: bool,
    }

    impl FakeDevice {
        pub fn push(&mut self, text: &str) {
            self.incoming.extend(text.bytes());
        }
    }

    pub struct FakePort(Arc<Mutex<FakeDevice>>);

    impl Read for FakePort {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut dev = self.0.lock().unwrap();
            if dev.fail_reads {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
            }
            let n = buf.len().min(dev.incoming.len());
            for slot in buf.iter_mut().take(n) {
                *slot = dev.incoming.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for FakePort {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let mut dev = self.0.lock().unwrap();
            if dev.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
            }
            dev.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LinkPort for FakePort {
        fn bytes_available(&mut self) -> io::Result<usize> {
            let dev = self.0.lock().unwrap();
            if dev.fail_reads {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
            }
            Ok(dev.incoming.len())
        }
    }

    pub struct FakeConnector(pub Arc<Mutex<FakeDevice>>);

    impl Connector for FakeConnector {
        type Port = FakePort;

        fn open(&mut self) -> io::Result<FakePort> {
            if self.0.lock().unwrap().present {
                Ok(FakePort(Arc::clone(&self.0)))
            } else {
                Err(io::Error::new(io::ErrorKind::NotFound, "no such port"))
            }
        }

        fn describe(&self) -> String {
            "FAKE0 @ 115200".to_string()
        }
    }

    pub fn fake_device(present: bool) -> Arc<Mutex<FakeDevice>> {
        Arc::new(Mutex::new(FakeDevice {
            present,
            ..Default::default()
        }))
    }
}
