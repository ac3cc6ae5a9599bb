//! Port abstraction for the byte-stream the bootloader protocol runs over.
//!
//! The protocol layers never touch a serial device directly. They work on
//! anything implementing [`Port`]:
//!
//! ```text
//! +------------------+
//! |  BootloaderClient|
//! +--------+---------+
//!          |
//! +--------+---------+
//! |  CommandChannel  |
//! +--------+---------+
//!          |
//! +--------+---------+
//! |    Transport     |
//! +--------+---------+
//!          |
//! +--------+---------+
//! |    Port trait    |
//! +--------+---------+
//!          |
//! +--------+---------+
//! | NativePort       |
//! |   (serialport)   |
//! +------------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::io::Read;
//! use uartboot::port::Port;
//!
//! fn example<P: Port>(port: &mut P) -> uartboot::Result<()> {
//!     port.write_all_bytes(&[0x01, 0x05, 0xA5, 0x50, 0x04])?;
//!
//!     let mut buf = [0u8; 32];
//!     let n = port.read(&mut buf)?;
//!     println!("Received: {:?}", &buf[..n]);
//!
//!     Ok(())
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

#[cfg(test)]
pub(crate) mod mock;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;

/// Default baud rate of the bootloader UART.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Default read timeout; bounds how long a single poll of the port blocks.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(20);

/// Serial port configuration. The line format is always 8N1.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read timeout.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD,
            timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the read timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Serial port information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// Whether the port sits on a USB bus.
    pub is_usb: bool,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
}

/// Byte-stream port the protocol runs over.
///
/// Reads must be bounded by a short timeout: return `ErrorKind::TimedOut` (or
/// `Ok(0)`) when nothing arrived, so callers can enforce their own deadlines.
pub trait Port: Read + Write + Send {
    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Whether the port is open.
    fn is_open(&self) -> bool;

    /// Close the port and release resources.
    ///
    /// After calling this method, the port cannot be used for further I/O.
    fn close(&mut self) -> Result<()>;

    /// Write all bytes, blocking until the port accepted and flushed them.
    fn write_all_bytes(&mut self, buf: &[u8]) -> std::io::Result<()> {
        self.write_all(buf)?;
        self.flush()
    }
}

/// Trait for listing available serial ports.
///
/// Separate from `Port` because it doesn't require an open port instance.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports() -> Result<Vec<PortInfo>>;
}

// Re-export the appropriate implementation based on features
#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator};
