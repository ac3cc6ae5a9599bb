//! # uartboot
//!
//! Client for a small UART bootloader that flashes hex images line by line.
//!
//! The crate is layered bottom-up:
//!
//! - [`protocol`]: CRC-16, frame escaping and the command set
//! - [`transport`]: frame reassembly on top of a byte-stream [`Port`]
//! - [`channel`]: one outstanding command at a time, with a response deadline
//! - [`upload`]: the line-by-line upload engine with progress reporting
//! - [`client`]: connection lifecycle and the user-facing operations
//!
//! ## Wire format
//!
//! ```text
//! SOH(0x01) | escape(payload ++ crc16_le(payload)) | EOT(0x04)
//! ```
//!
//! Any SOH, EOT or ESC (0x10) inside the body is preceded by ESC.
//!
//! ## Features
//!
//! - `native` (default): serial ports via the `serialport` crate
//! - `serde`: `Serialize` for discovered ports
//!
//! ## Example
//!
//! ```rust,no_run
//! use uartboot::{BootloaderClient, ClientConfig, ClientEvent, HexImage, SerialConnector};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let image = HexImage::from_file("firmware.hex")?;
//!
//!     let connector = SerialConnector::new(Some("/dev/ttyUSB0".into()), 115_200);
//!     let mut client = BootloaderClient::new(connector, ClientConfig::default());
//!     client.set_observer(|event| {
//!         if let ClientEvent::Progress(p) = event {
//!             println!("{:.0}%", p.percent * 100.0);
//!         }
//!     });
//!
//!     client.connect()?;
//!     println!("Bootloader {}", client.version()?);
//!     client.upload(&image)?;
//!     client.run()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod client;
pub mod device;
pub mod error;
pub mod image;
pub mod port;
pub mod protocol;
pub mod transport;
pub mod upload;

#[cfg(feature = "native")]
pub use client::SerialConnector;
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    channel::{ChannelConfig, CommandChannel},
    client::{BootloaderClient, ClientConfig, ClientEvent, ConnectionState, Connector, StopHandle},
    device::{DetectedPort, DeviceKind},
    error::{Error, Result},
    image::{HexImage, ImageSource},
    port::{Port, PortEnumerator, PortInfo, SerialConfig},
    protocol::{BootloaderVersion, Command, CommandTag, Response},
    transport::{Transport, TransportEvent},
    upload::{Progress, UploadEngine, UploadJob, UploadOptions, UploadReport},
};
