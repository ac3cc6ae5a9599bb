//! Protocol implementations: CRC, framing, commands.

pub mod command;
pub mod crc;
pub mod frame;

// Re-export common types
pub use command::{BootloaderVersion, Command, CommandTag, Response};
pub use crc::{crc16, crc16_bytes};
pub use frame::{ParsedFrame, build_frame, escape, parse_frame, unescape};
