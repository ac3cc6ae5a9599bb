//! Error types for uartboot.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type for uartboot operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the byte-stream transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The port is closed (or was never opened).
    #[error("port is not connected")]
    NotConnected,

    /// The port refused or failed the write.
    #[error("write failed: {0}")]
    WriteFailed(#[source] io::Error),
}

/// Errors raised while decoding a wire frame.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Frame does not start with SOH or does not end with EOT.
    #[error("frame is not delimited by SOH/EOT")]
    BadDelimiters,

    /// An escape byte was the last byte of the input.
    #[error("escape byte with no following byte")]
    UnterminatedEscape,

    /// Frame body is too short to carry a CRC.
    #[error("frame body shorter than its CRC")]
    TooShort,

    /// Received CRC does not match the payload.
    #[error("CRC mismatch: expected {expected:#06x}, got {actual:#06x}")]
    CrcMismatch {
        /// CRC computed over the received payload.
        expected: u16,
        /// CRC carried by the frame.
        actual: u16,
    },
}

/// Errors raised by the command channel.
#[derive(Debug, Error)]
pub enum CommandError {
    /// No response arrived before the deadline.
    #[error("no response within {0:?}")]
    Timeout(Duration),

    /// The port closed before the command could be written.
    #[error("cannot send command: port is not connected")]
    NotConnected,

    /// A command is already waiting for its response.
    #[error("a command is already outstanding")]
    Busy,

    /// `wait_response` was called with nothing in flight.
    #[error("no command is waiting for a response")]
    NoPendingCommand,
}

/// Errors that abort a firmware upload.
#[derive(Debug, Error)]
pub enum UploadError {
    /// A line of the image is malformed. Detected before anything is sent.
    #[error("invalid image line {line}: {reason}")]
    InvalidFormat {
        /// One-based line number.
        line: usize,
        /// What is wrong with it.
        reason: String,
    },

    /// The device stopped answering mid-upload.
    #[error("device timed out on line {line}")]
    DeviceTimeout {
        /// One-based line number.
        line: usize,
    },
}

/// Errors raised when a response does not fit the command it answers.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The response does not echo the expected command tag or is too short.
    #[error("unexpected response to command {expected:#04x}: {actual:02X?}")]
    UnexpectedResponse {
        /// Tag of the command that was sent.
        expected: u8,
        /// Raw response payload.
        actual: Vec<u8>,
    },
}

/// Error type for uartboot operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Transport error.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame decoding error.
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    /// Command channel error.
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// Upload aborted.
    #[error("Upload failed: {0}")]
    Upload(#[from] UploadError),

    /// Protocol error.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// No usable serial port was found.
    #[error("Device not found")]
    DeviceNotFound,

    /// The client was stopped while waiting.
    #[error("Client stopped")]
    Stopped,

    /// Waiting for a condition timed out.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Firmware image could not be read.
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether this error is a command response timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Command(CommandError::Timeout(_)) | Self::Timeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_error_display() {
        let err = FrameError::CrcMismatch {
            expected: 0x1021,
            actual: 0x0000,
        };
        assert_eq!(err.to_string(), "CRC mismatch: expected 0x1021, got 0x0000");
    }

    #[test]
    fn test_nested_error_display() {
        let err: Error = UploadError::DeviceTimeout { line: 3 }.into();
        assert_eq!(err.to_string(), "Upload failed: device timed out on line 3");
    }

    #[test]
    fn test_is_timeout() {
        let err: Error = CommandError::Timeout(Duration::from_millis(5)).into();
        assert!(err.is_timeout());
        assert!(!Error::Stopped.is_timeout());
    }
}
