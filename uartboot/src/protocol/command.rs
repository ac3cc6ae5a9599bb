//! Bootloader commands and responses.

use crate::error::ProtocolError;
use std::fmt;

/// Command tags understood by the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandTag {
    /// Query the bootloader version (0x01).
    Version = 0x01,
    /// Write one image line to flash (0x03).
    FlashLine = 0x03,
    /// Leave the bootloader and start the application (0x05).
    Run = 0x05,
}

impl CommandTag {
    /// Tag byte on the wire.
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for CommandTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version => write!(f, "version"),
            Self::FlashLine => write!(f, "flash-line"),
            Self::Run => write!(f, "run"),
        }
    }
}

/// A request to the bootloader: one tag byte plus arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    tag: CommandTag,
    args: Vec<u8>,
}

impl Command {
    /// Create a command with no arguments.
    pub fn new(tag: CommandTag) -> Self {
        Self {
            tag,
            args: Vec::new(),
        }
    }

    /// Version query.
    pub fn version() -> Self {
        Self::new(CommandTag::Version)
    }

    /// Flash one decoded image line.
    pub fn flash_line(payload: &[u8]) -> Self {
        Self {
            tag: CommandTag::FlashLine,
            args: payload.to_vec(),
        }
    }

    /// Start the application.
    pub fn run() -> Self {
        Self::new(CommandTag::Run)
    }

    /// Command tag.
    pub fn tag(&self) -> CommandTag {
        self.tag
    }

    /// Argument bytes.
    pub fn args(&self) -> &[u8] {
        &self.args
    }

    /// Encode as `tag ++ args` (unframed).
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(1 + self.args.len());
        buf.push(self.tag.as_byte());
        buf.extend_from_slice(&self.args);
        buf
    }
}

/// Payload of the frame answering a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    payload: Vec<u8>,
}

impl Response {
    /// Wrap a decoded payload.
    pub fn new(payload: Vec<u8>) -> Self {
        Self { payload }
    }

    /// Echoed command tag (first byte), if any.
    pub fn tag(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    /// Bytes following the echoed tag.
    pub fn data(&self) -> &[u8] {
        self.payload.get(1..).unwrap_or_default()
    }

    /// Full payload.
    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    /// Whether this response echoes `tag`.
    pub fn is_reply_to(&self, tag: CommandTag) -> bool {
        self.tag() == Some(tag.as_byte())
    }

    /// Fail unless this response echoes `tag`.
    pub fn expect_reply_to(&self, tag: CommandTag) -> Result<(), ProtocolError> {
        if self.is_reply_to(tag) {
            Ok(())
        } else {
            Err(self.unexpected(tag))
        }
    }

    pub(crate) fn unexpected(&self, tag: CommandTag) -> ProtocolError {
        ProtocolError::UnexpectedResponse {
            expected: tag.as_byte(),
            actual: self.payload.clone(),
        }
    }
}

/// Bootloader version reported by the version query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootloaderVersion {
    /// Major version.
    pub major: u8,
    /// Minor version.
    pub minor: u8,
}

impl BootloaderVersion {
    /// Decode a version reply.
    ///
    /// `[0x01, v]` packs major/minor into the high/low nibble of `v`;
    /// `[0x01, major, minor, ..]` carries them as whole bytes.
    pub fn from_response(response: &Response) -> Result<Self, ProtocolError> {
        response.expect_reply_to(CommandTag::Version)?;
        match *response.data() {
            [packed] => Ok(Self {
                major: packed >> 4,
                minor: packed & 0x0F,
            }),
            [major, minor, ..] => Ok(Self { major, minor }),
            [] => Err(response.unexpected(CommandTag::Version)),
        }
    }
}

impl fmt::Display for BootloaderVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}
