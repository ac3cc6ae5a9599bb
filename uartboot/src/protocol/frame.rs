//! Wire framing: control-byte escaping and frame build/parse.
//!
//! ## Frame Format
//!
//! ```text
//! +-----+----------------------------------------+-----+
//! | SOH |  escape( payload ++ CRC16(payload) )   | EOT |
//! +-----+----------------------------------------+-----+
//! | 0x01|   variable, CRC is 2 bytes low first   | 0x04|
//! +-----+----------------------------------------+-----+
//! ```
//!
//! Inside the body every SOH, EOT or ESC byte is sent as `ESC, byte`.

use crate::error::FrameError;
use crate::protocol::crc::{crc16, crc16_bytes};
use byteorder::{ByteOrder, LittleEndian};

/// Control bytes reserved by the framing layer.
pub mod control {
    /// Start of frame.
    pub const SOH: u8 = 0x01;
    /// End of frame.
    pub const EOT: u8 = 0x04;
    /// Escape prefix.
    pub const ESC: u8 = 0x10;
}

use control::{EOT, ESC, SOH};

/// Smallest complete frame: SOH, two CRC bytes, EOT.
pub const MIN_FRAME_LEN: usize = 4;

/// Whether `byte` must be escaped inside a frame body.
#[inline]
pub fn is_control(byte: u8) -> bool {
    matches!(byte, SOH | EOT | ESC)
}

/// Escape every control byte in `data`.
pub fn escape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 8);
    for &byte in data {
        if is_control(byte) {
            out.push(ESC);
        }
        out.push(byte);
    }
    out
}

/// Reverse [`escape`].
///
/// Any byte following ESC is taken literally. A lone ESC at the end is an error.
pub fn unescape(data: &[u8]) -> Result<Vec<u8>, FrameError> {
    let mut out = Vec::with_capacity(data.len());
    let mut bytes = data.iter();
    while let Some(&byte) = bytes.next() {
        if byte == ESC {
            let &next = bytes
                .next()
                .ok_or(FrameError::UnterminatedEscape)?;
            out.push(next);
        } else {
            out.push(byte);
        }
    }
    Ok(out)
}

/// Build the wire frame for a command.
pub fn build_frame(command: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(command.len() + 2);
    body.extend_from_slice(command);
    body.extend_from_slice(&crc16_bytes(command));

    let escaped = escape(&body);
    let mut frame = Vec::with_capacity(escaped.len() + 2);
    frame.push(SOH);
    frame.extend_from_slice(&escaped);
    frame.push(EOT);
    frame
}

/// A decoded frame with its CRC split off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFrame {
    /// Frame payload (CRC removed).
    pub payload: Vec<u8>,
    /// CRC carried by the frame.
    pub crc: u16,
}

impl ParsedFrame {
    /// Check the carried CRC against the payload.
    pub fn verify(&self) -> Result<(), FrameError> {
        let expected = crc16(&self.payload);
        if expected == self.crc {
            Ok(())
        } else {
            Err(FrameError::CrcMismatch {
                expected,
                actual: self.crc,
            })
        }
    }

    /// Consume the frame, keeping the payload.
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// Parse a complete raw frame (SOH through EOT).
///
/// The CRC is split off but not checked; see [`ParsedFrame::verify`].
pub fn parse_frame(raw: &[u8]) -> Result<ParsedFrame, FrameError> {
    let interior = match raw {
        [SOH, interior @ .., EOT] => interior,
        _ => return Err(FrameError::BadDelimiters),
    };

    let mut body = unescape(interior)?;
    if body.len() < 2 {
        return Err(FrameError::TooShort);
    }

    let split = body.len() - 2;
    let crc = LittleEndian::read_u16(&body[split..]);
    body.truncate(split);

    Ok(ParsedFrame { payload: body, crc })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_control_bytes() {
        assert_eq!(
            escape(&[0x00, SOH, 0x7F, EOT, ESC, 0xFF]),
            vec![0x00, ESC, SOH, 0x7F, ESC, EOT, ESC, ESC, 0xFF]
        );
    }

    #[test]
    fn test_escape_passthrough() {
        let data = [0x02, 0x03, 0x05, 0x0F, 0x11, 0xAA];
        assert_eq!(escape(&data), data.to_vec());
    }

    #[test]
    fn test_unescape_inverts_escape() {
        let samples: [&[u8]; 6] = [
            &[],
            &[SOH],
            &[ESC, ESC, ESC],
            &[EOT, SOH, ESC, 0x42],
            &[0x10, 0x04, 0x10, 0x01, 0x10],
            &[0x55, 0x01, 0x01, 0x04, 0x04, 0x99],
        ];
        for sample in samples {
            assert_eq!(unescape(&escape(sample)).unwrap(), sample, "{sample:02X?}");
        }

        // Every control-byte combination up to three bytes long.
        let alphabet = [SOH, EOT, ESC, 0x00];
        for a in alphabet {
            for b in alphabet {
                for c in alphabet {
                    let data = [a, b, c];
                    assert_eq!(unescape(&escape(&data)).unwrap(), data);
                }
            }
        }
    }

    #[test]
    fn test_unescape_trailing_escape() {
        assert_eq!(
            unescape(&[0x01, ESC]),
            Err(FrameError::UnterminatedEscape)
        );
    }

    #[test]
    fn test_build_frame_version_query() {
        // crc16([0x01]) = 0x1021 -> [0x21, 0x10]; both SOH and ESC escaped.
        assert_eq!(
            build_frame(&[0x01]),
            vec![SOH, ESC, 0x01, 0x21, ESC, 0x10, EOT]
        );
    }

    #[test]
    fn test_build_frame_run() {
        // crc16([0x05]) = 0x50A5.
        assert_eq!(build_frame(&[0x05]), vec![SOH, 0x05, 0xA5, 0x50, EOT]);
    }

    #[test]
    fn test_parse_build_roundtrip() {
        let commands: [&[u8]; 4] = [
            &[0x01],
            &[0x03, 0x01, 0x04, 0x10, 0xFF],
            &[0x05],
            &[],
        ];
        for command in commands {
            let frame = parse_frame(&build_frame(command)).unwrap();
            assert_eq!(frame.payload, command);
            assert!(frame.verify().is_ok());
        }
    }

    #[test]
    fn test_parse_frame_bad_delimiters() {
        assert_eq!(parse_frame(&[]), Err(FrameError::BadDelimiters));
        assert_eq!(parse_frame(&[SOH]), Err(FrameError::BadDelimiters));
        assert_eq!(
            parse_frame(&[0x00, 0x05, 0xA5, 0x50, EOT]),
            Err(FrameError::BadDelimiters)
        );
        assert_eq!(
            parse_frame(&[SOH, 0x05, 0xA5, 0x50]),
            Err(FrameError::BadDelimiters)
        );
    }

    #[test]
    fn test_parse_frame_too_short() {
        assert_eq!(parse_frame(&[SOH, 0x05, EOT]), Err(FrameError::TooShort));
    }

    #[test]
    fn test_parse_frame_crc_mismatch() {
        let frame = parse_frame(&[SOH, 0x05, 0x00, 0x00, EOT]).unwrap();
        assert_eq!(frame.payload, vec![0x05]);
        assert_eq!(
            frame.verify(),
            Err(FrameError::CrcMismatch {
                expected: 0x50A5,
                actual: 0x0000,
            })
        );
    }
}
