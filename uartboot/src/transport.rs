//! Frame reassembly on top of a [`Port`].
//!
//! Raw bytes arrive in arbitrary chunks. The transport accumulates them until
//! an unescaped EOT closes a frame, decodes the frame, and queues the result
//! as a [`TransportEvent`]. Partial frames survive across reads.

use crate::error::{FrameError, Result, TransportError};
use crate::port::Port;
use crate::protocol::frame::{MIN_FRAME_LEN, ParsedFrame, control, parse_frame};
use log::{debug, trace};
use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

/// Read buffer size for one poll of the port.
const READ_CHUNK: usize = 256;

/// Something the transport recognised in the inbound byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A complete frame was decoded.
    Payload(ParsedFrame),
    /// A complete frame was delimited but could not be decoded.
    Malformed(FrameError),
}

/// Byte-stream transport owning one open port.
pub struct Transport<P: Port> {
    port: P,
    rx: Vec<u8>,
    escaped: bool,
    events: VecDeque<TransportEvent>,
}

impl<P: Port> Transport<P> {
    /// Wrap an opened port.
    pub fn new(port: P) -> Self {
        Self {
            port,
            rx: Vec::new(),
            escaped: false,
            events: VecDeque::new(),
        }
    }

    /// Whether the underlying port is open.
    pub fn is_open(&self) -> bool {
        self.port.is_open()
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Get a mutable reference to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Consume the transport and return the underlying port.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Write bytes, returning once the port accepted them.
    pub fn write(&mut self, bytes: &[u8]) -> std::result::Result<(), TransportError> {
        if !self.port.is_open() {
            return Err(TransportError::NotConnected);
        }
        trace!("TX {} bytes: {:02X?}", bytes.len(), bytes);
        self.port
            .write_all_bytes(bytes)
            .map_err(TransportError::WriteFailed)
    }

    /// Feed received bytes into the accumulator, queueing completed frames.
    pub fn feed(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.push_byte(byte);
        }
    }

    fn push_byte(&mut self, byte: u8) {
        if self.rx.is_empty() && byte != control::SOH {
            trace!("Dropping stray byte 0x{byte:02X}");
            return;
        }
        self.rx.push(byte);

        if self.escaped {
            self.escaped = false;
            return;
        }
        match byte {
            control::ESC => self.escaped = true,
            control::EOT if self.rx.len() >= MIN_FRAME_LEN => self.complete_frame(),
            _ => {},
        }
    }

    fn complete_frame(&mut self) {
        let event = match parse_frame(&self.rx) {
            Ok(frame) => TransportEvent::Payload(frame),
            Err(e) => {
                debug!("Malformed frame {:02X?}: {e}", self.rx);
                TransportEvent::Malformed(e)
            },
        };
        self.rx.clear();
        self.events.push_back(event);
    }

    /// Next event, reading from the port once if none is queued.
    ///
    /// Returns `Ok(None)` when the read timed out without completing a frame.
    pub fn next_event(&mut self) -> Result<Option<TransportEvent>> {
        if let Some(event) = self.events.pop_front() {
            return Ok(Some(event));
        }
        if !self.port.is_open() {
            return Err(TransportError::NotConnected.into());
        }

        let mut buf = [0u8; READ_CHUNK];
        match self.port.read(&mut buf) {
            Ok(0) => {},
            Ok(n) => {
                trace!("RX {n} bytes: {:02X?}", &buf[..n]);
                self.feed(&buf[..n]);
            },
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {},
            Err(e) if e.kind() == ErrorKind::Interrupted => {},
            Err(e) => return Err(e.into()),
        }
        Ok(self.events.pop_front())
    }

    /// Drop any partial frame and undelivered events.
    pub fn clear_receive_buffer(&mut self) {
        if !self.rx.is_empty() || !self.events.is_empty() {
            trace!(
                "Discarding {} buffered bytes and {} events",
                self.rx.len(),
                self.events.len()
            );
        }
        self.rx.clear();
        self.escaped = false;
        self.events.clear();
    }

    /// Number of bytes of an incomplete frame held in the accumulator.
    pub fn pending_bytes(&self) -> usize {
        self.rx.len()
    }

    /// Close the port.
    pub fn close(&mut self) -> Result<()> {
        self.clear_receive_buffer();
        self.port.close()
    }
}
