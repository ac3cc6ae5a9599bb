//! Command/response correlation with a response deadline.
//!
//! The bootloader buffers a single frame, so the channel allows exactly one
//! command in flight. The next frame received after a command is written is
//! its response.

use crate::error::{CommandError, Error, Result, TransportError};
use crate::port::Port;
use crate::protocol::command::{Command, CommandTag, Response};
use crate::protocol::frame::build_frame;
use crate::transport::{Transport, TransportEvent};
use log::{debug, trace};
use std::time::{Duration, Instant};

/// Default time to wait for a response.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(2000);

/// Command channel settings.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// How long to wait for a response before giving up.
    pub response_timeout: Duration,
    /// Reject responses whose CRC does not match their payload.
    pub verify_response_crc: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            verify_response_crc: true,
        }
    }
}

impl ChannelConfig {
    /// Set the response timeout.
    #[must_use]
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    /// Enable or disable response CRC verification.
    #[must_use]
    pub fn with_crc_check(mut self, verify: bool) -> Self {
        self.verify_response_crc = verify;
        self
    }
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    tag: CommandTag,
    sent_at: Instant,
    deadline: Instant,
}

/// Sends commands one at a time and waits for their responses.
pub struct CommandChannel<P: Port> {
    transport: Transport<P>,
    config: ChannelConfig,
    pending: Option<Pending>,
}

impl<P: Port> CommandChannel<P> {
    /// Create a channel over an opened port.
    pub fn new(port: P, config: ChannelConfig) -> Self {
        Self {
            transport: Transport::new(port),
            config,
            pending: None,
        }
    }

    /// Channel settings.
    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Underlying transport.
    pub fn transport(&self) -> &Transport<P> {
        &self.transport
    }

    /// Mutable access to the underlying transport.
    pub fn transport_mut(&mut self) -> &mut Transport<P> {
        &mut self.transport
    }

    /// Consume the channel and return the underlying port.
    pub fn into_port(self) -> P {
        self.transport.into_port()
    }

    /// Whether a command is waiting for its response.
    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    /// Send a command and wait for its response.
    pub fn send(&mut self, command: &Command) -> Result<Response> {
        self.submit(command)?;
        self.wait_response()
    }

    /// Write a command and arm its response deadline.
    ///
    /// Fails with [`CommandError::Busy`] while another command is in flight.
    pub fn submit(&mut self, command: &Command) -> Result<()> {
        if self.pending.is_some() {
            return Err(CommandError::Busy.into());
        }
        self.write_command(command)?;

        let now = Instant::now();
        self.pending = Some(Pending {
            tag: command.tag(),
            sent_at: now,
            deadline: now + self.config.response_timeout,
        });
        Ok(())
    }

    /// Write a command that the device does not answer.
    pub fn post(&mut self, command: &Command) -> Result<()> {
        if self.pending.is_some() {
            return Err(CommandError::Busy.into());
        }
        self.write_command(command)
    }

    fn write_command(&mut self, command: &Command) -> Result<()> {
        if !self.transport.is_open() {
            return Err(CommandError::NotConnected.into());
        }
        // Anything still buffered predates this command and can't be its reply.
        self.transport.clear_receive_buffer();

        let frame = build_frame(&command.encode());
        debug!(
            "Sending {} command: {} args, {} bytes on the wire",
            command.tag(),
            command.args().len(),
            frame.len()
        );
        self.transport
            .write(&frame)
            .map_err(|e| match e {
                TransportError::NotConnected => Error::from(CommandError::NotConnected),
                e => Error::from(e),
            })
    }

    /// Wait for the response to the outstanding command.
    ///
    /// On timeout the channel is released and accepts the next command.
    pub fn wait_response(&mut self) -> Result<Response> {
        let pending = self
            .pending
            .ok_or(CommandError::NoPendingCommand)?;

        loop {
            let event = match self.transport.next_event() {
                Ok(event) => event,
                Err(e) => {
                    self.release();
                    return Err(e);
                },
            };

            match event {
                Some(TransportEvent::Payload(frame)) => {
                    self.release();
                    if self.config.verify_response_crc {
                        frame.verify()?;
                    }
                    trace!(
                        "{} response after {:?}: {:02X?}",
                        pending.tag,
                        pending.sent_at.elapsed(),
                        frame.payload
                    );
                    return Ok(Response::new(frame.into_payload()));
                },
                Some(TransportEvent::Malformed(e)) => {
                    self.release();
                    return Err(e.into());
                },
                None => {},
            }

            if Instant::now() >= pending.deadline {
                self.release();
                debug!(
                    "{} command timed out after {:?}",
                    pending.tag, self.config.response_timeout
                );
                return Err(CommandError::Timeout(self.config.response_timeout).into());
            }
        }
    }

    /// Forget the outstanding command, if any.
    pub fn cancel(&mut self) {
        if let Some(pending) = self.pending {
            debug!("Cancelling {} command", pending.tag);
        }
        self.release();
    }

    fn release(&mut self) {
        self.pending = None;
        self.transport.clear_receive_buffer();
    }

    /// Close the port.
    pub fn close(&mut self) -> Result<()> {
        self.release();
        self.transport.close()
    }
}
