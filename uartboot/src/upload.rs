//! Line-by-line firmware upload.
//!
//! Each image line becomes one flash-line command (`0x03 ++ bytes`). Lines go
//! out strictly in order and a line is only sent after the previous one was
//! answered. The whole image is decoded before the first byte is sent, so a
//! malformed file never leaves the device half flashed.

use crate::channel::CommandChannel;
use crate::error::{CommandError, Error, Result, UploadError};
use crate::port::Port;
use crate::protocol::command::{Command, CommandTag};
use log::{debug, info, trace};

/// Shortest accepted line: marker plus six hex digits.
pub const MIN_LINE_CHARS: usize = 7;

/// Upload progress snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// Total payload bytes in the image.
    pub total: usize,
    /// Payload bytes acknowledged so far.
    pub sent: usize,
    /// `sent / total`, from 0.0 to 1.0.
    pub percent: f64,
}

impl Progress {
    #[allow(clippy::cast_precision_loss)]
    fn new(total: usize, sent: usize) -> Self {
        let percent = if total == 0 {
            1.0
        } else {
            sent as f64 / total as f64
        };
        Self {
            total,
            sent,
            percent,
        }
    }
}

/// Upload settings.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Lines shorter than this are rejected.
    pub min_line_chars: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            min_line_chars: MIN_LINE_CHARS,
        }
    }
}

impl UploadOptions {
    /// Set the minimum line length.
    #[must_use]
    pub fn with_min_line_chars(mut self, chars: usize) -> Self {
        self.min_line_chars = chars;
        self
    }
}

/// Outcome of a completed upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadReport {
    /// Lines sent.
    pub lines: usize,
    /// Payload bytes sent.
    pub total_bytes: usize,
}

/// State of one upload, from the decoded image to the last acknowledged line.
#[derive(Debug)]
pub struct UploadJob {
    payloads: Vec<Vec<u8>>,
    total_bytes: usize,
    bytes_sent: usize,
    line_index: usize,
    last_reported_sent: usize,
    last_reported: f64,
}

impl UploadJob {
    /// Validate and decode every line of an image.
    pub fn prepare<S: AsRef<str>>(
        lines: &[S],
        options: &UploadOptions,
    ) -> std::result::Result<Self, UploadError> {
        let payloads = lines
            .iter()
            .enumerate()
            .map(|(i, line)| decode_line(line.as_ref(), i + 1, options.min_line_chars))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let total_bytes = payloads.iter().map(Vec::len).sum();

        Ok(Self {
            payloads,
            total_bytes,
            bytes_sent: 0,
            line_index: 0,
            last_reported_sent: 0,
            last_reported: 0.0,
        })
    }

    /// Total payload bytes.
    pub fn total_bytes(&self) -> usize {
        self.total_bytes
    }

    /// Payload bytes acknowledged so far.
    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    /// Zero-based index of the next line to send.
    pub fn line_index(&self) -> usize {
        self.line_index
    }

    /// Number of lines in the job.
    pub fn line_count(&self) -> usize {
        self.payloads.len()
    }

    /// Last progress fraction reported to the observer.
    pub fn last_reported(&self) -> f64 {
        self.last_reported
    }

    /// Whether every line has been acknowledged.
    pub fn is_finished(&self) -> bool {
        self.line_index >= self.payloads.len()
    }

    /// Current progress.
    pub fn progress(&self) -> Progress {
        Progress::new(self.total_bytes, self.bytes_sent)
    }

    /// Payload of the next line to send.
    pub fn next_payload(&self) -> Option<&[u8]> {
        self.payloads
            .get(self.line_index)
            .map(Vec::as_slice)
    }

    /// Record the current line as acknowledged.
    ///
    /// Returns a progress notification when it advanced by at least one
    /// percentage point since the last one, or reached completion.
    pub fn record_sent(&mut self) -> Option<Progress> {
        let len = self.payloads.get(self.line_index)?.len();
        self.line_index += 1;
        self.bytes_sent += len;

        let advanced = (self.bytes_sent - self.last_reported_sent) * 100 >= self.total_bytes;
        let completed = self.bytes_sent == self.total_bytes;
        if !(advanced || completed) || self.bytes_sent == self.last_reported_sent {
            return None;
        }

        let progress = self.progress();
        self.last_reported_sent = self.bytes_sent;
        self.last_reported = progress.percent;
        Some(progress)
    }
}

fn hex_nibble(digit: u8) -> Option<u8> {
    char::from(digit).to_digit(16).and_then(|d| u8::try_from(d).ok())
}

fn decode_line(
    line: &str,
    number: usize,
    min_chars: usize,
) -> std::result::Result<Vec<u8>, UploadError> {
    let invalid = |reason: String| UploadError::InvalidFormat {
        line: number,
        reason,
    };

    if line.len() < min_chars {
        return Err(invalid(format!(
            "{} characters, expected at least {min_chars}",
            line.len()
        )));
    }

    // Skip the marker character (':' for Intel-HEX).
    let mut chars = line.chars();
    chars.next();
    let digits = chars.as_str().as_bytes();
    if digits.len() % 2 != 0 {
        return Err(invalid(format!("odd number of hex digits ({})", digits.len())));
    }

    digits
        .chunks_exact(2)
        .map(|pair| match (hex_nibble(pair[0]), hex_nibble(pair[1])) {
            (Some(high), Some(low)) => Ok((high << 4) | low),
            _ => Err(invalid(format!(
                "invalid hex pair {:?}",
                String::from_utf8_lossy(pair)
            ))),
        })
        .collect()
}

/// Drives a [`CommandChannel`] through an image, one line at a time.
#[derive(Debug, Clone, Default)]
pub struct UploadEngine {
    options: UploadOptions,
}

impl UploadEngine {
    /// Create an engine with the given options.
    pub fn new(options: UploadOptions) -> Self {
        Self { options }
    }

    /// Upload settings.
    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    /// Upload `lines`, calling `on_progress` as lines are acknowledged.
    ///
    /// A device timeout aborts the job with [`UploadError::DeviceTimeout`];
    /// the upload must then be restarted from the first line.
    pub fn upload<P, S, F>(
        &self,
        channel: &mut CommandChannel<P>,
        lines: &[S],
        on_progress: F,
    ) -> Result<UploadReport>
    where
        P: Port,
        S: AsRef<str>,
        F: FnMut(&Progress),
    {
        self.upload_until(channel, lines, on_progress, || false)
    }

    /// Like [`upload`](Self::upload), but checks `should_stop` before each
    /// line and aborts with [`Error::Stopped`] once it returns `true`.
    pub fn upload_until<P, S, F, C>(
        &self,
        channel: &mut CommandChannel<P>,
        lines: &[S],
        mut on_progress: F,
        should_stop: C,
    ) -> Result<UploadReport>
    where
        P: Port,
        S: AsRef<str>,
        F: FnMut(&Progress),
        C: Fn() -> bool,
    {
        let mut job = UploadJob::prepare(lines, &self.options)?;
        info!(
            "Uploading {} lines ({} bytes)",
            job.line_count(),
            job.total_bytes()
        );

        while let Some(payload) = job.next_payload() {
            let number = job.line_index() + 1;
            if should_stop() {
                info!("Upload stopped before line {number}");
                return Err(Error::Stopped);
            }
            trace!("Line {number}: {} bytes", payload.len());

            let command = Command::flash_line(payload);
            let response = channel
                .send(&command)
                .map_err(|e| match e {
                    Error::Command(CommandError::Timeout(_)) => {
                        debug!("Device timed out on line {number}");
                        UploadError::DeviceTimeout { line: number }.into()
                    },
                    e => e,
                })?;
            response.expect_reply_to(CommandTag::FlashLine)?;

            if let Some(progress) = job.record_sent() {
                on_progress(&progress);
            }
        }

        info!("Upload complete: {} bytes", job.bytes_sent());
        Ok(UploadReport {
            lines: job.line_count(),
            total_bytes: job.total_bytes(),
        })
    }
}
