//! In-memory port for unit tests.
//!
//! Reads and writes are kept in separate buffers. An optional responder plays
//! the device: every frame written is decoded, handed to the responder, and
//! the reply (if any) is framed and queued for reading.

use crate::error::Result;
use crate::port::Port;
use crate::protocol::frame::{build_frame, parse_frame};
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

#[derive(Default)]
struct MockState {
    rx: VecDeque<u8>,
    writes: Vec<Vec<u8>>,
    closed: bool,
    fail_writes: bool,
}

/// Shared view of a [`MockPort`] that stays usable after the port moved.
#[derive(Clone, Default)]
pub(crate) struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockHandle {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Queue raw bytes for the host to read.
    pub(crate) fn push_rx(&self, bytes: &[u8]) {
        self.lock().rx.extend(bytes);
    }

    /// Every write performed so far, one entry per frame.
    pub(crate) fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    /// Decoded command payloads written so far.
    pub(crate) fn commands(&self) -> Vec<Vec<u8>> {
        self.writes()
            .iter()
            .map(|w| parse_frame(w).unwrap().payload)
            .collect()
    }

    /// Simulate the device disappearing.
    pub(crate) fn close(&self) {
        self.lock().closed = true;
    }

    /// Make every write fail while the port still reports open.
    pub(crate) fn fail_writes(&self) {
        self.lock().fail_writes = true;
    }
}

pub(crate) struct MockPort {
    handle: MockHandle,
    responder: Option<Responder>,
    chunk: usize,
    poll_delay: Duration,
}

impl MockPort {
    pub(crate) fn new() -> (Self, MockHandle) {
        let handle = MockHandle::default();
        let port = Self {
            handle: handle.clone(),
            responder: None,
            chunk: usize::MAX,
            poll_delay: Duration::from_millis(1),
        };
        (port, handle)
    }

    /// A port whose device answers each command via `responder`.
    pub(crate) fn with_device<F>(responder: F) -> (Self, MockHandle)
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        let (mut port, handle) = Self::new();
        port.responder = Some(Box::new(responder));
        (port, handle)
    }

    /// Deliver at most `chunk` bytes per read.
    pub(crate) fn with_chunk(mut self, chunk: usize) -> Self {
        self.chunk = chunk;
        self
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.handle.lock();
        if state.rx.is_empty() {
            drop(state);
            std::thread::sleep(self.poll_delay);
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(state.rx.len()).min(self.chunk);
        for b in buf.iter_mut().take(n) {
            *b = state.rx.pop_front().unwrap();
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        {
            let state = self.handle.lock();
            if state.closed {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device gone"));
            }
            if state.fail_writes {
                return Err(io::Error::other("write rejected"));
            }
        }
        self.handle.lock().writes.push(buf.to_vec());
        if let Some(responder) = self.responder.as_mut() {
            let command = parse_frame(buf).unwrap().payload;
            if let Some(reply) = responder(&command) {
                self.handle.push_rx(&build_frame(&reply));
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for MockPort {
    fn name(&self) -> &str {
        "mock"
    }

    fn is_open(&self) -> bool {
        !self.handle.lock().closed
    }

    fn close(&mut self) -> Result<()> {
        self.handle.close();
        Ok(())
    }
}
