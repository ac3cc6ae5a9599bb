//! High-level bootloader client.
//!
//! [`BootloaderClient`] ties a [`Connector`] to a [`CommandChannel`] and
//! exposes the three bootloader operations: version query, firmware upload
//! and run. Upload progress and outcome are reported to a single observer.

use crate::channel::{ChannelConfig, CommandChannel};
use crate::error::{CommandError, Error, Result, UploadError};
use crate::image::ImageSource;
use crate::port::Port;
use crate::protocol::command::{BootloaderVersion, Command};
use crate::upload::{Progress, UploadEngine, UploadOptions, UploadReport};
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[cfg(feature = "native")]
use crate::port::{NativePort, SerialConfig};

/// Default interval between connection state polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No port open.
    Disconnected,
    /// Opening the port.
    Connecting,
    /// Port open, commands accepted.
    Connected,
    /// Terminal: the client was stopped.
    Stopped,
}

type SharedState = Arc<Mutex<ConnectionState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, ConnectionState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Stops a client from another thread (e.g. a Ctrl-C handler).
#[derive(Debug, Clone)]
pub struct StopHandle {
    state: SharedState,
}

impl StopHandle {
    /// Move the client to [`ConnectionState::Stopped`].
    pub fn stop(&self) {
        *lock(&self.state) = ConnectionState::Stopped;
    }

    /// Whether the client was stopped.
    pub fn is_stopped(&self) -> bool {
        *lock(&self.state) == ConnectionState::Stopped
    }
}

/// Opens the port a client talks through.
pub trait Connector {
    /// Port type produced.
    type Port: crate::port::Port;

    /// Open a port to the device.
    fn connect(&mut self) -> Result<Self::Port>;
}

/// Connector for native serial ports.
///
/// Uses the named port, or auto-detects a USB serial port when none is given.
#[cfg(feature = "native")]
#[derive(Debug, Clone)]
pub struct SerialConnector {
    port_name: Option<String>,
    baud_rate: u32,
    read_timeout: Duration,
}

#[cfg(feature = "native")]
impl SerialConnector {
    /// Create a connector.
    pub fn new(port_name: Option<String>, baud_rate: u32) -> Self {
        Self {
            port_name,
            baud_rate,
            read_timeout: crate::port::DEFAULT_READ_TIMEOUT,
        }
    }

    /// Set the per-read timeout of opened ports.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

#[cfg(feature = "native")]
impl Connector for SerialConnector {
    type Port = NativePort;

    fn connect(&mut self) -> Result<NativePort> {
        let name = match &self.port_name {
            Some(name) => name.clone(),
            None => crate::device::auto_detect_port()?.name,
        };
        NativePort::open(&SerialConfig::new(name, self.baud_rate).with_timeout(self.read_timeout))
    }
}

/// Client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Command channel settings.
    pub channel: ChannelConfig,
    /// Upload settings.
    pub upload: UploadOptions,
    /// Interval between polls while waiting for a connection.
    pub poll_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            upload: UploadOptions::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ClientConfig {
    /// Set the command channel settings.
    #[must_use]
    pub fn with_channel(mut self, channel: ChannelConfig) -> Self {
        self.channel = channel;
        self
    }

    /// Set the upload settings.
    #[must_use]
    pub fn with_upload(mut self, upload: UploadOptions) -> Self {
        self.upload = upload;
        self
    }

    /// Set the connection poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Notification delivered to the client observer.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Upload progressed.
    Progress(Progress),
    /// Upload finished.
    Completed {
        /// Payload bytes sent.
        total_bytes: usize,
    },
    /// Upload aborted.
    Failed {
        /// 1-based image line, when the failure is tied to one.
        line: Option<usize>,
        /// Failure description.
        reason: String,
    },
}

type Observer = Box<dyn FnMut(&ClientEvent) + Send>;

/// Bootloader client.
pub struct BootloaderClient<C: Connector> {
    connector: C,
    config: ClientConfig,
    state: SharedState,
    channel: Option<CommandChannel<C::Port>>,
    observer: Option<Observer>,
}

impl<C: Connector> BootloaderClient<C> {
    /// Create a disconnected client.
    pub fn new(connector: C, config: ClientConfig) -> Self {
        Self {
            connector,
            config,
            state: Arc::new(Mutex::new(ConnectionState::Disconnected)),
            channel: None,
            observer: None,
        }
    }

    /// Client settings.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    /// Handle that stops this client from any thread.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Register the observer, replacing any previous one.
    pub fn set_observer<F>(&mut self, observer: F)
    where
        F: FnMut(&ClientEvent) + Send + 'static,
    {
        self.observer = Some(Box::new(observer));
    }

    /// Move to `to` unless the client was stopped.
    fn transition(&self, to: ConnectionState) -> Result<()> {
        let mut state = lock(&self.state);
        if *state == ConnectionState::Stopped {
            return Err(Error::Stopped);
        }
        *state = to;
        Ok(())
    }

    /// Open the port and start accepting commands.
    pub fn connect(&mut self) -> Result<()> {
        if self.channel.is_some() {
            return Ok(());
        }
        self.transition(ConnectionState::Connecting)?;

        let port = match self.connector.connect() {
            Ok(port) => port,
            Err(e) => {
                self.transition(ConnectionState::Disconnected)?;
                return Err(e);
            },
        };
        info!("Connected to {}", port.name());
        let mut channel = CommandChannel::new(port, self.config.channel.clone());

        if let Err(e) = self.transition(ConnectionState::Connected) {
            channel.close()?;
            return Err(e);
        }
        self.channel = Some(channel);
        Ok(())
    }

    /// Wait until the client is connected, retrying the connector every
    /// poll interval.
    ///
    /// Fails with [`Error::Stopped`] as soon as the client is stopped and
    /// with [`Error::Timeout`] once `timeout` elapses. `None` waits forever.
    pub fn await_connected(&mut self, timeout: Option<Duration>) -> Result<()> {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            match self.state() {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Stopped => return Err(Error::Stopped),
                ConnectionState::Disconnected | ConnectionState::Connecting => {},
            }
            match self.connect() {
                Ok(()) => return Ok(()),
                Err(Error::Stopped) => return Err(Error::Stopped),
                Err(e) => debug!("Connection attempt failed: {e}"),
            }

            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(Error::Timeout(format!(
                    "no connection within {:?}",
                    timeout.unwrap_or_default()
                )));
            }
            std::thread::sleep(self.config.poll_interval);
        }
    }

    fn channel_mut(&mut self) -> Result<&mut CommandChannel<C::Port>> {
        if self.state() == ConnectionState::Stopped {
            return Err(Error::Stopped);
        }
        self.channel
            .as_mut()
            .ok_or(Error::Command(CommandError::NotConnected))
    }

    /// Query the bootloader version.
    pub fn version(&mut self) -> Result<BootloaderVersion> {
        let response = self.channel_mut()?.send(&Command::version())?;
        let version = BootloaderVersion::from_response(&response)?;
        info!("Bootloader version {version}");
        Ok(version)
    }

    /// Tell the bootloader to start the application. No response is expected.
    pub fn run(&mut self) -> Result<()> {
        self.channel_mut()?.post(&Command::run())?;
        info!("Run command sent");
        Ok(())
    }

    /// Upload an image, reporting progress and the outcome to the observer.
    pub fn upload<I: ImageSource + ?Sized>(&mut self, image: &I) -> Result<UploadReport> {
        let result = self.upload_lines(image);

        let event = match &result {
            Ok(report) => ClientEvent::Completed {
                total_bytes: report.total_bytes,
            },
            Err(e) => {
                warn!("Upload failed: {e}");
                ClientEvent::Failed {
                    line: failed_line(e),
                    reason: e.to_string(),
                }
            },
        };
        if let Some(observer) = self.observer.as_mut() {
            observer(&event);
        }
        result
    }

    fn upload_lines<I: ImageSource + ?Sized>(&mut self, image: &I) -> Result<UploadReport> {
        let lines = image.lines()?;
        let engine = UploadEngine::new(self.config.upload.clone());
        let stop = self.stop_handle();

        if self.state() == ConnectionState::Stopped {
            return Err(Error::Stopped);
        }
        let channel = self
            .channel
            .as_mut()
            .ok_or(Error::Command(CommandError::NotConnected))?;
        let observer = &mut self.observer;

        engine.upload_until(
            channel,
            &lines,
            |progress| {
                if let Some(observer) = observer.as_mut() {
                    observer(&ClientEvent::Progress(*progress));
                }
            },
            || stop.is_stopped(),
        )
    }

    /// Close the port.
    pub fn disconnect(&mut self) -> Result<()> {
        if let Some(mut channel) = self.channel.take() {
            channel.close()?;
            info!("Disconnected");
        }
        let mut state = lock(&self.state);
        if *state != ConnectionState::Stopped {
            *state = ConnectionState::Disconnected;
        }
        Ok(())
    }
}

fn failed_line(error: &Error) -> Option<usize> {
    match error {
        Error::Upload(
            UploadError::InvalidFormat { line, .. } | UploadError::DeviceTimeout { line },
        ) => Some(*line),
        _ => None,
    }
}
