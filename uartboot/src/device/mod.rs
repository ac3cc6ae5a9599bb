//! Serial port discovery and classification.
//!
//! Bootloader boards are almost always reached through a USB-to-UART bridge,
//! so discovery ranks USB ports ahead of on-board UARTs.

use crate::error::{Error, Result};
use crate::port::PortInfo;
use log::info;

/// Known USB bridge kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DeviceKind {
    /// CH340/CH341 USB-to-Serial converter.
    Ch340,
    /// Silicon Labs CP210x USB-to-Serial converter.
    Cp210x,
    /// FTDI FT232/FT2232/FT4232 USB-to-Serial converter.
    Ftdi,
    /// Prolific PL2303 USB-to-Serial converter.
    Prolific,
    /// Unknown device.
    Unknown,
}

const KNOWN_USB_DEVICES: &[(u16, &[u16], DeviceKind)] = &[
    (
        0x1A86,
        &[0x7523, 0x7522, 0x5523, 0x5512, 0x55D4],
        DeviceKind::Ch340,
    ),
    (0x10C4, &[0xEA60, 0xEA70, 0xEA71, 0xEA63], DeviceKind::Cp210x),
    (
        0x0403,
        &[0x6001, 0x6010, 0x6011, 0x6014, 0x6015],
        DeviceKind::Ftdi,
    ),
    (0x067B, &[0x2303, 0x23A3, 0x23C3, 0x23D3], DeviceKind::Prolific),
];

impl DeviceKind {
    /// Classify a USB VID/PID pair.
    #[must_use]
    pub fn from_vid_pid(vid: u16, pid: u16) -> Self {
        KNOWN_USB_DEVICES
            .iter()
            .find(|(known_vid, pids, _)| vid == *known_vid && pids.contains(&pid))
            .map_or(Self::Unknown, |(_, _, kind)| *kind)
    }

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Ch340 => "CH340/CH341",
            Self::Cp210x => "CP210x",
            Self::Ftdi => "FTDI",
            Self::Prolific => "PL2303",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether this is a recognised bridge.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// A port found during discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DetectedPort {
    /// Port name/path (e.g. "/dev/ttyUSB0" or "COM3").
    pub name: String,
    /// Bridge classification.
    pub device: DeviceKind,
    /// Whether the port sits on a USB bus.
    pub is_usb: bool,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Product string (if available).
    pub product: Option<String>,
}

impl From<PortInfo> for DetectedPort {
    fn from(info: PortInfo) -> Self {
        let device = match (info.vid, info.pid) {
            (Some(vid), Some(pid)) => DeviceKind::from_vid_pid(vid, pid),
            _ => DeviceKind::Unknown,
        };
        Self {
            name: info.name,
            device,
            is_usb: info.is_usb,
            vid: info.vid,
            pid: info.pid,
            product: info.product,
        }
    }
}

impl DetectedPort {
    /// Whether this looks like a USB serial device.
    pub fn is_usb_serial(&self) -> bool {
        self.is_usb || self.name.contains("USB") || self.name.contains("ACM")
    }

    fn rank(&self) -> u8 {
        match (self.device.is_known(), self.is_usb_serial()) {
            (true, _) => 0,
            (false, true) => 1,
            (false, false) => 2,
        }
    }
}

/// Classify and order ports: known bridges, then other USB serial ports, then
/// everything else. Order within a group is preserved.
pub fn rank_ports(ports: Vec<PortInfo>) -> Vec<DetectedPort> {
    let mut detected: Vec<DetectedPort> = ports.into_iter().map(DetectedPort::from).collect();
    detected.sort_by_key(DetectedPort::rank);
    detected
}

/// Pick the best USB serial candidate.
pub fn select_port(ports: Vec<PortInfo>) -> Result<DetectedPort> {
    let port = rank_ports(ports)
        .into_iter()
        .find(DetectedPort::is_usb_serial)
        .ok_or(Error::DeviceNotFound)?;

    if port.device.is_known() {
        info!("Auto-detected {} USB-UART bridge: {}", port.device.name(), port.name);
    } else {
        info!("Auto-detected USB serial port: {}", port.name);
    }
    Ok(port)
}

/// All ports on this host, ranked.
#[cfg(feature = "native")]
pub fn discover_ports() -> Vec<DetectedPort> {
    use crate::port::{NativePortEnumerator, PortEnumerator};

    match NativePortEnumerator::list_ports() {
        Ok(ports) => rank_ports(ports),
        Err(e) => {
            log::debug!("Failed to enumerate serial ports: {e}");
            Vec::new()
        },
    }
}

/// Auto-detect the USB serial port a bootloader is most likely behind.
#[cfg(feature = "native")]
pub fn auto_detect_port() -> Result<DetectedPort> {
    use crate::port::{NativePortEnumerator, PortEnumerator};

    select_port(NativePortEnumerator::list_ports()?)
}

/// Format ports for display.
pub fn format_port_list(ports: &[DetectedPort]) -> Vec<String> {
    ports
        .iter()
        .map(|port| {
            let device_info = if port.device.is_known() {
                format!(" [{}]", port.device.name())
            } else if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
                format!(" [VID:{vid:04X} PID:{pid:04X}]")
            } else {
                String::new()
            };
            let product_info = port
                .product
                .as_ref()
                .map(|p| format!(" - {p}"))
                .unwrap_or_default();
            format!("{}{device_info}{product_info}", port.name)
        })
        .collect()
}
