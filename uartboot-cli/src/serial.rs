//! Interactive serial port selection.
//!
//! - Explicit `--port` / `UARTBOOT_PORT` wins, then the configured port
//! - Otherwise USB serial ports are discovered and ranked
//! - Several candidates prompt via dialoguer, or fail in non-interactive mode

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    console::style,
    dialoguer::{Confirm, Error as DialoguerError, Select, theme::ColorfulTheme},
    log::{debug, error, info},
    std::io::IsTerminal,
    uartboot::{DetectedPort, DeviceKind, device::discover_ports},
};

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI or environment.
    pub port: Option<String>,
    /// Non-interactive mode (fail instead of prompting).
    pub non_interactive: bool,
    /// Confirm even a single recognised port.
    pub confirm_port: bool,
}

/// Selected port, and whether it came from an explicit setting.
#[derive(Debug, Clone)]
pub struct SelectedPort {
    /// The selected port.
    pub port: DetectedPort,
    /// Whether the port was given by flag, environment or config.
    pub configured: bool,
}

fn usage_err(message: &str) -> anyhow::Error {
    CliError::Usage(message.to_string()).into()
}

fn named_port(name: &str) -> DetectedPort {
    DetectedPort {
        name: name.to_string(),
        device: DeviceKind::Unknown,
        is_usb: false,
        vid: None,
        pid: None,
        product: None,
    }
}

/// Narrow discovered ports to USB serial ports when there are any.
fn candidates(ports: Vec<DetectedPort>) -> Vec<DetectedPort> {
    if ports.iter().any(DetectedPort::is_usb_serial) {
        ports
            .into_iter()
            .filter(DetectedPort::is_usb_serial)
            .collect()
    } else {
        ports
    }
}

fn select_non_interactive_port(mut ports: Vec<DetectedPort>) -> Result<DetectedPort> {
    match ports.len() {
        0 => Err(usage_err("No serial ports available")),
        1 => Ok(ports.remove(0)),
        n => Err(usage_err(&format!(
            "Found multiple serial ports ({n}); pass --port to choose one"
        ))),
    }
}

/// Select a serial port interactively or automatically.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<SelectedPort> {
    if let Some(name) = &options.port {
        return Ok(SelectedPort {
            port: named_port(name),
            configured: true,
        });
    }

    if let Some(name) = &config.connection.port {
        debug!("Using port from config: {name}");
        return Ok(SelectedPort {
            port: named_port(name),
            configured: true,
        });
    }

    let ports = candidates(discover_ports());
    if ports.is_empty() {
        return Err(usage_err("No serial ports found"));
    }

    if options.non_interactive {
        let port = select_non_interactive_port(ports)?;
        info!("Auto-selected port: {}", port.name);
        return Ok(SelectedPort {
            port,
            configured: false,
        });
    }

    let port = if ports.len() > 1 {
        ensure_interactive_terminal()?;
        select_port_interactive(ports)?
    } else {
        let port = select_non_interactive_port(ports)?;
        if port.device.is_known() && !options.confirm_port {
            info!("Auto-selected port: {} [{}]", port.name, port.device.name());
            port
        } else {
            ensure_interactive_terminal()?;
            confirm_single_port(port)?
        }
    };

    Ok(SelectedPort {
        port,
        configured: false,
    })
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(usage_err(
            "Port selection needs an interactive terminal; pass --port",
        ))
    }
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("Port selection cancelled".to_string()).into()
            } else {
                usage_err("Port prompt failed")
            }
        },
    }
}

fn port_label(port: &DetectedPort) -> String {
    let device_info = if port.device.is_known() {
        format!(" [{}]", style(port.device.name()).yellow())
    } else if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        format!(" ({vid:04X}:{pid:04X})")
    } else {
        String::new()
    };
    let product = port
        .product
        .as_ref()
        .map(|p| format!(" - {}", style(p).dim()))
        .unwrap_or_default();
    format!("{}{device_info}{product}", port.name)
}

fn select_port_interactive(ports: Vec<DetectedPort>) -> Result<DetectedPort> {
    eprintln!(
        "{} Found {} serial ports",
        style("ℹ").blue(),
        ports.len()
    );

    let term_width = console::Term::stderr().size().1 as usize;
    let max_item_width = term_width.saturating_sub(4);
    let labels: Vec<String> = ports
        .iter()
        .map(|p| console::truncate_str(&port_label(p), max_item_width, "\u{2026}").into_owned())
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select the bootloader port")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match selection {
        Some(index) => ports
            .into_iter()
            .nth(index)
            .ok_or_else(|| anyhow::anyhow!("Invalid port index: {index}")),
        None => Err(CliError::Cancelled("Port selection cancelled".to_string()).into()),
    }
}

fn confirm_single_port(port: DetectedPort) -> Result<DetectedPort> {
    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Use {}?", port_label(&port)))
        .default(true)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        Ok(port)
    } else {
        Err(CliError::Cancelled("Port selection cancelled".to_string()).into())
    }
}

/// Offer to remember a discovered port in the local config file.
pub fn ask_remember_port(selected: &SelectedPort, config: &mut Config) -> Result<()> {
    if selected.configured {
        return Ok(());
    }

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Remember {} for next time?", selected.port.name))
        .default(false)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        if let Err(e) = config.save_port(&selected.port.name) {
            error!("Failed to save port configuration: {e}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(name: &str, is_usb: bool) -> DetectedPort {
        DetectedPort {
            is_usb,
            ..named_port(name)
        }
    }

    #[test]
    fn test_explicit_port_wins() {
        let mut config = Config::default();
        config.connection.port = Some("/dev/ttyUSB9".to_string());
        let options = SerialOptions {
            port: Some("COM3".to_string()),
            ..Default::default()
        };

        let selected = select_serial_port(&options, &config).unwrap();
        assert_eq!(selected.port.name, "COM3");
        assert!(selected.configured);
    }

    #[test]
    fn test_config_port_used() {
        let mut config = Config::default();
        config.connection.port = Some("/dev/ttyUSB9".to_string());

        let selected = select_serial_port(&SerialOptions::default(), &config).unwrap();
        assert_eq!(selected.port.name, "/dev/ttyUSB9");
    }

    #[test]
    fn test_candidates_prefer_usb() {
        let ports = candidates(vec![
            port("/dev/ttyS0", false),
            port("/dev/ttyACM0", false),
            port("/dev/cu.usbserial", true),
        ]);
        let names: Vec<_> = ports.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["/dev/ttyACM0", "/dev/cu.usbserial"]);
    }

    #[test]
    fn test_candidates_fall_back_to_all() {
        let ports = candidates(vec![port("/dev/ttyS0", false), port("/dev/ttyS1", false)]);
        assert_eq!(ports.len(), 2);
    }

    #[test]
    fn test_non_interactive_single_port() {
        let port = select_non_interactive_port(vec![port("/dev/ttyUSB0", true)]).unwrap();
        assert_eq!(port.name, "/dev/ttyUSB0");
    }

    #[test]
    fn test_non_interactive_multiple_ports_is_usage_error() {
        let err = select_non_interactive_port(vec![
            port("/dev/ttyUSB0", true),
            port("/dev/ttyUSB1", true),
        ])
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::Usage(msg)) if msg.contains("multiple")
        ));
    }

    #[test]
    fn test_non_interactive_no_ports_is_usage_error() {
        let err = select_non_interactive_port(Vec::new()).unwrap_err();
        assert!(matches!(err.downcast_ref::<CliError>(), Some(CliError::Usage(_))));
    }

    #[test]
    fn test_port_label_plain() {
        console::set_colors_enabled(false);
        let mut p = port("/dev/ttyUSB0", true);
        p.vid = Some(0x1234);
        p.pid = Some(0x0001);
        p.product = Some("Board".to_string());
        assert_eq!(port_label(&p), "/dev/ttyUSB0 (1234:0001) - Board");
    }
}
