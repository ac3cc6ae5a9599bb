//! `list-ports`: discovered ports on stderr, or a JSON array on stdout.

use anyhow::Result;
use console::style;
use uartboot::DetectedPort;
use uartboot::device::{discover_ports, format_port_list};

/// JSON rendering of the ranked port list.
fn ports_json(ports: &[DetectedPort]) -> Result<String> {
    Ok(serde_json::to_string_pretty(ports)?)
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(json: bool) -> Result<()> {
    let ports = discover_ports();

    if json {
        println!("{}", ports_json(&ports)?);
        return Ok(());
    }

    eprintln!("{}", style("Serial ports").bold().underlined());
    if ports.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }
    for line in format_port_list(&ports) {
        eprintln!("  {} {line}", style("•").green());
    }

    // Ranking already put the best candidate first.
    if let Some(best) = ports.iter().find(|p| p.is_usb_serial()) {
        eprintln!(
            "\n{} Auto-detected: {}",
            style("→").green().bold(),
            style(&best.name).cyan().bold()
        );
    }
    Ok(())
}
