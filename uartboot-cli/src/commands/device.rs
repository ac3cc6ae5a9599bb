//! Commands that talk to the bootloader without an image: version and run.

use anyhow::{Context, Result};
use console::style;
use std::time::Duration;
use uartboot::{BootloaderClient, SerialConnector};

use crate::config::Config;
use crate::{Cli, client_config, open_client};

/// Open the port, waiting up to `wait` for the device to appear.
pub(crate) fn connect(
    cli: &Cli,
    client: &mut BootloaderClient<SerialConnector>,
    wait: Duration,
) -> Result<()> {
    if wait.is_zero() {
        client.connect().context("Failed to open serial port")?;
    } else {
        if !cli.quiet {
            eprintln!("{} Waiting for device...", style("⏳").yellow());
        }
        client
            .await_connected(Some(wait))
            .context("Device did not appear")?;
    }
    if !cli.quiet {
        eprintln!("{} Connected", style("✓").green());
    }
    Ok(())
}

/// Version command implementation. Prints the version to stdout.
pub(crate) fn cmd_version(cli: &Cli, config: &mut Config) -> Result<()> {
    let mut client = open_client(cli, config, client_config(cli, config))?;
    connect(cli, &mut client, Duration::ZERO)?;

    let version = client
        .version()
        .context("Version query failed")?;
    println!("{version}");

    client.disconnect()?;
    Ok(())
}

/// Run command implementation.
pub(crate) fn cmd_run(cli: &Cli, config: &mut Config) -> Result<()> {
    let mut client = open_client(cli, config, client_config(cli, config))?;
    connect(cli, &mut client, Duration::ZERO)?;

    client.run().context("Failed to send run command")?;
    client.disconnect()?;

    if !cli.quiet {
        eprintln!("{} Application started", style("🚀").green());
    }
    Ok(())
}
