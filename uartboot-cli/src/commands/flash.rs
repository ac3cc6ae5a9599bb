//! Flash command implementation.

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;
use std::path::Path;
use std::time::Duration;
use uartboot::{ClientEvent, HexImage};

use crate::commands::device::connect;
use crate::config::Config;
use crate::{Cli, client_config, open_client, use_fancy_output};

/// Arguments of the flash command.
pub(crate) struct FlashArgs<'a> {
    pub firmware: &'a Path,
    pub run: bool,
    pub no_crc_check: bool,
    pub min_line_chars: Option<usize>,
    pub wait: Duration,
}

fn progress_bar(cli: &Cli, total: usize) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total as u64);
    #[allow(clippy::unwrap_used)] // Static template string
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] \
                 {bytes}/{total_bytes} {msg}",
            )
            .unwrap()
            .progress_chars("#>-"),
    );
    pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    pb
}

/// Flash command implementation.
pub(crate) fn cmd_flash(cli: &Cli, config: &mut Config, args: &FlashArgs<'_>) -> Result<()> {
    if !cli.quiet {
        eprintln!(
            "{} Loading image {}",
            style("📦").cyan(),
            args.firmware.display()
        );
    }
    let image = HexImage::from_file(args.firmware)
        .with_context(|| format!("Failed to load firmware {}", args.firmware.display()))?;
    if image.is_empty() {
        warn!("{} contains no lines", args.firmware.display());
    }
    if !cli.quiet {
        eprintln!(
            "{} {} lines, {} bytes",
            style("ℹ").blue(),
            image.len(),
            image.byte_count()
        );
    }

    let mut settings = client_config(cli, config);
    if args.no_crc_check {
        settings.channel.verify_response_crc = false;
    }
    if let Some(chars) = args.min_line_chars {
        settings.upload.min_line_chars = chars;
    }

    let mut client = open_client(cli, config, settings)?;
    connect(cli, &mut client, args.wait)?;

    let pb = progress_bar(cli, image.byte_count());
    let observer_pb = pb.clone();
    client.set_observer(move |event| match event {
        ClientEvent::Progress(p) => observer_pb.set_position(p.sent as u64),
        ClientEvent::Completed { .. } => observer_pb.finish_with_message("done"),
        ClientEvent::Failed { line, reason } => {
            let at = line.map(|l| format!(" at line {l}")).unwrap_or_default();
            observer_pb.abandon_with_message(format!("failed{at}: {reason}"));
        },
    });

    let report = match client.upload(&image) {
        Ok(report) => report,
        Err(err) => {
            pb.abandon();
            client.disconnect()?;
            return Err(anyhow::Error::from(err)
                .context(format!("Upload of {} failed", args.firmware.display())));
        },
    };

    if args.run {
        if !cli.quiet {
            eprintln!("{} Starting application", style("🔄").cyan());
        }
        client.run().context("Failed to send run command")?;
    }
    client.disconnect()?;

    if !cli.quiet {
        eprintln!(
            "\n{} Flashed {} lines ({} bytes)",
            style("🎉").green().bold(),
            report.lines,
            report.total_bytes
        );
    }
    Ok(())
}
