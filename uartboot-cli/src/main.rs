//! uartboot CLI - flash hex images through a framed UART bootloader.
//!
//! ## Features
//!
//! - Query the bootloader version
//! - Upload an Intel-HEX style image line by line with a progress bar
//! - Start the flashed application
//! - Interactive serial port selection
//! - Shell completion generation
//! - Environment variable and config file support

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use console::style;
use env_logger::Env;
use log::debug;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use uartboot::{BootloaderClient, ClientConfig, SerialConnector, StopHandle, port::DEFAULT_BAUD};

mod commands;
mod config;
mod serial;

use config::Config;
use serial::{SerialOptions, ask_remember_port, select_serial_port};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Stop handle of the active client, stopped on Ctrl-C.
static ACTIVE_CLIENT: OnceLock<StopHandle> = OnceLock::new();

/// Check if emoji/animations should be used (TTY and colors enabled).
fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether Ctrl-C was pressed.
fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// CLI-level failures with a dedicated exit code.
#[derive(Debug, thiserror::Error)]
enum CliError {
    /// Bad invocation or environment (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// Cancelled by the user (exit code 130).
    #[error("{0}")]
    Cancelled(String),
}

/// Map an error to the process exit code.
fn exit_code(err: &anyhow::Error) -> u8 {
    if let Some(cli) = err.downcast_ref::<CliError>() {
        return match cli {
            CliError::Usage(_) => 2,
            CliError::Cancelled(_) => 130,
        };
    }
    match err.downcast_ref::<uartboot::Error>() {
        Some(uartboot::Error::Stopped) => 130,
        _ => 1,
    }
}

/// uartboot - flash hex images through a framed UART bootloader.
///
/// Environment variables:
///   UARTBOOT_PORT              - Default serial port
///   UARTBOOT_BAUD              - Default baud rate (default: 115200)
///   UARTBOOT_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "uartboot")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "UARTBOOT_PORT")]
    port: Option<String>,

    /// Baud rate [default: 115200].
    #[arg(short, long, global = true, env = "UARTBOOT_BAUD")]
    baud: Option<u32>,

    /// Response timeout in milliseconds [default: 2000].
    #[arg(long, global = true, value_name = "MS")]
    timeout_ms: Option<u64>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "UARTBOOT_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Confirm port selection even for auto-detected ports.
    #[arg(long, global = true)]
    confirm_port: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Query the bootloader version.
    Version,

    /// Upload a hex image.
    Flash {
        /// Path to the hex image.
        firmware: PathBuf,

        /// Start the application after a successful upload.
        #[arg(long)]
        run: bool,

        /// Accept responses whose CRC does not match.
        #[arg(long)]
        no_crc_check: bool,

        /// Shortest accepted image line.
        #[arg(long, value_name = "CHARS")]
        min_line_chars: Option<usize>,

        /// Seconds to wait for the device to appear.
        #[arg(long, value_name = "SECS", default_value = "0")]
        wait: u64,
    },

    /// Start the flashed application.
    Run,

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type (detected from $SHELL if not given).
        #[arg(value_enum)]
        shell: Option<Shell>,
    },
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn main() -> ExitCode {
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);
    if std::env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logging(&cli);
    debug!(
        "uartboot v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(e) = ctrlc::set_handler(|| {
        INTERRUPTED.store(true, Ordering::Relaxed);
        if let Some(stop) = ACTIVE_CLIENT.get() {
            stop.stop();
        }
    }) {
        debug!("Failed to install Ctrl-C handler: {e}");
    }

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err:#}", style("Error:").red().bold());
            ExitCode::from(exit_code(&err))
        },
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Version => commands::device::cmd_version(cli, &mut config),
        Commands::Flash {
            firmware,
            run,
            no_crc_check,
            min_line_chars,
            wait,
        } => commands::flash::cmd_flash(cli, &mut config, &commands::flash::FlashArgs {
            firmware,
            run: *run,
            no_crc_check: *no_crc_check,
            min_line_chars: *min_line_chars,
            wait: Duration::from_secs(*wait),
        }),
        Commands::Run => commands::device::cmd_run(cli, &mut config),
        Commands::ListPorts { json } => commands::ports::cmd_list_ports(*json),
        Commands::Completions { shell } => commands::completions::cmd_completions(*shell),
    }
}

/// Baud rate: flag or environment, then config file, then default.
fn resolve_baud(cli: &Cli, config: &Config) -> u32 {
    cli.baud
        .or(config.connection.baud)
        .unwrap_or(DEFAULT_BAUD)
}

/// Client settings: config file values, then command-line overrides.
fn client_config(cli: &Cli, config: &Config) -> ClientConfig {
    let mut client = config.client_config();
    if let Some(ms) = cli.timeout_ms {
        client.channel.response_timeout = Duration::from_millis(ms);
    }
    client
}

/// Pick the port and build a client for it.
fn open_client(
    cli: &Cli,
    config: &mut Config,
    client_config: ClientConfig,
) -> Result<BootloaderClient<SerialConnector>> {
    let options = SerialOptions {
        port: cli.port.clone(),
        non_interactive: cli.non_interactive,
        confirm_port: cli.confirm_port,
    };
    let selected = select_serial_port(&options, config)?;
    if !cli.non_interactive && use_fancy_output() {
        ask_remember_port(&selected, config)?;
    }

    let baud = resolve_baud(cli, config);
    if !cli.quiet {
        eprintln!(
            "{} Using {} at {baud} baud",
            style("🔌").cyan(),
            selected.port.name
        );
    }

    let client = BootloaderClient::new(
        SerialConnector::new(Some(selected.port.name), baud),
        client_config,
    );
    if ACTIVE_CLIENT.set(client.stop_handle()).is_err() {
        debug!("Ctrl-C handler already bound to a client");
    }
    if was_interrupted() {
        return Err(CliError::Cancelled("Interrupted".to_string()).into());
    }
    Ok(client)
}
