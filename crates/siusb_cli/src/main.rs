//! siusb: command-line access to SILAB USB boards.
//!
//! Lists attached boards, shows their identity, loads the FPGA, inspects
//! bitstream files and reads or writes any subsystem directly.

#![warn(missing_docs)]

mod bit_info;
mod board;
mod download;
mod memory;

use std::path::PathBuf;
use std::process;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use log::LevelFilter;
use siusb_config::SiUsbConfig;
use siusb_transport::Subsystem;

use crate::memory::HexBytes;

/// siusb: SILAB USB board utility.
#[derive(Parser, Debug)]
#[command(name = "siusb", version, about = "SILAB USB board utility")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// More log output (`-v` debug, `-vv` trace).
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Path to a `siusb.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Open the board with this EEPROM board id.
    #[arg(short, long, global = true)]
    pub board_id: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List attached boards.
    List(FormatArgs),
    /// Show the identity of one board.
    Info(FormatArgs),
    /// Load a bitstream into the FPGA.
    Download(DownloadArgs),
    /// Report whether the FPGA is configured.
    Status,
    /// Read bytes from a subsystem.
    Read(ReadArgs),
    /// Write bytes to a subsystem.
    Write(WriteArgs),
    /// Show the header of a `.bit` file.
    BitInfo(BitInfoArgs),
}

/// Output format selection.
#[derive(Parser, Debug)]
pub struct FormatArgs {
    /// Output format.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Arguments for `siusb download`.
#[derive(Parser, Debug)]
pub struct DownloadArgs {
    /// `.bit` or `.bin` file; defaults to `fpga.bitstream` from the configuration.
    pub file: Option<PathBuf>,

    /// Do nothing if the FPGA already reports DONE.
    #[arg(long)]
    pub skip_if_loaded: bool,
}

/// Arguments for `siusb read`.
#[derive(Parser, Debug)]
pub struct ReadArgs {
    /// Subsystem name or id (e.g. `external`, `eeprom`, `1`).
    pub subsystem: Subsystem,

    /// Start address, decimal or `0x` hex.
    #[arg(value_parser = memory::parse_u32)]
    pub address: u32,

    /// Number of bytes, decimal or `0x` hex.
    #[arg(value_parser = memory::parse_usize)]
    pub size: usize,
}

/// Arguments for `siusb write`.
#[derive(Parser, Debug)]
pub struct WriteArgs {
    /// Subsystem name or id.
    pub subsystem: Subsystem,

    /// Start address, decimal or `0x` hex.
    #[arg(value_parser = memory::parse_u32)]
    pub address: u32,

    /// Data as hex digits, e.g. `0a0b0c`.
    pub data: HexBytes,
}

/// Arguments for `siusb bit-info`.
#[derive(Parser, Debug)]
pub struct BitInfoArgs {
    /// The `.bit` file to inspect.
    pub file: PathBuf,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
    pub format: ReportFormat,
}

/// Report output format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    /// Human-readable terminal output.
    Text,
    /// Machine-readable JSON output.
    Json,
}

/// Global settings derived from CLI flags and the configuration file.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// The effective configuration, with CLI overrides applied.
    pub config: SiUsbConfig,
}

/// Exit code when the FPGA did not report DONE.
pub const EXIT_NOT_CONFIGURED: i32 = 2;

/// Maps `-v`/`-q` to a log level; `RUST_LOG` still takes precedence.
fn log_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Loads the configuration named by `--config`, or the nearest `siusb.toml`.
fn resolve_config(cli: &Cli) -> Result<SiUsbConfig, Box<dyn std::error::Error>> {
    let path = match &cli.config {
        Some(path) => Some(path.clone()),
        None => siusb_config::find_config(&std::env::current_dir()?),
    };
    let mut config = match path {
        Some(path) => {
            log::debug!("using configuration {}", path.display());
            siusb_config::load_config(&path)?
        }
        None => SiUsbConfig::default(),
    };
    if let Some(id) = &cli.board_id {
        config.device.board_id = Some(id.clone());
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<i32, Box<dyn std::error::Error>> {
    let global = GlobalArgs {
        quiet: cli.quiet,
        config: resolve_config(&cli)?,
    };

    match cli.command {
        Command::List(ref args) => board::list(args, &global),
        Command::Info(ref args) => board::info(args, &global),
        Command::Status => board::status(&global),
        Command::Download(ref args) => download::run(args, &global),
        Command::Read(ref args) => memory::read(args, &global),
        Command::Write(ref args) => memory::write(args, &global),
        Command::BitInfo(ref args) => bit_info::run(args, &global),
    }
}

fn main() {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(log_level(cli.verbose, cli.quiet))
        .parse_default_env()
        .init();

    match run(cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
