//! nuvoisp CLI - program Nuvoton MCUs over the ISP boot ROM.
//!
//! ## Features
//!
//! - Program a raw firmware binary into APROM
//! - Optional mass erase before programming
//! - Reset / run-APROM / run-LDROM after programming
//! - Query device id, boot ROM firmware version and config words
//! - Serial port listing, shell completion generation
//! - Environment variable and config file support

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::{Shell, generate};
use console::style;
use env_logger::Env;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use nuvoisp::{
    FirmwareImage, FlashOptions, FlashReport, IspSession, NativePortEnumerator, PortEnumerator,
    RunTarget,
};
use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod config;

use config::Config;

/// nuvoisp - program Nuvoton MCUs over the ISP boot ROM serial protocol.
///
/// Environment variables:
///   NUVOISP_PORT      - Default serial port
///   NUVOISP_FILE      - Default firmware file
///   NUVOISP_TIMEOUT   - Default connection timeout (ms)
#[derive(Parser)]
#[command(name = "nuvoisp")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "For more information, visit: https://github.com/nuvoisp/nuvoisp")]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Firmware binary to program (raw .bin).
    #[arg(short, long, env = "NUVOISP_FILE")]
    file: Option<PathBuf>,

    /// Serial port to use (e.g., /dev/ttyUSB0 or COM3).
    #[arg(short, long, env = "NUVOISP_PORT")]
    port: Option<String>,

    /// Connection timeout budget in milliseconds.
    #[arg(short, long, env = "NUVOISP_TIMEOUT")]
    timeout: Option<u64>,

    /// Flash start address (hexadecimal).
    #[arg(long, value_parser = parse_hex_u32, default_value = "0")]
    address: u32,

    /// Erase all of APROM before programming.
    #[arg(short, long)]
    erase_all: bool,

    /// Reset the device at the end of the process.
    #[arg(short, long)]
    reset: bool,

    /// Run APROM at the end of the process.
    #[arg(short = 'a', long)]
    run_aprom: bool,

    /// Run LDROM at the end of the process.
    #[arg(short = 'l', long)]
    run_ldrom: bool,

    /// Report the device id.
    #[arg(short, long)]
    device_id: bool,

    /// Report the boot ROM firmware version.
    #[arg(long)]
    firmware_version: bool,

    /// Report the config words.
    #[arg(short, long)]
    configs: bool,

    /// List available serial ports and exit.
    #[arg(long)]
    list_ports: bool,

    /// Emit the report (or port list) as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Generate a shell completion script and exit.
    #[arg(long, value_enum, value_name = "SHELL")]
    completions: Option<Shell>,

    /// Path to a configuration file.
    #[arg(long = "config", value_name = "PATH")]
    config_path: Option<PathBuf>,

    /// Verbose output level (--verbose, --verbose --verbose for more).
    #[arg(long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
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

    // NO_COLOR and TTY detection
    if env::var("NO_COLOR").is_ok() || !console::Term::stderr().is_term() {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    debug!("nuvoisp v{}", env!("CARGO_PKG_VERSION"));

    if let Some(shell) = cli.completions {
        cmd_completions(shell);
        return Ok(());
    }

    if cli.list_ports {
        return cmd_list_ports(cli.json);
    }

    let config = cli
        .config_path
        .as_ref()
        .map_or_else(Config::load, |path| Config::load_from_path(path));

    // Both the firmware file and the port must be known before any
    // connection is attempted.
    let Some(file) = cli.file.clone() else {
        eprintln!(
            "{} no firmware file given, nothing to program (use --file)",
            style("Error:").red().bold()
        );
        std::process::exit(2);
    };
    let Some(port) = cli.port.clone().or_else(|| config.connection.port.clone()) else {
        eprintln!(
            "{} no serial port given (use --port or list candidates with --list-ports)",
            style("Error:").red().bold()
        );
        std::process::exit(2);
    };

    cmd_flash(&cli, &config, &file, &port)
}

/// Resolve the post-program action: reset first, else run-APROM, else
/// run-LDROM.
fn run_target(cli: &Cli) -> Option<RunTarget> {
    if cli.reset {
        Some(RunTarget::Reset)
    } else if cli.run_aprom {
        Some(RunTarget::Aprom)
    } else if cli.run_ldrom {
        Some(RunTarget::Ldrom)
    } else {
        None
    }
}

/// Flash command implementation.
fn cmd_flash(cli: &Cli, config: &Config, file: &Path, port: &str) -> Result<()> {
    let image = FirmwareImage::from_file(file)
        .with_context(|| format!("failed to load firmware image {}", file.display()))?;
    if !cli.quiet {
        eprintln!(
            "{} loaded {} ({} bytes)",
            style("•").cyan(),
            file.display(),
            image.len()
        );
    }

    let timeout_ms = cli
        .timeout
        .or(config.connection.timeout_ms)
        .unwrap_or(1000);
    let options = FlashOptions {
        erase_all: cli.erase_all || config.flash.erase_all,
        run: run_target(cli),
        budget: Duration::from_millis(timeout_ms),
        query_device_id: cli.device_id,
        query_firmware_version: cli.firmware_version,
        query_config: cli.configs,
    };

    if !cli.quiet {
        eprintln!(
            "{} using port {} at {} baud (budget {timeout_ms} ms)",
            style("•").cyan(),
            port,
            nuvoisp::BAUD_RATE
        );
    }

    let mut session =
        IspSession::open(port).with_context(|| format!("failed to open serial port {port}"))?;

    // Progress bar over programmed bytes
    let pb = if cli.quiet || !console::Term::stderr().is_term() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(image.len() as u64);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(indicatif::ProgressDrawTarget::stderr());
        pb
    };

    let result = nuvoisp::flash(&mut session, &image, cli.address, &options, |sent, _total| {
        pb.set_position(sent as u64);
    });
    let _ = session.close();

    let report = result.context("programming failed")?;
    pb.finish_and_clear();

    print_report(cli, &report)
}

/// Render the final report.
fn print_report(cli: &Cli, report: &FlashReport) -> Result<()> {
    if cli.json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    if cli.quiet {
        return Ok(());
    }

    eprintln!(
        "\n{} programming complete ({} attempt(s))",
        style("✓").green().bold(),
        report.attempts
    );
    if report.erased {
        eprintln!("  erase:            ok");
    }
    if let Some(id) = report.device_id {
        eprintln!("  device id:        0x{id:08X}");
    }
    if let Some(version) = report.firmware_version {
        eprintln!("  firmware version: 0x{version:02X}");
    }
    if let Some((config0, config1)) = report.config_words {
        eprintln!("  config0:          0x{config0:08X}");
        eprintln!("  config1:          0x{config1:08X}");
    }
    Ok(())
}

/// List ports command implementation.
fn cmd_list_ports(json: bool) -> Result<()> {
    let ports =
        NativePortEnumerator::list_ports().context("failed to enumerate serial ports")?;

    if json {
        let rows: Vec<serde_json::Value> = ports
            .iter()
            .map(|p| {
                serde_json::json!({
                    "name": p.name,
                    "vid": p.vid,
                    "pid": p.pid,
                    "manufacturer": p.manufacturer,
                    "product": p.product,
                    "serial": p.serial_number,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).unwrap_or_default()
        );
        return Ok(());
    }

    eprintln!("{}", style("Available serial ports:").bold().underlined());
    if ports.is_empty() {
        eprintln!("  {}", style("none found").dim());
        return Ok(());
    }

    for port in &ports {
        let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            format!(" ({vid:04X}:{pid:04X})")
        } else {
            String::new()
        };
        let product = port.product.as_deref().unwrap_or("");

        eprintln!(
            "  {} {}{}{}",
            style("•").green(),
            style(&port.name).cyan(),
            vid_pid,
            if product.is_empty() {
                String::new()
            } else {
                format!(" - {}", style(product).dim())
            }
        );
    }
    Ok(())
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut io::stdout());
}

/// Parse hexadecimal address (supports 0x prefix and underscores).
fn parse_hex_u32(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let s = s.trim_start_matches("0x").trim_start_matches("0X");
    // Support underscore separators like 0x00_80_00_00
    let s: String = s.chars().filter(|c| *c != '_').collect();
    u32::from_str_radix(&s, 16).map_err(|e| format!("Invalid hex address: {e}"))
}
