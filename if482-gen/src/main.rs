/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;

use clap::Parser;
use tokio::io::AsyncWrite;
use tracing::{error, info, warn};

use if482_gen::config::{GeneratorConfig, SerialLine};
use if482_gen::scheduler::{TelegramScheduler, WriterSink};
use if482_gen::signal::{edge_channel, MonotonicClock, SystemPps};
use if482_gen::time::SystemClock;

// ── CLI argument definition ───────────────────────────────────────────────────

/// IF482 time-telegram generator.
///
/// Example:
///   if482-gen -c if482.yaml -d /dev/ttyUSB0 -o 982
#[derive(Debug, Parser)]
#[command(
    name = "if482-gen",
    about = "IF482 time-telegram generator – one telegram per second on a serial line",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML generator configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Transmit offset after each second boundary, in milliseconds (max 982).
    #[arg(short = 'o', long = "offset")]
    offset_ms: Option<u64>,

    /// Serial device node to write telegrams to (line must be set to 9600 7E1).
    #[arg(short = 'd', long = "device", conflicts_with = "stdout")]
    device: Option<PathBuf>,

    /// Write telegrams to stdout, ignoring any configured device.
    #[arg(long = "stdout", default_value_t = false)]
    stdout: bool,

    /// Warn when no second-boundary edge arrives for this many milliseconds.
    #[arg(short = 'w', long = "watchdog")]
    watchdog_ms: Option<u64>,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Initialise structured logging on stderr; stdout may carry telegrams.
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("IF482 generator starting up...");

    // ── Parse CLI arguments ───────────────────────────────────────────────────
    let cli = Cli::parse();

    // ── Load configuration ────────────────────────────────────────────────────
    let mut config = match &cli.config {
        Some(path) => match GeneratorConfig::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!("Failed to load configuration: {:#}", e);
                process::exit(1);
            }
        },
        None => {
            warn!("No configuration file provided, using defaults");
            GeneratorConfig::default()
        }
    };

    if let Some(ms) = cli.offset_ms {
        config.offset_ms = ms;
    }
    if cli.device.is_some() {
        config.device = cli.device.clone();
    }
    if cli.stdout {
        config.device = None;
    }
    if cli.watchdog_ms.is_some() {
        config.watchdog_ms = cli.watchdog_ms;
    }

    let (offset, watchdog) = match (config.offset(), config.watchdog()) {
        (Ok(offset), Ok(watchdog)) => (offset, watchdog),
        (Err(e), _) | (_, Err(e)) => {
            error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    info!(
        offset_ms    = offset.as_millis(),
        device       = ?config.device,
        sync_state   = ?config.sync_state,
        watchdog     = ?watchdog,
        line         = %SerialLine::IF482,
        "Configuration"
    );

    // ── Open the output ───────────────────────────────────────────────────────
    let writer: Box<dyn AsyncWrite + Unpin + Send> = match &config.device {
        Some(path) => {
            match tokio::fs::OpenOptions::new().write(true).open(path).await {
                Ok(file) => {
                    info!(
                        "Writing telegrams to {} (line settings are not changed by the generator)",
                        path.display()
                    );
                    Box::new(file)
                }
                Err(e) => {
                    error!("Cannot open output device {}: {}", path.display(), e);
                    process::exit(1);
                }
            }
        }
        None => {
            info!("Writing telegrams to stdout");
            Box::new(tokio::io::stdout())
        }
    };

    // ── Wire up edge source, time source and scheduler ────────────────────────
    let clock = MonotonicClock::new();
    let (notifier, edges) = edge_channel(clock);
    let _pps = SystemPps::spawn(notifier);

    let mut scheduler = TelegramScheduler::new(
        SystemClock::new(config.sync_state),
        WriterSink::new(writer),
        edges,
        clock,
        offset,
    );
    if let Some(timeout) = watchdog {
        scheduler = scheduler.with_watchdog(timeout);
    }

    scheduler.run().await;
}
