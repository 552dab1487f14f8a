//! `cubby` command-line client for the locker hardware-control backend.
//!
//! Thin wrapper over the library crates: loads configuration, builds the
//! HTTP gateway, and runs either a single relay operation or a full
//! walk-up flow.

use anyhow::Context;
use clap::{Parser, Subcommand};
use cubby_core::Operation;
use cubby_kiosk::{KioskConfig, KioskFlows};
use cubby_relay::{HttpBackend, HttpBackendConfig, RelayGateway};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "cubby",
    version = env!("CARGO_PKG_VERSION"),
    about = "Kiosk client for the RFID laundry-locker backend"
)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Backend base URL (overrides the config file)
    #[arg(short = 'b', long = "backend")]
    backend: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show backend system status
    Status,
    /// Show backend health report
    Health,
    /// List available wash types
    WashTypes,
    /// Show backend device information
    DeviceInfo,
    /// Reset the RFID reader hardware
    ResetReader,
    /// Wait for a card tap, then assign the card to a locker
    DropOff {
        /// Wash type id or name
        #[arg(short = 'w', long = "wash-type")]
        wash_type: String,
    },
    /// Wait for a card tap, then open that card's locker
    PickUp,
}

fn init_tracing(config: &KioskConfig) {
    let default_level = config.general.log_level.as_deref().unwrap_or("info");
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// A wash type given on the command line: a numeric id or a name.
fn parse_wash_type(raw: &str) -> Value {
    match raw.parse::<u64>() {
        Ok(id) => json!(id),
        Err(_) => json!(raw),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = KioskConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Some(base_url) = cli.backend {
        config.backend.base_url = base_url;
    }
    init_tracing(&config);

    let backend = HttpBackend::new(HttpBackendConfig {
        base_url: config.backend.base_url.clone(),
        ..Default::default()
    })
    .context("building HTTP backend")?;
    let gateway = Arc::new(RelayGateway::new(backend));

    info!(backend = %config.backend.base_url, "Starting cubby client");

    let exit_ok = match cli.command {
        Command::Status => run_operation(&gateway, Operation::Status).await?,
        Command::Health => run_operation(&gateway, Operation::Health).await?,
        Command::WashTypes => run_operation(&gateway, Operation::WashTypes).await?,
        Command::DeviceInfo => run_operation(&gateway, Operation::DeviceInfo).await?,
        Command::ResetReader => run_operation(&gateway, Operation::ResetReader).await?,
        Command::DropOff { wash_type } => {
            let mut flows = KioskFlows::new(Arc::clone(&gateway), config.poll_options());
            println!("Hold your card to the reader...");
            let report = flows.drop_off(parse_wash_type(&wash_type)).await;
            println!("{}", report.message);
            if !report.success && report.can_retry {
                println!("You can try again.");
            }
            report.success
        }
        Command::PickUp => {
            let mut flows = KioskFlows::new(Arc::clone(&gateway), config.poll_options());
            println!("Hold your card to the reader...");
            let report = flows.pick_up().await;
            println!("{}", report.message);
            if !report.success && report.can_retry {
                println!("You can try again.");
            }
            report.success
        }
    };

    if !exit_ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_operation(
    gateway: &Arc<RelayGateway<HttpBackend>>,
    operation: Operation,
) -> anyhow::Result<bool> {
    let result = gateway.relay(operation, None).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(result.success)
}
