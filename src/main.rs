//! apimux server binary.
//!
//! ```text
//! apimux --config apimux.toml
//!     → load + validate config
//!     → build instance (bind every listener)
//!     → start (one task per listener)
//!     → SIGINT/SIGTERM → graceful shutdown (15s per server)
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use apimux::apis::HealthApiFactory;
use apimux::config::load_config;
use apimux::lifecycle::shutdown_signal;
use apimux::observability::init_logging;
use apimux::{Instance, Registry, RegistryMap};

#[derive(Parser)]
#[command(name = "apimux")]
#[command(about = "Serve registered APIs on many HTTP(S) bind points", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "apimux.toml")]
    config: PathBuf,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = load_config(&cli.config)?;
    if let Err(e) = init_logging(&config.logging) {
        eprintln!("logging already initialized: {e}");
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        servers = config.servers.len(),
        demux = ?config.demux,
        "apimux starting"
    );

    let mut registry = RegistryMap::new();
    registry.add(Box::new(HealthApiFactory))?;

    let mut instance = Instance::new(config, registry);

    if let Err(errors) = instance.validate() {
        for error in &errors {
            tracing::error!(error = %error, "Invalid configuration");
        }
        return Ok(ExitCode::FAILURE);
    }

    if cli.check {
        tracing::info!("Configuration is valid");
        return Ok(ExitCode::SUCCESS);
    }

    if let Err(e) = instance.run() {
        tracing::error!(error = %e, "Failed to build servers");
        return Ok(ExitCode::FAILURE);
    }

    shutdown_signal().await;

    let reports = instance.shutdown().wait().await;
    for report in &reports {
        for listener in &report.listeners {
            tracing::info!(
                server = %report.server,
                interface = %listener.interface,
                outcome = ?listener.outcome,
                "Listener outcome"
            );
        }
    }

    tracing::info!("Shutdown complete");
    Ok(ExitCode::SUCCESS)
}
