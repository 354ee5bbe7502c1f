//! # Command Line Interface
//!
//! `flowgate server` runs the control plane, `flowgate validate` checks a
//! configuration file and `flowgate version` prints build information.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::{load_config, Loader};
use crate::observability::{describe_metrics, init_logging, log_config_info};
use crate::supervisor::Supervisor;
use crate::{APP_NAME, VERSION};

#[derive(Parser, Debug)]
#[command(name = "flowgate")]
#[command(about = "Flowgate gateway control plane")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the control plane
    #[command(alias = "serve")]
    Server {
        /// Configuration file; defaults and environment overrides apply without one
        #[arg(short, long)]
        config_path: Option<PathBuf>,
    },

    /// Validate a configuration file and exit
    Validate {
        #[arg(short, long)]
        config_path: Option<PathBuf>,
    },

    /// Print version information
    Version,
}

/// Parse arguments and run the selected command.
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    run(cli).await
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Server { config_path } => run_server(config_path).await,
        Commands::Validate { config_path } => {
            let config = load_config(config_path.as_deref())?;
            println!(
                "Configuration is valid (provider: {:?}, xds: {})",
                config.provider.provider_type,
                config.xds_server.bind_address()
            );
            Ok(())
        }
        Commands::Version => {
            println!("{} {}", APP_NAME, VERSION);
            Ok(())
        }
    }
}

async fn run_server(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let loader = Loader::new(config_path)?;
    init_logging(&loader.config().logging)?;
    describe_metrics();

    info!(app_name = APP_NAME, version = VERSION, "Starting flowgate control plane");
    log_config_info(loader.config());

    let ctx = CancellationToken::new();
    tokio::spawn(shutdown_on_signal(ctx.clone()));

    loader
        .run(ctx, |server, ctx| async move { Supervisor::new(server).run(ctx).await })
        .await?;

    info!("Flowgate control plane stopped");
    Ok(())
}

/// Cancel `ctx` on SIGINT or SIGTERM.
async fn shutdown_on_signal(ctx: CancellationToken) {
    let interrupt = tokio::signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = interrupt => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for SIGINT");
                return;
            }
            info!("Received SIGINT, shutting down");
        }
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
    ctx.cancel();
}
