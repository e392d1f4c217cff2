mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use cli::{finalize::FinalizeCommands, period::PeriodCommands, service::ServiceCommands};
use metrics_exporter_prometheus::PrometheusBuilder;
use mining_token_finalizer::{orchestrator::Orchestrator, settings::Settings};
use std::path::PathBuf;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(
    name = "mining-token-finalizer",
    about = "Reconciles mining pool output against tokenized hashrate and finalizes daily earnings",
    version,
    author,
    after_help = r#"Configuration:
    Configuration can be provided via:
    1. Environment variables with MT__ prefix (e.g., MT__POOL__API_KEY)
    2. .env file in the current directory
    3. Config file with -c option (see config.example.toml)

Examples:
    # Token ids of every biweekly bucket in 2022
    mining-token-finalizer token-ids --start 2022-01-01 --end 2023-01-01 -g biweekly

    # Preview the next BTC finalization on BSC
    mining-token-finalizer -c config.toml finalize bsc btc --dry-run

    # Run the scheduled worker and the metadata API together
    mining-token-finalizer -c config.toml worker --with-api"#
)]
pub struct Cli {
    /// Path to the configuration file (TOML format)
    ///
    /// If not provided, will attempt to load from environment variables
    #[clap(short = 'c', long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(flatten)]
    Period(PeriodCommands),
    #[command(flatten)]
    Finalize(FinalizeCommands),
    #[command(flatten)]
    Service(ServiceCommands),
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        // Token id commands are offline and need no configuration
        let cmd = match self.command {
            Commands::Period(cmd) => {
                init_logging("info")?;
                return cli::period::handle(cmd);
            }
            other => other,
        };

        let settings = if let Some(config_path) = &self.config {
            Settings::from_path(config_path)?
        } else {
            Settings::from_env()?
        };
        init_logging(&settings.log_level)?;

        if let Some(metrics) = &settings.metrics {
            PrometheusBuilder::new()
                .with_http_listener(metrics.addr)
                .install()?;
            info!("Prometheus exporter listening on {}", metrics.addr);
        }
        export_build_info();

        let orchestrator = Orchestrator::new(&settings, shutdown_listener()?);

        match cmd {
            Commands::Period(_) => Ok(()),
            Commands::Finalize(cmd) => cli::finalize::handle(&orchestrator, cmd).await,
            Commands::Service(cmd) => cli::service::handle(&orchestrator, cmd).await,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.run().await
}

fn init_logging(log_level: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

fn shutdown_listener() -> Result<CancellationToken> {
    let cancellation_token = CancellationToken::new();
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    tokio::spawn({
        let cancellation_token = cancellation_token.clone();
        async move {
            tokio::select! {
                _ = sigterm.recv() => cancellation_token.cancel(),
                _ = signal::ctrl_c() => cancellation_token.cancel(),
            }
            info!("Received shutdown signal");
        }
    });

    Ok(cancellation_token)
}

fn export_build_info() {
    let version = option_env!("BUILD_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"));
    let build_commit = option_env!("BUILD_COMMIT").unwrap_or("UNKNOWN");

    metrics::gauge!(
        "mining_token_finalizer_build_info",
        "version" => version,
        "commit" => build_commit
    )
    .set(1);
}
