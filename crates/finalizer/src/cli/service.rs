use anyhow::{Result, anyhow};
use clap::Subcommand;
use futures::future::try_join_all;
use mining_token_finalizer::{
    api::{self, ApiState},
    ledger::Ledger,
    orchestrator::Orchestrator,
    types::{Coin, Network},
    worker::{FinalizationWorker, WorkerConfig},
};
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tracing::info;

/// Long running services
#[derive(Subcommand, Debug)]
pub enum ServiceCommands {
    #[command(about = "Bootstrap the earning cache, then serve token metadata from it")]
    Serve {
        /// Listen address (overrides config file)
        #[arg(short, long, value_name = "ADDR")]
        listen: Option<SocketAddr>,
    },
    #[command(
        about = "Finalize every elapsed day on an interval and keep the cache in sync",
        after_help = r#"Examples:
    # All configured deployments
    worker

    # One deployment, dry run, checking every minute
    worker --network bsc --coin btc --dry-run -i 60

    # Serve the metadata API from the same process
    worker --with-api"#
    )]
    Worker {
        #[arg(long)]
        network: Option<Network>,

        #[arg(long)]
        coin: Option<Coin>,

        /// Run in dry-run mode without chain writes
        #[arg(long)]
        dry_run: bool,

        /// Interval between checks in seconds (overrides config file)
        #[arg(short = 'i', long, value_name = "SECONDS")]
        interval: Option<u64>,

        /// Directory for per deployment state files (overrides config file)
        #[arg(short = 's', long, value_name = "DIR")]
        state_dir: Option<PathBuf>,

        /// Also serve the metadata API
        #[arg(long)]
        with_api: bool,
    },
}

pub async fn handle(orchestrator: &Orchestrator, cmd: ServiceCommands) -> Result<()> {
    match cmd {
        ServiceCommands::Serve { listen } => {
            let cache = Arc::new(orchestrator.cache().await?);
            orchestrator.bootstrap_cache(&cache).await?;
            let addr = listen.unwrap_or(orchestrator.settings().api.listen_addr);
            api::serve(
                addr,
                ApiState {
                    cache: cache.clone(),
                },
                orchestrator.cancel_token().clone(),
            )
            .await?;
            cache.close().await?;
            Ok(())
        }
        ServiceCommands::Worker {
            network,
            coin,
            dry_run,
            interval,
            state_dir,
            with_api,
        } => {
            start_workers(
                orchestrator,
                network,
                coin,
                dry_run,
                interval,
                state_dir,
                with_api,
            )
            .await
        }
    }
}

async fn start_workers(
    orchestrator: &Orchestrator,
    network: Option<Network>,
    coin: Option<Coin>,
    dry_run_override: bool,
    interval_override: Option<u64>,
    state_dir_override: Option<PathBuf>,
    with_api: bool,
) -> Result<()> {
    let settings = orchestrator.settings();

    // Use CLI args if provided, otherwise fall back to config settings
    let interval = interval_override.unwrap_or(settings.worker.interval_seconds);
    let state_dir =
        state_dir_override.unwrap_or_else(|| PathBuf::from(&settings.worker.state_dir));
    let dry_run = dry_run_override || settings.worker.enable_dry_run;

    let cache = Arc::new(orchestrator.cache().await?);
    let mut workers = Vec::new();
    for deployment in settings
        .deployments
        .iter()
        .filter(|d| network.is_none_or(|n| n == d.network))
        .filter(|d| coin.is_none_or(|c| c == d.coin))
    {
        let (network, coin) = (deployment.network, deployment.coin);
        let ledger: Arc<dyn Ledger> = orchestrator.ledger(network, coin).await?;
        let reconciler = orchestrator.reconciler_with(network, coin, ledger.clone())?;
        let config = WorkerConfig {
            state_file: state_dir.join(format!("{network}.{coin}.json")),
            interval: Duration::from_secs(interval),
            max_consecutive_failures: settings.worker.max_consecutive_failures,
            dry_run,
            enforce: settings.worker.enforce,
        };
        workers.push(FinalizationWorker::new(
            reconciler,
            ledger,
            cache.clone(),
            config,
            orchestrator.cancel_token().clone(),
        ));
    }
    if workers.is_empty() {
        return Err(anyhow!("no configured deployment matches the filter"));
    }

    info!("Starting {} finalization worker(s)", workers.len());
    let runs = try_join_all(workers.into_iter().map(FinalizationWorker::run));

    if with_api {
        let state = ApiState {
            cache: cache.clone(),
        };
        let server = async {
            api::serve(
                settings.api.listen_addr,
                state,
                orchestrator.cancel_token().clone(),
            )
            .await
            .map_err(anyhow::Error::from)
        };
        tokio::try_join!(runs, server)?;
    } else {
        runs.await?;
    }

    cache.close().await?;
    Ok(())
}
