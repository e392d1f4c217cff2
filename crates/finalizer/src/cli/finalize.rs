use anyhow::{Result, bail};
use clap::Subcommand;
use mining_token_period::day::{DAY_SECONDS, format_day, parse_day};
use mining_token_finalizer::{
    ledger::Ledger,
    orchestrator::Orchestrator,
    reconciler::ReconcileOptions,
    supply::SupplyAggregator,
    types::{Coin, FinalizationRecord, Network},
};
use tabled::{Table, Tabled, settings::Style};
use tracing::info;

/// Ledger facing commands for one deployment
#[derive(Subcommand, Debug)]
pub enum FinalizeCommands {
    #[command(about = "Show the circulating supply for a finalized or pending day")]
    Supply {
        network: Network,
        coin: Coin,

        /// Day end to inspect (YYYY-MM-DD); defaults to the next day to finalize
        #[arg(long, value_name = "DATE")]
        date: Option<String>,
    },
    #[command(
        about = "Reconcile pool output against supply and finalize one day",
        after_help = r#"Examples:
    # Finalize the day after the ledger's last finalized day
    finalize bsc btc

    # Preview a specific day end without submitting
    finalize polygon eth --date 2022-02-10 --dry-run

    # Finalize although the pool reports less hashrate than is tokenized
    finalize bsc btc --enforce"#
    )]
    Finalize {
        network: Network,
        coin: Coin,

        /// Day end to finalize (YYYY-MM-DD)
        #[arg(long, value_name = "DATE", conflicts_with = "timestamp")]
        date: Option<String>,

        /// Day end to finalize (unix seconds)
        #[arg(long, value_name = "SECONDS")]
        timestamp: Option<i64>,

        /// Compute and validate without submitting a transaction
        #[arg(long)]
        dry_run: bool,

        /// Proceed when pool hashrate is below the circulating supply
        #[arg(long)]
        enforce: bool,
    },
    #[command(about = "Replay finalized days from the ledger into the redis earning cache")]
    SyncCache {
        /// Limit to one network (all deployments when omitted)
        #[arg(long)]
        network: Option<Network>,

        /// Limit to one coin
        #[arg(long)]
        coin: Option<Coin>,
    },
}

#[derive(Tabled)]
struct RecordRow {
    field: &'static str,
    value: String,
}

fn record_rows(record: &FinalizationRecord) -> Vec<RecordRow> {
    let row = |field, value: String| RecordRow { field, value };
    vec![
        row("deployment", format!("{}.{}", record.network, record.coin)),
        row(
            "day",
            format!(
                "{} ({})",
                format_day(record.bucket_end_ts - DAY_SECONDS),
                record.bucket_end_ts
            ),
        ),
        row(
            "hashrate",
            format!("{} {}", record.hashrate, record.coin.hashrate_unit()),
        ),
        row("supply", record.supply.to_string()),
        row("total earned", record.total_earned.to_string()),
        row("token value", record.token_value.to_string()),
        row("deposit", record.amount_to_deposit.to_string()),
        row("dry run", record.dry_run.to_string()),
        row(
            "tx",
            record.tx_hash.clone().unwrap_or_else(|| "-".to_string()),
        ),
    ]
}

pub async fn handle(orchestrator: &Orchestrator, cmd: FinalizeCommands) -> Result<()> {
    match cmd {
        FinalizeCommands::Supply {
            network,
            coin,
            date,
        } => supply(orchestrator, network, coin, date).await,
        FinalizeCommands::Finalize {
            network,
            coin,
            date,
            timestamp,
            dry_run,
            enforce,
        } => {
            let timestamp = match (date, timestamp) {
                (Some(date), _) => Some(parse_day(&date)?),
                (None, timestamp) => timestamp,
            };
            let options = ReconcileOptions {
                timestamp,
                dry_run,
                enforce,
            };
            let reconciler = orchestrator.reconciler(network, coin).await?;
            let record = reconciler.run(&options).await?;
            println!(
                "{}",
                Table::new(record_rows(&record)).with(Style::psql())
            );
            Ok(())
        }
        FinalizeCommands::SyncCache { network, coin } => {
            sync_cache(orchestrator, network, coin).await
        }
    }
}

async fn supply(
    orchestrator: &Orchestrator,
    network: Network,
    coin: Coin,
    date: Option<String>,
) -> Result<()> {
    let ledger = orchestrator.ledger(network, coin).await?;
    let day_end = match date {
        Some(date) => parse_day(&date)?,
        None => ledger.finalized_timestamp().await? + DAY_SECONDS,
    };

    let supply = SupplyAggregator::new(ledger.as_ref(), orchestrator.cancel_token())
        .supply_at(day_end)
        .await?;
    println!(
        "{network}.{coin} circulating supply for the day ending {} ({day_end}): {supply}",
        format_day(day_end)
    );
    Ok(())
}

async fn sync_cache(
    orchestrator: &Orchestrator,
    network: Option<Network>,
    coin: Option<Coin>,
) -> Result<()> {
    let cache = orchestrator.durable_cache().await?;
    let deployments: Vec<_> = orchestrator
        .settings()
        .deployments
        .iter()
        .filter(|d| network.is_none_or(|n| n == d.network))
        .filter(|d| coin.is_none_or(|c| c == d.coin))
        .map(|d| (d.network, d.coin))
        .collect();
    if deployments.is_empty() {
        bail!("no configured deployment matches the filter");
    }

    for (network, coin) in deployments {
        let ledger = orchestrator.ledger(network, coin).await?;
        let report = cache
            .sync(network, coin, ledger.as_ref(), orchestrator.cancel_token())
            .await?;
        info!(
            "{network}.{coin}: cached {} new entries between {} and {}",
            report.written,
            format_day(report.from_ts),
            format_day(report.to_ts)
        );
    }
    cache.close().await?;
    Ok(())
}
