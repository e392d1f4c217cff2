use crate::{
    cache::EarningCache,
    error::{Error, Result as FinalizerResult, Service},
    ledger::Ledger,
    reconciler::{ReconcileOptions, Reconciler},
    worker::state::WorkerState,
};
use anyhow::{Result, bail};
use chrono::Utc;
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub state_file: PathBuf,
    pub interval: Duration,
    pub max_consecutive_failures: u32,
    pub dry_run: bool,
    pub enforce: bool,
}

/// Periodically finalizes every elapsed day of one deployment, then brings
/// the earning cache up to the ledger.
pub struct FinalizationWorker {
    reconciler: Reconciler,
    ledger: Arc<dyn Ledger>,
    cache: Arc<EarningCache>,
    config: WorkerConfig,
    cancel: CancellationToken,
}

impl FinalizationWorker {
    /// `ledger` must be the same deployment the reconciler finalizes.
    pub fn new(
        reconciler: Reconciler,
        ledger: Arc<dyn Ledger>,
        cache: Arc<EarningCache>,
        config: WorkerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            reconciler,
            ledger,
            cache,
            config,
            cancel,
        }
    }

    /// Run the worker loop until cancelled or too many consecutive failures
    pub async fn run(self) -> Result<()> {
        let network = self.reconciler.network();
        let coin = self.reconciler.coin();
        info!("Starting finalization worker for {network}.{coin}");
        info!("  Interval: {:?}", self.config.interval);
        info!("  Dry run: {}", self.config.dry_run);
        info!("  Enforce: {}", self.config.enforce);
        info!("  State file: {:?}", self.config.state_file);
        info!(
            "  Max consecutive failures: {}",
            self.config.max_consecutive_failures
        );

        let mut state = WorkerState::load_or_default(&self.config.state_file)?;

        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("Shutting down worker for {network}.{coin}");
                    state.save(&self.config.state_file)?;
                    break;
                }
                _ = ticker.tick() => {}
            }

            state.mark_check();

            if state.is_in_failure_state(self.config.max_consecutive_failures) {
                error!(
                    "Worker for {network}.{coin} halting after {} consecutive failures",
                    state.consecutive_failures
                );
                state.save(&self.config.state_file)?;
                bail!("Too many consecutive failures for {network}.{coin}");
            }

            match self.process_at(&mut state, Utc::now().timestamp()).await {
                Ok(finalized) => {
                    if finalized > 0 {
                        info!("Finalized {finalized} day(s) for {network}.{coin}");
                        metrics::counter!(
                            "mining_token_worker_success",
                            "network" => network.as_str(),
                            "coin" => coin.as_str()
                        )
                        .increment(1);
                    } else {
                        debug!("No new days to finalize for {network}.{coin}");
                    }
                    state.save(&self.config.state_file)?;
                }
                Err(e) if e.is_cancelled() => {
                    info!("Worker for {network}.{coin} cancelled mid pass");
                    state.save(&self.config.state_file)?;
                    break;
                }
                Err(e) => {
                    error!("Failed to process {network}.{coin}: {}", e);
                    state.mark_failure();
                    state.save(&self.config.state_file)?;

                    metrics::counter!(
                        "mining_token_worker_failure",
                        "network" => network.as_str(),
                        "coin" => coin.as_str()
                    )
                    .increment(1);

                    if !state.is_in_failure_state(self.config.max_consecutive_failures) {
                        warn!("Will retry on next interval");
                    }
                }
            }
        }

        Ok(())
    }

    /// One pass: finalize until the ledger reaches `now`, then sync the
    /// cache. A dry run computes the next day once. Returns the number of
    /// days finalized.
    pub async fn process_at(&self, state: &mut WorkerState, now: i64) -> FinalizerResult<usize> {
        let options = ReconcileOptions {
            timestamp: None,
            dry_run: self.config.dry_run,
            enforce: self.config.enforce,
        };

        let mut finalized = 0;
        loop {
            if self.cancel.is_cancelled() {
                return Err(Error::cancelled(Service::Ledger));
            }
            match self.reconciler.run_at(&options, now).await {
                Ok(record) if record.dry_run => {
                    info!(
                        "DRY RUN: day ending {} would pay {} per token, {} in total",
                        record.bucket_end_ts, record.token_value, record.amount_to_deposit
                    );
                    break;
                }
                Ok(record) => {
                    state.mark_success(record.bucket_end_ts);
                    finalized += 1;
                }
                Err(Error::AlreadyFinalized { .. } | Error::FutureTimestamp { .. }) => break,
                Err(e) => return Err(e),
            }
        }

        let report = self
            .cache
            .sync(
                self.reconciler.network(),
                self.reconciler.coin(),
                self.ledger.as_ref(),
                &self.cancel,
            )
            .await?;
        state.mark_synced(report.to_ts);

        Ok(finalized)
    }
}
