//! Daily reconciliation of pool output against tokens in circulation.

use std::{fmt, sync::Arc};

use alloy_primitives::{Address, U256};
use chrono::Utc;
use metrics::{counter, gauge};
use mining_token_period::day::{DAY_SECONDS, is_day_aligned};
use rust_decimal::{
    Decimal,
    prelude::{FromPrimitive, ToPrimitive},
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    custody::Custody,
    error::{Error, Result, Service, cancellable, with_retry},
    ledger::Ledger,
    notifier::{FailureReport, Notifier},
    pool::PoolStatsSource,
    supply::SupplyAggregator,
    types::{Coin, FinalizationRecord, Network, PoolStats},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    CheckWithdraw,
    DetermineTarget,
    FetchPoolStats,
    ValidateSupply,
    ComputeEarning,
    ValidateBalance,
    Submit,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::CheckWithdraw => "check-withdraw",
            Stage::DetermineTarget => "determine-target",
            Stage::FetchPoolStats => "fetch-pool-stats",
            Stage::ValidateSupply => "validate-supply",
            Stage::ComputeEarning => "compute-earning",
            Stage::ValidateBalance => "validate-balance",
            Stage::Submit => "submit",
        }
    }

    fn failed(self) -> impl FnOnce(Error) -> StageFailure {
        move |error| StageFailure { stage: self, error }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileOptions {
    /// Day end to finalize. Defaults to the day after the ledger's last.
    pub timestamp: Option<i64>,
    /// Compute and validate everything but submit nothing.
    pub dry_run: bool,
    /// Proceed when pool hashrate is below the circulating supply.
    pub enforce: bool,
}

/// Per token earning and total deposit for one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Earning {
    pub token_value: U256,
    pub amount_to_deposit: U256,
}

/// Collaborators and accounts for one `(network, coin)` deployment.
pub struct Reconciler {
    network: Network,
    coin: Coin,
    ledger: Arc<dyn Ledger>,
    pool: Arc<dyn PoolStatsSource>,
    custody: Arc<dyn Custody>,
    notifier: Arc<dyn Notifier>,
    operator: Address,
    recipient: Address,
    cancel: CancellationToken,
}

struct StageFailure {
    stage: Stage,
    error: Error,
}

impl Reconciler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        network: Network,
        coin: Coin,
        ledger: Arc<dyn Ledger>,
        pool: Arc<dyn PoolStatsSource>,
        custody: Arc<dyn Custody>,
        notifier: Arc<dyn Notifier>,
        operator: Address,
        recipient: Address,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            network,
            coin,
            ledger,
            pool,
            custody,
            notifier,
            operator,
            recipient,
            cancel,
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn coin(&self) -> Coin {
        self.coin
    }

    pub async fn run(&self, options: &ReconcileOptions) -> Result<FinalizationRecord> {
        self.run_at(options, Utc::now().timestamp()).await
    }

    /// Runs every stage once against the clock reading `now`.
    pub async fn run_at(&self, options: &ReconcileOptions, now: i64) -> Result<FinalizationRecord> {
        let network = self.network.as_str();
        let coin = self.coin.as_str();

        match self.execute(options, now).await {
            Ok(record) => {
                counter!("mining_token_finalize_success", "network" => network, "coin" => coin)
                    .increment(1);
                if !record.dry_run {
                    gauge!("mining_token_finalized_timestamp", "network" => network, "coin" => coin)
                        .set(record.bucket_end_ts as f64);
                }
                Ok(record)
            }
            Err(StageFailure { stage, error }) => {
                counter!(
                    "mining_token_finalize_failure",
                    "network" => network,
                    "coin" => coin,
                    "stage" => stage.as_str()
                )
                .increment(1);
                if should_report(&error) {
                    self.report(stage, &error).await;
                } else {
                    debug!(%stage, %error, "nothing to finalize");
                }
                Err(error)
            }
        }
    }

    async fn execute(
        &self,
        options: &ReconcileOptions,
        now: i64,
    ) -> std::result::Result<FinalizationRecord, StageFailure> {
        self.check_withdraw()
            .await
            .map_err(Stage::CheckWithdraw.failed())?;

        let finalizing = self
            .determine_target(options.timestamp, now)
            .await
            .map_err(Stage::DetermineTarget.failed())?;
        info!(network = %self.network, coin = %self.coin, finalizing, "reconciling day");

        let stats = self
            .fetch_pool_stats(finalizing)
            .await
            .map_err(Stage::FetchPoolStats.failed())?;
        let hashrate = self.coin.canonical_hashrate(stats.hashrate);

        let supply = self
            .validate_supply(finalizing, hashrate, options.enforce)
            .await
            .map_err(Stage::ValidateSupply.failed())?;

        let earning = self
            .compute_earning(&stats, hashrate, supply)
            .await
            .map_err(Stage::ComputeEarning.failed())?;

        self.validate_balance(earning.amount_to_deposit)
            .await
            .map_err(Stage::ValidateBalance.failed())?;

        let tx_hash = if options.dry_run {
            info!(
                finalizing,
                token_value = %earning.token_value,
                amount = %earning.amount_to_deposit,
                "dry run, not submitting"
            );
            None
        } else {
            Some(
                self.submit(finalizing, earning)
                    .await
                    .map_err(Stage::Submit.failed())?,
            )
        };

        Ok(FinalizationRecord {
            network: self.network,
            coin: self.coin,
            bucket_end_ts: finalizing,
            token_value: earning.token_value,
            supply,
            amount_to_deposit: earning.amount_to_deposit,
            hashrate,
            total_earned: stats.total_earned,
            submitted_at: Utc::now(),
            dry_run: options.dry_run,
            tx_hash,
        })
    }

    async fn check_withdraw(&self) -> Result<()> {
        if !self.network.requires_custody_transfer() {
            return Ok(());
        }
        let pending = with_retry(
            || self.custody.pending_balance(self.coin),
            "pending_balance",
            Service::Custody,
            &self.cancel,
        )
        .await?;
        if pending <= Decimal::ZERO {
            debug!(coin = %self.coin, "nothing pending in custody");
            return Ok(());
        }

        let transfer = cancellable(
            self.custody.withdraw(self.coin, pending, self.operator),
            Service::Custody,
            &self.cancel,
        )
        .await?;
        info!(coin = %self.coin, %pending, %transfer, "withdrew custody balance to operator");
        Ok(())
    }

    /// Day end to finalize: explicit, or the day after the ledger's last.
    pub async fn determine_target(&self, explicit: Option<i64>, now: i64) -> Result<i64> {
        let finalized = with_retry(
            || self.ledger.finalized_timestamp(),
            "finalized_timestamp",
            Service::Ledger,
            &self.cancel,
        )
        .await?;
        let finalizing = match explicit {
            Some(ts) => ts,
            None => finalized.checked_add(DAY_SECONDS).ok_or_else(|| {
                Error::Validation(format!("finalized timestamp {finalized} has no next day"))
            })?,
        };

        if !is_day_aligned(finalizing) {
            return Err(Error::Validation(format!(
                "timestamp {finalizing} is not a day boundary"
            )));
        }
        if finalizing < DAY_SECONDS {
            return Err(Error::Validation(format!(
                "timestamp {finalizing} ends no day after the epoch"
            )));
        }
        if finalizing <= finalized {
            return Err(Error::AlreadyFinalized {
                finalizing,
                finalized,
            });
        }
        if finalizing >= now {
            return Err(Error::FutureTimestamp { finalizing, now });
        }
        Ok(finalizing)
    }

    async fn fetch_pool_stats(&self, finalizing: i64) -> Result<PoolStats> {
        let day_start = finalizing - DAY_SECONDS;
        let stats = with_retry(
            || self.pool.daily_stats(self.coin, day_start),
            "daily_stats",
            Service::Pool,
            &self.cancel,
        )
        .await?;
        debug!(
            hashrate = %stats.hashrate,
            total_earned = %stats.total_earned,
            "fetched pool stats"
        );
        Ok(stats)
    }

    async fn validate_supply(
        &self,
        finalizing: i64,
        hashrate: Decimal,
        enforce: bool,
    ) -> Result<U256> {
        let supply = SupplyAggregator::new(self.ledger.as_ref(), &self.cancel)
            .supply_at(finalizing)
            .await?;
        if supply.is_zero() {
            return Err(Error::Validation(format!(
                "no tokens in circulation for day ending {finalizing}, nothing to finalize"
            )));
        }

        let supply_units = to_decimal(supply)?;
        if hashrate < supply_units {
            let message = format!(
                "pool hashrate {hashrate} {} is below circulating supply {supply}",
                self.coin.hashrate_unit()
            );
            if !enforce {
                return Err(Error::Consistency(message));
            }
            warn!("{message}, continuing as enforced");
        }
        Ok(supply)
    }

    async fn compute_earning(
        &self,
        stats: &PoolStats,
        hashrate: Decimal,
        supply: U256,
    ) -> Result<Earning> {
        let token = with_retry(
            || self.ledger.earning_token(),
            "earning_token",
            Service::Ledger,
            &self.cancel,
        )
        .await?;
        let earning = compute_earning(stats.total_earned, hashrate, token.decimals, supply)?;
        if earning.token_value.is_zero() {
            warn!(total_earned = %stats.total_earned, "token value rounds to zero");
        }
        Ok(earning)
    }

    async fn validate_balance(&self, required: U256) -> Result<()> {
        let available = with_retry(
            || self.ledger.earning_token_balance(self.operator),
            "earning_token_balance",
            Service::Ledger,
            &self.cancel,
        )
        .await?;
        if available < required {
            return Err(Error::InsufficientFunds {
                required,
                available,
            });
        }
        Ok(())
    }

    async fn submit(&self, finalizing: i64, earning: Earning) -> Result<String> {
        let tx_hash = cancellable(
            self.ledger.finalize(
                finalizing,
                earning.token_value,
                self.recipient,
                earning.amount_to_deposit,
            ),
            Service::Ledger,
            &self.cancel,
        )
        .await?;
        info!(finalizing, %tx_hash, "finalized");
        Ok(tx_hash)
    }

    async fn report(&self, stage: Stage, error: &Error) {
        let report = FailureReport {
            network: self.network,
            coin: self.coin,
            stage,
            error: error.to_string(),
            occurred_at: Utc::now(),
        };
        if let Err(e) = self.notifier.notify(&report).await {
            warn!(error = %e, "failed to deliver failure report");
        }
    }
}

/// The ledger being ahead of, or level with, the clock is the normal idle
/// state rather than a failure.
fn should_report(error: &Error) -> bool {
    !matches!(
        error,
        Error::AlreadyFinalized { .. } | Error::FutureTimestamp { .. }
    )
}

/// `floor(total_earned / hashrate * 10^decimals)` base units per token, and
/// that value times `supply`.
pub fn compute_earning(
    total_earned: Decimal,
    hashrate: Decimal,
    decimals: u8,
    supply: U256,
) -> Result<Earning> {
    if hashrate <= Decimal::ZERO {
        return Err(Error::Consistency(format!(
            "pool reported non-positive hashrate {hashrate}"
        )));
    }
    if total_earned < Decimal::ZERO {
        return Err(Error::Consistency(format!(
            "pool reported negative earnings {total_earned}"
        )));
    }
    let scale = 10u64
        .checked_pow(decimals.into())
        .ok_or_else(|| Error::Validation(format!("unsupported token decimals {decimals}")))?;

    let per_unit = total_earned
        .checked_div(hashrate)
        .ok_or_else(|| overflow("earning per unit"))?;
    let token_value = per_unit
        .checked_mul(Decimal::from(scale))
        .ok_or_else(|| overflow("token value"))?
        .floor()
        .to_u128()
        .map(U256::from)
        .ok_or_else(|| overflow("token value"))?;
    let amount_to_deposit = token_value
        .checked_mul(supply)
        .ok_or_else(|| overflow("deposit amount"))?;

    Ok(Earning {
        token_value,
        amount_to_deposit,
    })
}

fn to_decimal(value: U256) -> Result<Decimal> {
    u128::try_from(value)
        .ok()
        .and_then(Decimal::from_u128)
        .ok_or_else(|| overflow("supply"))
}

fn overflow(what: &str) -> Error {
    Error::Consistency(format!("{what} overflows"))
}
