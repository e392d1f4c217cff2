//! Cumulative per token earnings, keyed by day end.
//!
//! For every deployment the cache holds, for each finalized day end `T`, the
//! total base units one token has earned since the deployment anchor. The
//! value at the anchor is zero and every later value is its predecessor plus
//! the token value finalized for that day, so the earning of any period is a
//! difference of two lookups.

mod redis_store;
mod store;

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use alloy_primitives::U256;
use mining_token_period::{Period, day::DAY_SECONDS};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    error::{Error, Result, Service, with_retry},
    ledger::Ledger,
    types::{Coin, ContractSnapshot, EarningToken, FinalizationRecord, Network},
};

pub use self::{
    redis_store::RedisStore,
    store::{CacheStore, MemoryStore},
};

type EarningMap = BTreeMap<i64, U256>;

fn contract_key(network: Network, coin: Coin) -> String {
    format!("{network}.{coin}.contract")
}

fn earning_key(network: Network, coin: Coin, ts: i64) -> String {
    format!("{network}.{coin}.earning.{ts}")
}

fn earning_map_key(network: Network, coin: Coin) -> String {
    format!("{network}.{coin}.earning")
}

/// Earning of one token over a period, as far as it has been finalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenEarning {
    pub finalized: bool,
    /// Base units of the earning token.
    pub amount: U256,
    pub earning_token: EarningToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub network: Network,
    pub coin: Coin,
    pub from_ts: i64,
    pub to_ts: i64,
    pub written: usize,
}

pub struct EarningCache {
    store: Arc<dyn CacheStore>,
    anchors: HashMap<(Network, Coin), i64>,
    write_lock: Mutex<()>,
}

impl EarningCache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            anchors: HashMap::new(),
            write_lock: Mutex::new(()),
        }
    }

    /// Registers the day end at which a deployment's cumulative earning is 0.
    pub fn with_anchor(mut self, network: Network, coin: Coin, anchor_ts: i64) -> Self {
        self.anchors.insert((network, coin), anchor_ts);
        self
    }

    pub async fn close(&self) -> Result<()> {
        self.store.close().await
    }

    fn anchor(&self, network: Network, coin: Coin) -> Result<i64> {
        self.anchors.get(&(network, coin)).copied().ok_or_else(|| {
            Error::Validation(format!("no deployment configured for {network}.{coin}"))
        })
    }

    /// Cumulative earning at `bucket_end_ts`.
    pub async fn get(&self, network: Network, coin: Coin, bucket_end_ts: i64) -> Result<U256> {
        let key = earning_key(network, coin, bucket_end_ts);
        let value = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no earning cached at {key}")))?;
        U256::from_str_radix(&value, 10).map_err(|_| {
            Error::Consistency(format!("cached value at {key} is not a number: {value}"))
        })
    }

    pub async fn get_contract_snapshot(
        &self,
        network: Network,
        coin: Coin,
    ) -> Result<ContractSnapshot> {
        let key = contract_key(network, coin);
        let value = self
            .store
            .get(&key)
            .await?
            .ok_or_else(|| Error::NotFound(format!("no contract cached for {network}.{coin}")))?;
        Ok(serde_json::from_str(&value)?)
    }

    /// Appends finalized days in order. Records already cached with the same
    /// value are skipped; a different value for a cached day, a dry run
    /// record, or a gap before a record is an error. Returns the number of
    /// days written.
    pub async fn update(
        &self,
        network: Network,
        coin: Coin,
        records: &[FinalizationRecord],
    ) -> Result<usize> {
        let mut days = Vec::with_capacity(records.len());
        for record in records {
            if record.network != network || record.coin != coin {
                return Err(Error::Validation(format!(
                    "record for {}.{} passed to {network}.{coin}",
                    record.network, record.coin
                )));
            }
            if record.dry_run {
                return Err(Error::Validation(format!(
                    "dry run record for {} cannot be cached",
                    record.bucket_end_ts
                )));
            }
            days.push((record.bucket_end_ts, record.token_value));
        }
        self.append(network, coin, &days).await
    }

    /// Brings the cache up to the ledger's finalized timestamp.
    ///
    /// On first use the anchor is seeded with 0 and every day from there is
    /// replayed; afterwards only days past the latest cached one are read.
    /// The contract snapshot is refreshed last.
    pub async fn sync(
        &self,
        network: Network,
        coin: Coin,
        ledger: &dyn Ledger,
        cancel: &CancellationToken,
    ) -> Result<SyncReport> {
        let anchor = self.anchor(network, coin)?;
        let finalized = with_retry(
            || ledger.finalized_timestamp(),
            "finalized_timestamp",
            Service::Ledger,
            cancel,
        )
        .await?;
        let earning_token = with_retry(
            || ledger.earning_token(),
            "earning_token",
            Service::Ledger,
            cancel,
        )
        .await?;

        if finalized < anchor {
            return Err(Error::Validation(format!(
                "{network}.{coin} ledger finalized timestamp {finalized} precedes anchor {anchor}"
            )));
        }

        let latest = self
            .load_map(network, coin)
            .await?
            .keys()
            .next_back()
            .copied()
            .unwrap_or(anchor);
        if finalized < latest {
            return Err(Error::Consistency(format!(
                "cache for {network}.{coin} reaches {latest} but ledger is finalized at {finalized}"
            )));
        }

        let mut days = Vec::new();
        let mut next = latest.checked_add(DAY_SECONDS);
        while let Some(ts) = next.filter(|ts| *ts <= finalized) {
            let value = with_retry(
                || ledger.token_value_at(ts),
                "token_value_at",
                Service::Ledger,
                cancel,
            )
            .await?;
            days.push((ts, value));
            next = ts.checked_add(DAY_SECONDS);
        }
        let written = self.append(network, coin, &days).await?;

        let snapshot = ContractSnapshot {
            address: ledger.contract_address(),
            finalized_timestamp: finalized,
            earning_token,
        };
        self.store
            .set(&contract_key(network, coin), &serde_json::to_string(&snapshot)?)
            .await?;

        info!(%network, %coin, from = latest, to = finalized, written, "synced earning cache");
        Ok(SyncReport {
            network,
            coin,
            from_ts: latest,
            to_ts: finalized,
            written,
        })
    }

    /// Syncs each deployment in turn, failing on the first that cannot be
    /// brought up to date.
    pub async fn bootstrap(
        &self,
        ledgers: &[(Network, Coin, Arc<dyn Ledger>)],
        cancel: &CancellationToken,
    ) -> Result<Vec<SyncReport>> {
        let mut reports = Vec::with_capacity(ledgers.len());
        for (network, coin, ledger) in ledgers {
            reports.push(self.sync(*network, *coin, ledger.as_ref(), cancel).await?);
        }
        Ok(reports)
    }

    /// Earning of one token of `period`, counted up to the last finalized day.
    pub async fn token_earning(
        &self,
        network: Network,
        coin: Coin,
        period: &Period,
    ) -> Result<TokenEarning> {
        let snapshot = self.get_contract_snapshot(network, coin).await?;
        let finalized_ts = snapshot.finalized_timestamp;
        let end = period.end_ts().min(finalized_ts);

        let amount = if end <= period.start_ts() {
            U256::ZERO
        } else {
            let start_value = self.get(network, coin, period.start_ts()).await?;
            let end_value = self.get(network, coin, end).await?;
            end_value.checked_sub(start_value).ok_or_else(|| {
                Error::Consistency(format!(
                    "cumulative earning decreases between {} and {end}",
                    period.start_ts()
                ))
            })?
        };

        Ok(TokenEarning {
            finalized: period.end_ts() <= finalized_ts,
            amount,
            earning_token: snapshot.earning_token,
        })
    }

    async fn load_map(&self, network: Network, coin: Coin) -> Result<EarningMap> {
        let Some(raw) = self.store.get(&earning_map_key(network, coin)).await? else {
            return Ok(EarningMap::new());
        };
        let stored: BTreeMap<i64, String> = serde_json::from_str(&raw)?;
        stored
            .into_iter()
            .map(|(ts, value)| {
                U256::from_str_radix(&value, 10).map(|v| (ts, v)).map_err(|_| {
                    Error::Consistency(format!("cached value for {ts} is not a number: {value}"))
                })
            })
            .collect()
    }

    async fn append(&self, network: Network, coin: Coin, days: &[(i64, U256)]) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let anchor = self.anchor(network, coin)?;
        let mut map = self.load_map(network, coin).await?;

        let mut pending = Vec::new();
        if map.is_empty() {
            map.insert(anchor, U256::ZERO);
            pending.push((earning_key(network, coin, anchor), U256::ZERO.to_string()));
        }

        for &(ts, token_value) in days {
            let previous = ts
                .checked_sub(DAY_SECONDS)
                .and_then(|day_before| map.get(&day_before))
                .copied()
                .ok_or_else(|| {
                    Error::Consistency(format!(
                        "no cached earning for the day before {ts} in {network}.{coin}"
                    ))
                })?;
            let cumulative = previous.checked_add(token_value).ok_or_else(|| {
                Error::Consistency(format!("cumulative earning overflows at {ts}"))
            })?;

            match map.get(&ts) {
                Some(existing) if *existing == cumulative => {
                    debug!(ts, "earning already cached");
                }
                Some(existing) => {
                    return Err(Error::Consistency(format!(
                        "cached earning at {ts} is {existing}, not overwriting with {cumulative}"
                    )));
                }
                None => {
                    map.insert(ts, cumulative);
                    pending.push((earning_key(network, coin, ts), cumulative.to_string()));
                }
            }
        }

        if pending.is_empty() {
            return Ok(0);
        }

        // Per day keys first, so anything the durable map lists is readable.
        self.store.set_many(&pending).await?;
        let stored: BTreeMap<i64, String> =
            map.iter().map(|(ts, v)| (*ts, v.to_string())).collect();
        self.store
            .set(&earning_map_key(network, coin), &serde_json::to_string(&stored)?)
            .await?;

        Ok(pending.len())
    }
}
