//! Circulating supply for one day across every overlapping token series.

use alloy_primitives::{Address, U256};
use futures::future::try_join_all;
use mining_token_period::{Granularity, Period, generator::periods_covering};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    error::{Error, Result, Service, with_retry},
    ledger::Ledger,
};

pub struct SupplyAggregator<'a> {
    ledger: &'a dyn Ledger,
    cancel: &'a CancellationToken,
}

impl<'a> SupplyAggregator<'a> {
    pub fn new(ledger: &'a dyn Ledger, cancel: &'a CancellationToken) -> Self {
        Self { ledger, cancel }
    }

    /// Tokens in circulation for the day ending at `day_end_ts`.
    ///
    /// Sums the daily bucket and every weekly and biweekly bucket containing
    /// the day, each net of the custodian's unsold balance. Buckets are read
    /// concurrently and any failed read fails the whole sum.
    pub async fn supply_at(&self, day_end_ts: i64) -> Result<U256> {
        let custodian = with_retry(
            || self.ledger.custodian(),
            "custodian",
            Service::Ledger,
            self.cancel,
        )
        .await?;

        let mut periods = Vec::new();
        for granularity in Granularity::ALL {
            periods.extend(periods_covering(day_end_ts, granularity)?);
        }

        let circulating =
            try_join_all(periods.iter().map(|p| self.circulating(custodian, *p))).await?;

        let total = circulating
            .into_iter()
            .try_fold(U256::ZERO, |acc, amount| acc.checked_add(amount))
            .ok_or_else(|| Error::Consistency(format!("supply overflow at {day_end_ts}")))?;
        debug!(day_end_ts, buckets = periods.len(), %total, "aggregated supply");
        Ok(total)
    }

    async fn circulating(&self, custodian: Address, period: Period) -> Result<U256> {
        let id = period.token_id();
        let (supply, unsold) = tokio::try_join!(
            with_retry(
                || self.ledger.supply_of(id),
                "supply_of",
                Service::Ledger,
                self.cancel
            ),
            with_retry(
                || self.ledger.balance_of(custodian, id),
                "balance_of",
                Service::Ledger,
                self.cancel
            ),
        )?;
        supply.checked_sub(unsold).ok_or_else(|| {
            Error::Consistency(format!(
                "custodian holds {unsold} of {period} but only {supply} exist"
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ExternalKind, ledger::MockLedger};
    use mining_token_period::day::parse_day;

    const CUSTODIAN: Address = Address::new([0xcc; 20]);

    fn day_end() -> i64 {
        parse_day("2022-02-10").unwrap()
    }

    #[tokio::test]
    async fn test_sums_all_overlapping_buckets() {
        let day_end = day_end();
        let daily = Period::new(day_end - 86_400, Granularity::Daily)
            .unwrap()
            .token_id();

        let mut ledger = MockLedger::new();
        ledger.expect_custodian().returning(|| Ok(CUSTODIAN));
        ledger.expect_supply_of().times(22).returning(move |id| {
            if id == daily {
                Ok(U256::from(100u64))
            } else {
                Ok(U256::from(10u64))
            }
        });
        ledger
            .expect_balance_of()
            .times(22)
            .returning(move |account, id| {
                assert_eq!(account, CUSTODIAN);
                if id == daily {
                    Ok(U256::from(40u64))
                } else {
                    Ok(U256::from(1u64))
                }
            });

        let cancel = CancellationToken::new();
        let supply = SupplyAggregator::new(&ledger, &cancel)
            .supply_at(day_end)
            .await
            .unwrap();
        // daily: 100 - 40, plus 21 weekly/biweekly candidates at 10 - 1
        assert_eq!(supply, U256::from(60u64 + 21 * 9));
    }

    #[tokio::test]
    async fn test_custodian_above_supply_is_inconsistent() {
        let mut ledger = MockLedger::new();
        ledger.expect_custodian().returning(|| Ok(CUSTODIAN));
        ledger
            .expect_supply_of()
            .returning(|_| Ok(U256::from(5u64)));
        ledger
            .expect_balance_of()
            .returning(|_, _| Ok(U256::from(6u64)));

        let cancel = CancellationToken::new();
        let result = SupplyAggregator::new(&ledger, &cancel)
            .supply_at(day_end())
            .await;
        assert!(matches!(result, Err(Error::Consistency(_))));
    }

    #[tokio::test]
    async fn test_one_failed_read_fails_the_sum() {
        let failing = Period::new(day_end() - 3 * 86_400, Granularity::Weekly)
            .unwrap()
            .token_id();

        let mut ledger = MockLedger::new();
        ledger.expect_custodian().returning(|| Ok(CUSTODIAN));
        ledger.expect_supply_of().returning(move |id| {
            if id == failing {
                Err(Error::external(
                    Service::Ledger,
                    ExternalKind::Rpc {
                        code: 3,
                        message: "execution reverted".into(),
                    },
                ))
            } else {
                Ok(U256::from(10u64))
            }
        });
        ledger
            .expect_balance_of()
            .returning(|_, _| Ok(U256::ZERO));

        let cancel = CancellationToken::new();
        let result = SupplyAggregator::new(&ledger, &cancel)
            .supply_at(day_end())
            .await;
        assert!(matches!(result, Err(Error::ExternalService { .. })));
    }

    #[tokio::test]
    async fn test_rejects_unaligned_day() {
        let mut ledger = MockLedger::new();
        ledger.expect_custodian().returning(|| Ok(CUSTODIAN));
        let cancel = CancellationToken::new();
        let result = SupplyAggregator::new(&ledger, &cancel)
            .supply_at(day_end() + 1)
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }
}
