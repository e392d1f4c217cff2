use alloy_primitives::Address;
use async_trait::async_trait;
use mockall::automock;
use rust_decimal::Decimal;
use tracing::debug;

use crate::{
    error::{Error, ExternalKind, Result, Service},
    types::Coin,
};

/// Exchange account that receives pool payouts on custody networks.
#[automock]
#[async_trait]
pub trait Custody: Send + Sync {
    /// Balance waiting to be moved to the operator.
    async fn pending_balance(&self, coin: Coin) -> Result<Decimal>;

    /// Moves `amount` to `destination`, returning the custodian's transfer id.
    async fn withdraw(&self, coin: Coin, amount: Decimal, destination: Address) -> Result<String>;
}

/// Stand-in for a missing exchange custodian. Every call fails, so a
/// deployment on a custody network cannot finalize until one is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCustody;

fn unconfigured(coin: Coin) -> Error {
    Error::external(
        Service::Custody,
        ExternalKind::Custody(format!("no custodian configured for {}", coin.symbol())),
    )
}

#[async_trait]
impl Custody for NoCustody {
    async fn pending_balance(&self, coin: Coin) -> Result<Decimal> {
        debug!(%coin, "pending balance requested without a custodian");
        Err(unconfigured(coin))
    }

    async fn withdraw(&self, coin: Coin, amount: Decimal, _destination: Address) -> Result<String> {
        debug!(%coin, %amount, "withdrawal requested without a custodian");
        Err(unconfigured(coin))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_custody_refuses_everything() {
        let custody = NoCustody;
        let err = custody.pending_balance(Coin::Btc).await.unwrap_err();
        assert!(matches!(
            err,
            Error::ExternalService {
                service: Service::Custody,
                kind: ExternalKind::Custody(_)
            }
        ));
        assert!(!err.is_transient());
        assert!(
            custody
                .withdraw(Coin::Btc, Decimal::ONE, Address::ZERO)
                .await
                .is_err()
        );
    }
}
