mod evm;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use mining_token_period::TokenId;
use mockall::automock;

use crate::{error::Result, types::EarningToken};

pub use evm::EvmLedger;

/// The token ledger contract for one `(network, coin)` deployment.
#[automock]
#[async_trait]
pub trait Ledger: Send + Sync {
    fn contract_address(&self) -> Address;

    async fn balance_of(&self, account: Address, id: TokenId) -> Result<U256>;

    async fn supply_of(&self, id: TokenId) -> Result<U256>;

    /// Account holding unsold inventory; its balances are not in circulation.
    async fn custodian(&self) -> Result<Address>;

    /// End of the last finalized day.
    async fn finalized_timestamp(&self) -> Result<i64>;

    async fn earning_token_address(&self) -> Result<Address>;

    async fn earning_token(&self) -> Result<EarningToken>;

    async fn earning_token_balance(&self, account: Address) -> Result<U256>;

    /// Per token value finalized for the day ending at `timestamp`.
    async fn token_value_at(&self, timestamp: i64) -> Result<U256>;

    /// Records `token_value` for the day ending at `timestamp` and deposits
    /// `total_amount` of the earning token from the operator. Returns the
    /// transaction hash.
    async fn finalize(
        &self,
        timestamp: i64,
        token_value: U256,
        recipient: Address,
        total_amount: U256,
    ) -> Result<String>;
}
