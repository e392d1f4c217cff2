use std::time::Duration;

use alloy::{
    contract,
    network::ReceiptResponse,
    providers::{DynProvider, PendingTransactionError, Provider, ProviderBuilder, WatchTxError},
    rpc::client::RpcClient,
    sol,
    transports::{RpcError, TransportError, TransportErrorKind, http::Http},
};
use alloy_primitives::{Address, U256};
use async_trait::async_trait;
use mining_token_period::TokenId;
use tracing::{debug, info};
use url::Url;

use super::Ledger;
use crate::{
    error::{Error, ExternalKind, Result, Service},
    types::EarningToken,
};

sol! {
    #[sol(rpc)]
    interface IMiningToken {
        function balanceOf(address account, uint256 id) external view returns (uint256);
        function totalSupply(uint256 id) external view returns (uint256);
        function custodian() external view returns (address);
        function finalizedTimestamp() external view returns (uint256);
        function earningToken() external view returns (address);
        function tokenValue(uint256 timestamp) external view returns (uint256);
        function finalize(
            uint256 timestamp,
            uint256 tokenValue,
            address recipient,
            uint256 totalAmount
        ) external;
    }

    #[sol(rpc)]
    interface IERC20 {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function balanceOf(address account) external view returns (uint256);
    }
}

/// JSON-RPC "parse error", reused for responses we cannot interpret.
const MALFORMED_RESPONSE: i64 = -32700;
/// Code geth reports for execution reverts.
const EXECUTION_REVERTED: i64 = 3;

/// Ledger contract reached through an alloy HTTP provider.
///
/// Transactions are sent unsigned (`eth_sendTransaction`), so the node or a
/// signing proxy in front of it must manage the operator key.
pub struct EvmLedger {
    provider: DynProvider,
    contract: IMiningToken::IMiningTokenInstance<DynProvider>,
    operator: Address,
    receipt_timeout: Duration,
}

impl EvmLedger {
    pub fn new(
        rpc_url: Url,
        contract: Address,
        operator: Address,
        request_timeout: Duration,
        receipt_timeout: Duration,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| Error::http(Service::Ledger, e))?;
        let client = RpcClient::new(Http::with_client(http, rpc_url), false);
        let provider = ProviderBuilder::new().connect_client(client).erased();

        Ok(Self {
            contract: IMiningToken::new(contract, provider.clone()),
            provider,
            operator,
            receipt_timeout,
        })
    }

    /// Fails when the node serves a different chain than `expected`.
    pub async fn ensure_chain_id(&self, expected: u64) -> Result<()> {
        let chain_id = self.provider.get_chain_id().await.map_err(transport_error)?;
        if chain_id != expected {
            return Err(Error::Validation(format!(
                "rpc endpoint serves chain {chain_id}, expected {expected}"
            )));
        }
        Ok(())
    }

    fn erc20(&self, token: Address) -> IERC20::IERC20Instance<DynProvider> {
        IERC20::new(token, self.provider.clone())
    }
}

#[async_trait]
impl Ledger for EvmLedger {
    fn contract_address(&self) -> Address {
        *self.contract.address()
    }

    async fn balance_of(&self, account: Address, id: TokenId) -> Result<U256> {
        self.contract
            .balanceOf(account, id.as_u256())
            .call()
            .await
            .map_err(contract_error)
    }

    async fn supply_of(&self, id: TokenId) -> Result<U256> {
        self.contract
            .totalSupply(id.as_u256())
            .call()
            .await
            .map_err(contract_error)
    }

    async fn custodian(&self) -> Result<Address> {
        self.contract.custodian().call().await.map_err(contract_error)
    }

    async fn finalized_timestamp(&self) -> Result<i64> {
        let value = self
            .contract
            .finalizedTimestamp()
            .call()
            .await
            .map_err(contract_error)?;
        i64::try_from(value)
            .map_err(|_| malformed(format!("finalized timestamp {value} overflows")))
    }

    async fn earning_token_address(&self) -> Result<Address> {
        self.contract.earningToken().call().await.map_err(contract_error)
    }

    async fn earning_token(&self) -> Result<EarningToken> {
        let address = self.earning_token_address().await?;
        let token = self.erc20(address);
        let name = token.name();
        let symbol = token.symbol();
        let decimals = token.decimals();
        let (name, symbol, decimals) = tokio::try_join!(
            async { name.call().await.map_err(contract_error) },
            async { symbol.call().await.map_err(contract_error) },
            async { decimals.call().await.map_err(contract_error) },
        )?;
        Ok(EarningToken {
            address,
            name,
            symbol,
            decimals,
        })
    }

    async fn earning_token_balance(&self, account: Address) -> Result<U256> {
        let token = self.earning_token_address().await?;
        self.erc20(token)
            .balanceOf(account)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn token_value_at(&self, timestamp: i64) -> Result<U256> {
        self.contract
            .tokenValue(timestamp_word(timestamp)?)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn finalize(
        &self,
        timestamp: i64,
        token_value: U256,
        recipient: Address,
        total_amount: U256,
    ) -> Result<String> {
        let call = self
            .contract
            .finalize(timestamp_word(timestamp)?, token_value, recipient, total_amount)
            .from(self.operator);

        // A reverting call fails here without spending gas.
        call.call().await.map_err(contract_error)?;

        let pending = call.send().await.map_err(contract_error)?;
        let tx_hash = format!("{:#x}", pending.tx_hash());
        info!(%tx_hash, timestamp, "finalize transaction sent");

        let receipt = pending
            .with_timeout(Some(self.receipt_timeout))
            .get_receipt()
            .await
            .map_err(pending_error)?;
        if !receipt.status() {
            return Err(Error::external(
                Service::Ledger,
                ExternalKind::Rpc {
                    code: EXECUTION_REVERTED,
                    message: format!("transaction {tx_hash} reverted"),
                },
            ));
        }
        debug!(%tx_hash, "finalize receipt confirmed");
        Ok(tx_hash)
    }
}

fn timestamp_word(timestamp: i64) -> Result<U256> {
    u64::try_from(timestamp)
        .map(U256::from)
        .map_err(|_| Error::Validation(format!("negative timestamp {timestamp}")))
}

fn malformed(message: String) -> Error {
    Error::external(
        Service::Ledger,
        ExternalKind::Rpc {
            code: MALFORMED_RESPONSE,
            message,
        },
    )
}

fn transport_error(err: TransportError) -> Error {
    let kind = match err {
        RpcError::ErrorResp(payload) => ExternalKind::Rpc {
            code: payload.code,
            message: payload.message.to_string(),
        },
        RpcError::Transport(TransportErrorKind::HttpError(http)) => ExternalKind::Transport {
            status: Some(http.status),
            message: http.body,
        },
        RpcError::Transport(kind) => ExternalKind::Transport {
            status: None,
            message: kind.to_string(),
        },
        other => return malformed(other.to_string()),
    };
    Error::external(Service::Ledger, kind)
}

fn contract_error(err: contract::Error) -> Error {
    match err {
        contract::Error::TransportError(err) => transport_error(err),
        contract::Error::PendingTransactionError(err) => pending_error(err),
        other => malformed(other.to_string()),
    }
}

fn pending_error(err: PendingTransactionError) -> Error {
    match err {
        PendingTransactionError::TransportError(err) => transport_error(err),
        PendingTransactionError::TxWatcher(WatchTxError::Timeout) => Error::external(
            Service::Ledger,
            ExternalKind::Timeout("finalize receipt".to_string()),
        ),
        other => Error::external(
            Service::Ledger,
            ExternalKind::Transport {
                status: None,
                message: other.to_string(),
            },
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::{rpc::json_rpc::ErrorPayload, transports::HttpError};

    fn ledger() -> EvmLedger {
        EvmLedger::new(
            "http://127.0.0.1:8545".parse().unwrap(),
            Address::new([0x0e; 20]),
            Address::new([0x0a; 20]),
            Duration::from_secs(5),
            Duration::from_secs(60),
        )
        .unwrap()
    }

    fn rpc_error(code: i64, message: &'static str) -> TransportError {
        RpcError::ErrorResp(ErrorPayload {
            code,
            message: message.into(),
            data: None,
        })
    }

    #[test]
    fn test_timestamp_word() {
        assert_eq!(
            timestamp_word(1_643_846_400).unwrap(),
            U256::from(1_643_846_400u64)
        );
        assert!(matches!(timestamp_word(-1), Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_contract_address() {
        assert_eq!(ledger().contract_address(), Address::new([0x0e; 20]));
    }

    #[test]
    fn test_rate_limit_is_transient() {
        let err = transport_error(rpc_error(-32005, "limit exceeded"));
        assert!(err.is_transient());
        assert!(matches!(
            err,
            Error::ExternalService {
                service: Service::Ledger,
                kind: ExternalKind::Rpc { code: -32005, .. }
            }
        ));
    }

    #[test]
    fn test_revert_is_permanent() {
        assert!(!transport_error(rpc_error(3, "execution reverted")).is_transient());
    }

    #[test]
    fn test_http_status_classification() {
        let unavailable = RpcError::Transport(TransportErrorKind::HttpError(HttpError {
            status: 503,
            body: "busy".to_string(),
        }));
        assert!(transport_error(unavailable).is_transient());

        let unauthorized = RpcError::Transport(TransportErrorKind::HttpError(HttpError {
            status: 401,
            body: "bad key".to_string(),
        }));
        assert!(!transport_error(unauthorized).is_transient());
    }

    #[test]
    fn test_connection_failure_is_transient() {
        let err = transport_error(TransportErrorKind::custom_str("connection reset"));
        assert!(err.is_transient());
    }

    #[test]
    fn test_receipt_timeout() {
        let err = pending_error(PendingTransactionError::TxWatcher(WatchTxError::Timeout));
        assert!(matches!(
            err,
            Error::ExternalService {
                kind: ExternalKind::Timeout(_),
                ..
            }
        ));
    }

    #[test]
    fn test_malformed_is_not_transient() {
        assert!(!malformed("decimals(): expected uint8".to_string()).is_transient());
    }
}
