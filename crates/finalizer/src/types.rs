use std::{fmt, str::FromStr};

use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Mined asset backing a token series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Coin {
    Btc,
    Eth,
    Fil,
}

impl Coin {
    pub const ALL: [Coin; 3] = [Coin::Btc, Coin::Eth, Coin::Fil];

    pub fn as_str(&self) -> &'static str {
        match self {
            Coin::Btc => "btc",
            Coin::Eth => "eth",
            Coin::Fil => "fil",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Coin::Btc => "BTC",
            Coin::Eth => "ETH",
            Coin::Fil => "FIL",
        }
    }

    /// Raw pool units per one canonical hashrate unit.
    pub fn hashrate_factor(&self) -> Decimal {
        match self {
            Coin::Btc => Decimal::from(1_000_000_000_000u64),
            Coin::Eth => Decimal::from(1_000_000u64),
            Coin::Fil => Decimal::from(1u64 << 40),
        }
    }

    pub fn hashrate_unit(&self) -> &'static str {
        match self {
            Coin::Btc => "TH/s",
            Coin::Eth => "MH/s",
            Coin::Fil => "TiB",
        }
    }

    /// Converts a raw pool reading into canonical units.
    pub fn canonical_hashrate(&self, raw: Decimal) -> Decimal {
        raw / self.hashrate_factor()
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Coin {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "btc" => Ok(Coin::Btc),
            "eth" => Ok(Coin::Eth),
            "fil" => Ok(Coin::Fil),
            other => Err(Error::Validation(format!("unknown coin: {other}"))),
        }
    }
}

/// Chain a token ledger is deployed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    Bsc,
    BscTest,
    Polygon,
    PolygonMumbai,
}

impl Network {
    pub const ALL: [Network; 4] = [
        Network::Bsc,
        Network::BscTest,
        Network::Polygon,
        Network::PolygonMumbai,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Bsc => "bsc",
            Network::BscTest => "bsc-test",
            Network::Polygon => "polygon",
            Network::PolygonMumbai => "polygon-mumbai",
        }
    }

    pub fn chain_id(&self) -> u64 {
        match self {
            Network::Bsc => 56,
            Network::BscTest => 97,
            Network::Polygon => 137,
            Network::PolygonMumbai => 80_001,
        }
    }

    /// Pool payouts for this network land in exchange custody and must be
    /// withdrawn to the operator before reconciling.
    pub fn requires_custody_transfer(&self) -> bool {
        matches!(self, Network::Bsc)
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bsc" => Ok(Network::Bsc),
            "bsc-test" | "bsctest" => Ok(Network::BscTest),
            "polygon" => Ok(Network::Polygon),
            "polygon-mumbai" | "mumbai" => Ok(Network::PolygonMumbai),
            other => Err(Error::Validation(format!("unknown network: {other}"))),
        }
    }
}

/// ERC-20 token paid out to mining token holders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarningToken {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractSnapshot {
    pub address: Address,
    pub finalized_timestamp: i64,
    pub earning_token: EarningToken,
}

/// One day of pool output, hashrate in raw pool units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStats {
    pub hashrate: Decimal,
    pub total_earned: Decimal,
    pub as_of: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizationRecord {
    pub network: Network,
    pub coin: Coin,
    pub bucket_end_ts: i64,
    pub token_value: U256,
    pub supply: U256,
    pub amount_to_deposit: U256,
    /// Canonical units.
    pub hashrate: Decimal,
    pub total_earned: Decimal,
    pub submitted_at: DateTime<Utc>,
    pub dry_run: bool,
    pub tx_hash: Option<String>,
}
