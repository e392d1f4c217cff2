pub mod validation;

use alloy_primitives::Address;
use anyhow::{Context, Result, anyhow};
use config::{Config as ConfigBuilder, Environment, File};
use mining_token_period::day::parse_day;
use serde::{Deserialize, Serialize};
use std::{fmt, net::SocketAddr, path::Path, time::Duration};
use url::Url;
use validation::validate_config;

use crate::types::{Coin, Network};

/// Main settings for the finalizer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level for application logging (e.g., "info", "debug", "warn", "error")
    pub log_level: String,
    /// Account that funds deposits and signs finalize transactions
    pub operator: OperatorSettings,
    /// Token ledger deployments, one per (network, coin)
    pub deployments: Vec<DeploymentSettings>,
    /// Mining pool API
    pub pool: PoolSettings,
    /// Earning cache backend
    #[serde(default)]
    pub cache: CacheSettings,
    /// Metadata API
    #[serde(default)]
    pub api: ApiSettings,
    /// Worker configuration (optional)
    #[serde(default)]
    pub worker: WorkerSettings,
    /// Failure notifications (optional, logs only when absent)
    pub notifier: Option<NotifierSettings>,
    /// Prometheus exporter (optional)
    pub metrics: Option<MetricsSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorSettings {
    /// Operator account address
    pub address: String,
    /// Recipient passed to finalize (default: operator)
    pub recipient: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentSettings {
    pub network: Network,
    pub coin: Coin,
    /// JSON-RPC endpoint of the chain
    pub rpc_url: String,
    /// Token ledger contract address
    pub contract: String,
    /// First day end covered by the ledger, "YYYY-MM-DD"
    pub anchor_date: String,
    /// Per request timeout in seconds (default: 30)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// How long to wait for a finalize receipt in seconds (default: 300)
    #[serde(default = "default_receipt_timeout")]
    pub receipt_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSettings {
    pub base_url: String,
    pub user_id: String,
    pub api_key: String,
    pub api_secret: String,
    /// Per request timeout in seconds (default: 30)
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Redis URL; an in-memory store is used when absent
    pub redis_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Listen address (default: 0.0.0.0:8080)
    pub listen_addr: SocketAddr,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

/// Worker configuration for automated finalization
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Check interval in seconds (default: 600 = 10 minutes)
    pub interval_seconds: u64,
    /// Directory holding one state file per deployment
    pub state_dir: String,
    /// Maximum consecutive failures before halting (default: 5)
    pub max_consecutive_failures: u32,
    /// Enable dry run mode for worker (default: false)
    pub enable_dry_run: bool,
    /// Finalize even when pool hashrate is below supply (default: false)
    pub enforce: bool,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            interval_seconds: 600,
            state_dir: "/var/lib/mining-token-finalizer".to_string(),
            max_consecutive_failures: 5,
            enable_dry_run: false,
            enforce: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierSettings {
    pub webhook_url: String,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSettings {
    pub addr: SocketAddr,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_receipt_timeout() -> u64 {
    300
}

impl DeploymentSettings {
    pub fn rpc_url(&self) -> Result<Url> {
        Url::parse(&self.rpc_url).with_context(|| format!("invalid rpc url {}", self.rpc_url))
    }

    pub fn contract_address(&self) -> Result<Address> {
        self.contract
            .parse()
            .with_context(|| format!("invalid contract address {}", self.contract))
    }

    pub fn anchor_ts(&self) -> Result<i64> {
        parse_day(&self.anchor_date)
            .with_context(|| format!("invalid anchor date {}", self.anchor_date))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_secs)
    }
}

impl Settings {
    /// Load configuration from a specific config file path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        // Env vars take priority over the file
        let settings = ConfigBuilder::builder()
            .add_source(File::with_name(&path.as_ref().to_string_lossy()))
            .add_source(
                Environment::with_prefix("MT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        validate_config(&settings)?;

        Ok(settings)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Result<Self> {
        // NOTE: It's ok if this fails (file might not exist)
        let _ = dotenvy::dotenv();

        let settings: Settings = ConfigBuilder::builder()
            .add_source(
                Environment::with_prefix("MT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        validate_config(&settings)?;

        Ok(settings)
    }

    pub fn deployment(&self, network: Network, coin: Coin) -> Result<&DeploymentSettings> {
        self.deployments
            .iter()
            .find(|d| d.network == network && d.coin == coin)
            .ok_or_else(|| anyhow!("no deployment configured for {network}.{coin}"))
    }

    /// Redis URL for commands whose cache writes must outlive the process.
    pub fn durable_cache_url(&self) -> Result<&str> {
        self.cache.redis_url.as_deref().ok_or_else(|| {
            anyhow!("cache.redis_url is not set; an in-memory cache is lost when the process exits")
        })
    }

    pub fn operator_address(&self) -> Result<Address> {
        self.operator
            .address
            .parse()
            .with_context(|| format!("invalid operator address {}", self.operator.address))
    }

    pub fn recipient_address(&self) -> Result<Address> {
        match &self.operator.recipient {
            Some(recipient) => recipient
                .parse()
                .with_context(|| format!("invalid recipient address {recipient}")),
            None => self.operator_address(),
        }
    }
}

impl fmt::Display for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let deployments = self
            .deployments
            .iter()
            .map(|d| format!("{}.{}", d.network, d.coin))
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "Settings {{\n\
             \tLog Level: {}\n\
             \tOperator: {}\n\
             \tDeployments: {}\n\
             \tPool URL: {}\n\
             \tCache: {}\n\
             \tAPI: {}\n\
             \tWorker Interval: {}s\n\
             }}",
            self.log_level,
            self.operator.address,
            deployments,
            self.pool.base_url,
            if self.cache.redis_url.is_some() { "redis" } else { "memory" },
            self.api.listen_addr,
            self.worker.interval_seconds,
        )
    }
}
