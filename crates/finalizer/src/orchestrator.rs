use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

use crate::{
    cache::{CacheStore, EarningCache, MemoryStore, RedisStore},
    custody::NoCustody,
    ledger::{EvmLedger, Ledger},
    notifier::{LogNotifier, Notifier, WebhookNotifier},
    pool::{HttpPoolClient, PoolCredentials, PoolStatsSource},
    reconciler::Reconciler,
    settings::Settings,
    types::{Coin, Network},
};

/// Builds collaborators from settings, scoped to one process.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    pub settings: Settings,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(settings: &Settings, cancel: CancellationToken) -> Self {
        Self {
            settings: settings.clone(),
            cancel,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Ledger client for a deployment, checked against the network's chain id.
    pub async fn ledger(&self, network: Network, coin: Coin) -> Result<Arc<EvmLedger>> {
        let deployment = self.settings.deployment(network, coin)?;
        let ledger = EvmLedger::new(
            deployment.rpc_url()?,
            deployment.contract_address()?,
            self.settings.operator_address()?,
            deployment.request_timeout(),
            deployment.receipt_timeout(),
        )?;
        ledger
            .ensure_chain_id(network.chain_id())
            .await
            .with_context(|| format!("rpc endpoint for {network}.{coin}"))?;
        Ok(Arc::new(ledger))
    }

    pub fn pool(&self) -> Result<Arc<dyn PoolStatsSource>> {
        let pool = &self.settings.pool;
        let base_url: Url = pool
            .base_url
            .parse()
            .with_context(|| format!("invalid pool url {}", pool.base_url))?;
        let credentials = PoolCredentials {
            user_id: pool.user_id.clone(),
            api_key: pool.api_key.clone(),
            api_secret: pool.api_secret.clone(),
        };
        Ok(Arc::new(HttpPoolClient::new(
            base_url,
            credentials,
            Duration::from_secs(pool.timeout_secs),
        )?))
    }

    pub fn notifier(&self) -> Result<Arc<dyn Notifier>> {
        match &self.settings.notifier {
            Some(notifier) => {
                let url: Url = notifier
                    .webhook_url
                    .parse()
                    .with_context(|| format!("invalid webhook url {}", notifier.webhook_url))?;
                Ok(Arc::new(WebhookNotifier::new(
                    url,
                    Duration::from_secs(notifier.timeout_secs),
                )?))
            }
            None => Ok(Arc::new(LogNotifier)),
        }
    }

    /// Earning cache with every configured deployment's anchor registered.
    pub async fn cache(&self) -> Result<EarningCache> {
        let store: Arc<dyn CacheStore> = match &self.settings.cache.redis_url {
            Some(url) => Arc::new(RedisStore::connect(url).await?),
            None => {
                info!("no redis configured, using in-memory cache");
                Arc::new(MemoryStore::new())
            }
        };
        self.anchored(store)
    }

    fn anchored(&self, store: Arc<dyn CacheStore>) -> Result<EarningCache> {
        let mut cache = EarningCache::new(store);
        for deployment in &self.settings.deployments {
            let anchor = deployment.anchor_ts()?;
            cache = cache.with_anchor(deployment.network, deployment.coin, anchor);
        }
        Ok(cache)
    }

    /// Redis backed earning cache; refuses to fall back to memory.
    pub async fn durable_cache(&self) -> Result<EarningCache> {
        let url = self.settings.durable_cache_url()?;
        let store = Arc::new(RedisStore::connect(url).await?);
        self.anchored(store)
    }

    /// Syncs every configured deployment into `cache`. Any deployment that
    /// cannot be synced fails the whole bootstrap.
    pub async fn bootstrap_cache(&self, cache: &EarningCache) -> Result<()> {
        let mut ledgers = Vec::with_capacity(self.settings.deployments.len());
        for deployment in &self.settings.deployments {
            let (network, coin) = (deployment.network, deployment.coin);
            let ledger: Arc<dyn Ledger> = self.ledger(network, coin).await?;
            ledgers.push((network, coin, ledger));
        }
        let reports = cache
            .bootstrap(&ledgers, &self.cancel)
            .await
            .context("failed to bootstrap the earning cache")?;
        for report in reports {
            info!(
                "{}.{}: cache ready up to {} ({} new entries)",
                report.network, report.coin, report.to_ts, report.written
            );
        }
        Ok(())
    }

    pub async fn reconciler(&self, network: Network, coin: Coin) -> Result<Reconciler> {
        let ledger = self.ledger(network, coin).await?;
        self.reconciler_with(network, coin, ledger)
    }

    /// Reconciler over an already connected ledger.
    pub fn reconciler_with(
        &self,
        network: Network,
        coin: Coin,
        ledger: Arc<dyn Ledger>,
    ) -> Result<Reconciler> {
        Ok(Reconciler::new(
            network,
            coin,
            ledger,
            self.pool()?,
            // Custody networks fail CheckWithdraw until a custodian exists.
            Arc::new(NoCustody),
            self.notifier()?,
            self.settings.operator_address()?,
            self.settings.recipient_address()?,
            self.cancel.clone(),
        ))
    }
}
