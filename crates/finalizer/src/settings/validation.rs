use crate::settings::Settings;
use anyhow::{Result, bail};
use std::{
    collections::HashSet,
    net::{IpAddr, SocketAddr},
};

/// Validate the configuration values
pub fn validate_config(settings: &Settings) -> Result<()> {
    // Validate log level
    let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_log_levels.contains(&settings.log_level.to_lowercase().as_str()) {
        bail!(
            "Invalid log level '{}'. Valid options are: {:?}",
            settings.log_level,
            valid_log_levels
        );
    }

    // Validate operator accounts
    settings.operator_address()?;
    settings.recipient_address()?;

    // Validate deployments
    if settings.deployments.is_empty() {
        bail!("At least one deployment must be configured");
    }
    let mut seen = HashSet::new();
    for deployment in &settings.deployments {
        let name = format!("{}.{}", deployment.network, deployment.coin);
        if !seen.insert((deployment.network, deployment.coin)) {
            bail!("Deployment {name} is configured more than once");
        }
        if !is_http_url(&deployment.rpc_url) {
            bail!("Deployment {name} RPC URL must start with http:// or https://");
        }
        deployment.rpc_url()?;
        deployment.contract_address()?;
        deployment.anchor_ts()?;
        if deployment.request_timeout_secs == 0 {
            bail!("Deployment {name} request_timeout_secs must be greater than 0");
        }
        if deployment.receipt_timeout_secs == 0 {
            bail!("Deployment {name} receipt_timeout_secs must be greater than 0");
        }
    }

    // Validate pool settings
    if !is_http_url(&settings.pool.base_url) {
        bail!("Pool base URL must start with http:// or https://");
    }
    if settings.pool.user_id.is_empty() {
        bail!("Pool user_id cannot be empty");
    }
    if settings.pool.api_key.is_empty() {
        bail!("Pool api_key cannot be empty");
    }
    if settings.pool.api_secret.is_empty() {
        bail!("Pool api_secret cannot be empty");
    }
    if settings.pool.timeout_secs == 0 {
        bail!("Pool timeout_secs must be greater than 0");
    }

    // Validate cache settings
    if let Some(redis_url) = &settings.cache.redis_url {
        if !redis_url.starts_with("redis://") && !redis_url.starts_with("rediss://") {
            bail!("Cache redis_url must start with redis:// or rediss://");
        }
    }

    // Validate worker settings
    if settings.worker.interval_seconds == 0 {
        bail!("Worker interval_seconds must be greater than 0");
    }
    if settings.worker.max_consecutive_failures == 0 {
        bail!("Worker max_consecutive_failures must be greater than 0");
    }
    if settings.worker.state_dir.is_empty() {
        bail!("Worker state_dir cannot be empty");
    }

    if let Some(notifier) = &settings.notifier {
        if !is_http_url(&notifier.webhook_url) {
            bail!("Notifier webhook_url must start with http:// or https://");
        }
    }

    if let Some(metrics) = &settings.metrics {
        if !validate_socket_addr(&metrics.addr) {
            bail!("Invalid SocketAddr: {}", metrics.addr)
        }
    }

    Ok(())
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn validate_socket_addr(addr: &SocketAddr) -> bool {
    match addr.ip() {
        IpAddr::V4(ipv4) => !ipv4.is_broadcast() && !ipv4.is_multicast(),
        IpAddr::V6(ipv6) => !ipv6.is_unspecified() && !ipv6.is_multicast(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        settings::{
            ApiSettings, CacheSettings, DeploymentSettings, MetricsSettings, OperatorSettings,
            PoolSettings, WorkerSettings,
        },
        types::{Coin, Network},
    };
    use std::str::FromStr;

    fn create_valid_config() -> Settings {
        Settings {
            log_level: "info".to_string(),
            operator: OperatorSettings {
                address: "0x00000000000000000000000000000000000000aa".to_string(),
                recipient: None,
            },
            deployments: vec![DeploymentSettings {
                network: Network::Bsc,
                coin: Coin::Btc,
                rpc_url: "https://bsc-dataseed.binance.org".to_string(),
                contract: "0x00000000000000000000000000000000000000bb".to_string(),
                anchor_date: "2022-02-03".to_string(),
                request_timeout_secs: 30,
                receipt_timeout_secs: 300,
            }],
            pool: PoolSettings {
                base_url: "https://pool.example.com/".to_string(),
                user_id: "user".to_string(),
                api_key: "key".to_string(),
                api_secret: "secret".to_string(),
                timeout_secs: 30,
            },
            cache: CacheSettings {
                redis_url: Some("redis://127.0.0.1:6379".to_string()),
            },
            api: ApiSettings::default(),
            worker: WorkerSettings::default(),
            notifier: None,
            metrics: Some(MetricsSettings {
                addr: SocketAddr::from_str("127.0.0.1:9090").unwrap(),
            }),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = create_valid_config();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = create_valid_config();
        config.log_level = "invalid".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_addresses() {
        let mut config = create_valid_config();
        config.operator.address = "not-an-address".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = create_valid_config();
        config.deployments[0].contract = "0x1234".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_anchor_date() {
        let mut config = create_valid_config();
        config.deployments[0].anchor_date = "2022/02/03".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_duplicate_deployment() {
        let mut config = create_valid_config();
        let duplicate = config.deployments[0].clone();
        config.deployments.push(duplicate);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_urls() {
        let mut config = create_valid_config();
        config.deployments[0].rpc_url = "ws://node".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = create_valid_config();
        config.pool.base_url = "pool.example.com".to_string();
        assert!(validate_config(&config).is_err());

        let mut config = create_valid_config();
        config.cache.redis_url = Some("http://127.0.0.1:6379".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_worker_settings() {
        let mut config = create_valid_config();
        config.worker.interval_seconds = 0;
        assert!(validate_config(&config).is_err());

        let mut config = create_valid_config();
        config.worker.max_consecutive_failures = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_metrics_address() {
        let mut config = create_valid_config();
        config.metrics = Some(MetricsSettings {
            addr: SocketAddr::from_str("255.255.255.255:9090").unwrap(),
        });
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_durable_cache_requires_redis() {
        let mut config = create_valid_config();
        assert_eq!(config.durable_cache_url().unwrap(), "redis://127.0.0.1:6379");

        config.cache.redis_url = None;
        assert!(validate_config(&config).is_ok());
        assert!(config.durable_cache_url().is_err());
    }

    #[test]
    fn test_recipient_defaults_to_operator() {
        let config = create_valid_config();
        assert_eq!(
            config.recipient_address().unwrap(),
            config.operator_address().unwrap()
        );
    }
}
