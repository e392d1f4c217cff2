use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;
use serde::Serialize;
use tracing::error;
use url::Url;

use crate::{
    error::{Error, Result, Service},
    reconciler::Stage,
    types::{Coin, Network},
};

/// A failed reconciliation, as delivered to operators.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    pub network: Network,
    pub coin: Coin,
    pub stage: Stage,
    pub error: String,
    pub occurred_at: DateTime<Utc>,
}

#[automock]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, report: &FailureReport) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, report: &FailureReport) -> Result<()> {
        error!(
            network = %report.network,
            coin = %report.coin,
            stage = %report.stage,
            error = %report.error,
            "reconciliation failed"
        );
        Ok(())
    }
}

/// Posts each report as JSON, and logs it like [`LogNotifier`].
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: Url,
}

impl WebhookNotifier {
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::http(Service::Notifier, e))?;
        Ok(Self { http, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, report: &FailureReport) -> Result<()> {
        LogNotifier.notify(report).await?;
        self.http
            .post(self.url.clone())
            .json(report)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::http(Service::Notifier, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_json_shape() {
        let report = FailureReport {
            network: Network::Bsc,
            coin: Coin::Btc,
            stage: Stage::FetchPoolStats,
            error: "pool failure: timed out".to_string(),
            occurred_at: DateTime::from_timestamp(1_643_846_400, 0).unwrap(),
        };
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["network"], "bsc");
        assert_eq!(json["coin"], "btc");
        assert_eq!(json["stage"], "fetch-pool-stats");
        assert!(json["occurredAt"].is_string());
    }

    #[tokio::test]
    async fn test_log_notifier_never_fails() {
        let report = FailureReport {
            network: Network::Polygon,
            coin: Coin::Eth,
            stage: Stage::Submit,
            error: "reverted".to_string(),
            occurred_at: Utc::now(),
        };
        assert!(LogNotifier.notify(&report).await.is_ok());
    }
}
