use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use mining_token_period::day::format_day;
use mockall::automock;
use rust_decimal::Decimal;
use serde::Deserialize;
use sha2::Sha256;
use tracing::debug;
use url::Url;

use crate::{
    error::{Error, ExternalKind, Result, Service},
    types::{Coin, PoolStats},
};

type HmacSha256 = Hmac<Sha256>;

const DAILY_STATS_PATH: &str = "api/v1/stats/daily";

/// Daily output of the mining pool.
#[automock]
#[async_trait]
pub trait PoolStatsSource: Send + Sync {
    /// Hashrate (raw pool units) and earnings for the day starting at
    /// `day_start_ts`.
    async fn daily_stats(&self, coin: Coin, day_start_ts: i64) -> Result<PoolStats>;
}

#[derive(Debug, Clone)]
pub struct PoolCredentials {
    pub user_id: String,
    pub api_key: String,
    pub api_secret: String,
}

pub struct HttpPoolClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: PoolCredentials,
}

#[derive(Debug, Deserialize)]
struct PoolResponse<T> {
    code: i64,
    #[serde(default)]
    message: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DailyStats {
    hashrate_last24h: Decimal,
    earned_last24h: Decimal,
}

impl HttpPoolClient {
    pub fn new(base_url: Url, credentials: PoolCredentials, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::http(Service::Pool, e))?;
        Ok(Self {
            http,
            base_url,
            credentials,
        })
    }

    fn endpoint(&self) -> Result<Url> {
        self.base_url
            .join(DAILY_STATS_PATH)
            .map_err(|e| Error::Validation(format!("invalid pool url: {e}")))
    }
}

#[async_trait]
impl PoolStatsSource for HttpPoolClient {
    async fn daily_stats(&self, coin: Coin, day_start_ts: i64) -> Result<PoolStats> {
        let nonce = Utc::now().timestamp_millis().to_string();
        let signature = sign(
            &self.credentials.api_secret,
            &self.credentials.user_id,
            &self.credentials.api_key,
            &nonce,
        )?;
        let date = format_day(day_start_ts);
        debug!(%coin, %date, "requesting pool stats");

        let response = self
            .http
            .post(self.endpoint()?)
            .form(&[
                ("userId", self.credentials.user_id.as_str()),
                ("key", self.credentials.api_key.as_str()),
                ("nonce", nonce.as_str()),
                ("signature", signature.as_str()),
                ("coin", coin.symbol()),
                ("date", date.as_str()),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::http(Service::Pool, e))?;
        let body: PoolResponse<DailyStats> = response
            .json()
            .await
            .map_err(|e| Error::http(Service::Pool, e))?;

        parse_response(body)
    }
}

fn parse_response(body: PoolResponse<DailyStats>) -> Result<PoolStats> {
    if body.code != 0 {
        return Err(Error::external(
            Service::Pool,
            ExternalKind::Pool {
                code: body.code,
                message: body.message,
            },
        ));
    }
    let data = body.data.ok_or_else(|| {
        Error::external(
            Service::Pool,
            ExternalKind::Pool {
                code: body.code,
                message: "response carried no data".to_string(),
            },
        )
    })?;
    Ok(PoolStats {
        hashrate: data.hashrate_last24h,
        total_earned: data.earned_last24h,
        as_of: Utc::now(),
    })
}

/// `HMAC-SHA256(secret, user_id + api_key + nonce)` as uppercase hex.
pub fn sign(secret: &str, user_id: &str, api_key: &str, nonce: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| Error::Validation(format!("invalid pool api secret: {e}")))?;
    mac.update(user_id.as_bytes());
    mac.update(api_key.as_bytes());
    mac.update(nonce.as_bytes());
    Ok(hex::encode_upper(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::dec;

    #[test]
    fn test_sign_matches_rfc4231() {
        // RFC 4231 test case 2, message split across the three inputs.
        let signature = sign("Jefe", "what do ya", " want for ", "nothing?").unwrap();
        assert_eq!(
            signature,
            "5BDCC146BF60754E6A042426089575C75A003F089D2739839DEC58B964EC3843"
        );
    }

    #[test]
    fn test_sign_is_deterministic_and_uppercase() {
        let a = sign("secret", "user", "key", "1700000000000").unwrap();
        let b = sign("secret", "user", "key", "1700000000000").unwrap();
        let c = sign("secret", "user", "key", "1700000000001").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
        assert!(!a.chars().any(|ch| ch.is_ascii_lowercase()));
    }

    #[test]
    fn test_parse_response() {
        let body: PoolResponse<DailyStats> = serde_json::from_str(
            r#"{"code":0,"message":"ok","data":{"hashrateLast24h":"1000000000000000","earnedLast24h":"4433668.78"}}"#,
        )
        .unwrap();
        let stats = parse_response(body).unwrap();
        assert_eq!(stats.hashrate, dec!(1000000000000000));
        assert_eq!(stats.total_earned, dec!(4433668.78));
    }

    #[test]
    fn test_nonzero_code_is_external_error() {
        let body: PoolResponse<DailyStats> =
            serde_json::from_str(r#"{"code":1003,"message":"bad signature","data":null}"#).unwrap();
        let err = parse_response(body).unwrap_err();
        assert!(matches!(
            err,
            Error::ExternalService {
                service: Service::Pool,
                kind: ExternalKind::Pool { code: 1003, .. }
            }
        ));
        assert!(!err.is_transient());
    }
}
