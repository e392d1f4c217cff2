use alloy_primitives::{Address, U256};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use mining_token_finalizer::{
    api::{ApiState, router},
    cache::{EarningCache, MemoryStore},
    ledger::MockLedger,
    types::{Coin, EarningToken, Network},
};
use mining_token_period::{
    Granularity, Period,
    day::{DAY_SECONDS, parse_day},
};
use rust_decimal::{Decimal, dec};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

fn anchor() -> i64 {
    parse_day("2022-02-03").unwrap()
}

/// Router over a cache synced three days past the anchor at 100 base units
/// per token per day.
async fn synced_app() -> Router {
    let mut ledger = MockLedger::new();
    ledger
        .expect_contract_address()
        .returning(|| Address::new([0x0e; 20]));
    ledger
        .expect_finalized_timestamp()
        .returning(|| Ok(anchor() + 3 * DAY_SECONDS));
    ledger.expect_earning_token().returning(|| {
        Ok(EarningToken {
            address: Address::new([0x0d; 20]),
            name: "Wrapped BTC".to_string(),
            symbol: "WBTC".to_string(),
            decimals: 8,
        })
    });
    ledger
        .expect_token_value_at()
        .returning(|_| Ok(U256::from(100u64)));

    let cache = EarningCache::new(Arc::new(MemoryStore::new()))
        .with_anchor(Network::Bsc, Coin::Btc, anchor())
        .with_anchor(Network::Bsc, Coin::Eth, anchor());
    let report = cache
        .sync(Network::Bsc, Coin::Btc, &ledger, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.to_ts, anchor() + 3 * DAY_SECONDS);

    router(ApiState {
        cache: Arc::new(cache),
    })
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let res = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn earning(body: &Value) -> Decimal {
    serde_json::from_value(body["properties"]["earning"].clone()).unwrap()
}

#[tokio::test]
async fn test_health() {
    let (status, body) = get(synced_app().await, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_finalized_daily_token() {
    let period = Period::new(anchor(), Granularity::Daily).unwrap();
    let uri = format!("/token/bsc/btc/0x{}", period.token_id().to_hex());

    let (status, body) = get(synced_app().await, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "BTC Daily Mining Token 2022-02-03");
    assert_eq!(body["properties"]["finalized"], true);
    assert_eq!(body["properties"]["id"]["type"], "daily");
    assert_eq!(body["properties"]["id"]["startTs"], anchor());
    assert_eq!(body["properties"]["id"]["end"], "2022-02-04");
    assert_eq!(body["properties"]["earningToken"]["symbol"], "WBTC");
    assert_eq!(earning(&body), dec!(0.000001));
}

#[tokio::test]
async fn test_metadata_uri_hex_id() {
    // ERC-1155 `{id}` substitution: 64 lowercase hex digits, no prefix
    let period = Period::new(anchor(), Granularity::Daily).unwrap();
    let uri = format!("/token/bsc/btc/{}", period.token_id().to_hex());

    let (status, body) = get(synced_app().await, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["properties"]["id"]["startTs"], anchor());
    assert_eq!(
        body["properties"]["id"]["hex"],
        format!("0x{}", period.token_id().to_hex())
    );
    assert_eq!(earning(&body), dec!(0.000001));
}

#[tokio::test]
async fn test_partially_finalized_biweekly_token() {
    let period = Period::new(anchor(), Granularity::Biweekly).unwrap();
    let uri = format!("/token/bsc/btc/{}", period.token_id().to_decimal());

    let (status, body) = get(synced_app().await, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["properties"]["finalized"], false);
    assert_eq!(body["properties"]["id"]["decimal"], period.token_id().to_decimal());
    assert_eq!(earning(&body), dec!(0.000003));
}

#[tokio::test]
async fn test_token_not_started_earns_nothing() {
    let period = Period::new(anchor() + 7 * DAY_SECONDS, Granularity::Weekly).unwrap();
    let uri = format!("/token/bsc/btc/0x{}", period.token_id().to_hex());

    let (status, body) = get(synced_app().await, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["properties"]["finalized"], false);
    assert_eq!(earning(&body), Decimal::ZERO);
}

#[tokio::test]
async fn test_unsynced_deployment_is_not_found() {
    let period = Period::new(anchor(), Granularity::Daily).unwrap();
    let uri = format!("/token/bsc/eth/0x{}", period.token_id().to_hex());

    let (status, body) = get(synced_app().await, &uri).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "not_found");
    assert!(body["message"].as_str().unwrap().contains("bsc.eth"));
}

#[tokio::test]
async fn test_malformed_parameters() {
    let period = Period::new(anchor(), Granularity::Daily).unwrap();
    let id = period.token_id().to_hex();

    let (status, body) = get(synced_app().await, &format!("/token/solana/btc/0x{id}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_parameter");

    let (status, _) = get(synced_app().await, &format!("/token/bsc/doge/0x{id}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(synced_app().await, "/token/bsc/btc/not-a-number").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // start == end
    let (status, _) = get(synced_app().await, "/token/bsc/btc/0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
