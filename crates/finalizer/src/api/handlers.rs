use axum::{
    Json,
    extract::{Path, State},
};
use mining_token_period::{Period, TokenId, day::format_day};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Value, json};

use super::{ApiError, ApiResult, ApiState};
use crate::types::{Coin, EarningToken, Network};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetadata {
    pub name: String,
    pub description: String,
    pub properties: TokenProperties,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenProperties {
    pub id: IdProperties,
    pub earning_token: EarningToken,
    pub finalized: bool,
    /// Earning per token in whole earning token units.
    pub earning: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdProperties {
    pub hex: String,
    pub decimal: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub start_ts: i64,
    pub end_ts: i64,
    pub start: String,
    pub end: String,
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn token_metadata(
    State(state): State<ApiState>,
    Path((network, coin, id)): Path<(String, String, String)>,
) -> ApiResult<Json<TokenMetadata>> {
    let network: Network = network.parse()?;
    let coin: Coin = coin.parse()?;
    let id: TokenId = id
        .parse()
        .map_err(|e| ApiError::InvalidParameter(format!("{e}")))?;
    let period =
        Period::decode(id).map_err(|e| ApiError::InvalidParameter(format!("token {id}: {e}")))?;

    let earning = state.cache.token_earning(network, coin, &period).await?;
    let decimals = earning.earning_token.decimals;
    let amount = i128::try_from(earning.amount)
        .ok()
        .and_then(|units| Decimal::try_from_i128_with_scale(units, decimals.into()).ok())
        .ok_or_else(|| {
            ApiError::Internal(format!(
                "earning {} does not fit a decimal with {decimals} places",
                earning.amount
            ))
        })?;

    Ok(Json(TokenMetadata {
        name: token_name(coin, &period),
        description: token_description(network, coin, &period, &earning.earning_token),
        properties: TokenProperties {
            id: IdProperties {
                hex: format!("0x{}", id.to_hex()),
                decimal: id.to_decimal(),
                kind: period.kind().to_string(),
                start_ts: period.start_ts(),
                end_ts: period.end_ts(),
                start: format_day(period.start_ts()),
                end: format_day(period.end_ts()),
            },
            earning_token: earning.earning_token,
            finalized: earning.finalized,
            earning: amount,
        },
    }))
}

fn token_name(coin: Coin, period: &Period) -> String {
    let kind = period.kind();
    let mut chars = kind.chars();
    let kind = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    format!(
        "{} {kind} Mining Token {}",
        coin.symbol(),
        format_day(period.start_ts())
    )
}

fn token_description(
    network: Network,
    coin: Coin,
    period: &Period,
    token: &EarningToken,
) -> String {
    format!(
        "One {} of {} hashrate on {network}, paying {} for every day from {} to {} (UTC).",
        coin.hashrate_unit(),
        coin.symbol(),
        token.symbol,
        format_day(period.start_ts()),
        format_day(period.end_ts()),
    )
}
