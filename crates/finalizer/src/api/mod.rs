//! Token metadata over HTTP, served from the earning cache.

mod error;
mod handlers;

use std::{net::SocketAddr, sync::Arc};

use axum::{Router, routing::get};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{cache::EarningCache, error::Result};

pub use error::{ApiError, ApiResult};
pub use handlers::{IdProperties, TokenMetadata, TokenProperties};

#[derive(Clone)]
pub struct ApiState {
    pub cache: Arc<EarningCache>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/token/{network}/{coin}/{id}", get(handlers::token_metadata))
        .with_state(state)
}

/// Serves until `cancel` fires.
pub async fn serve(addr: SocketAddr, state: ApiState, cancel: CancellationToken) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "metadata api listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    Ok(())
}
