use std::{
    fmt,
    future::Future,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use alloy_primitives::U256;
use backon::{ExponentialBuilder, Retryable};
use mining_token_period::PeriodError;
use reqwest::StatusCode;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::warn;

pub type Result<T = ()> = std::result::Result<T, Error>;

/// Attempts made for a transient failure before giving up, first call included.
pub const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("empty range: {0}")]
    EmptyRange(String),
    #[error("timestamp {finalizing} is already finalized (ledger is at {finalized})")]
    AlreadyFinalized { finalizing: i64, finalized: i64 },
    #[error("timestamp {finalizing} has not elapsed yet (now {now})")]
    FutureTimestamp { finalizing: i64, now: i64 },
    #[error("consistency error: {0}")]
    Consistency(String),
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: U256, available: U256 },
    #[error("{service} failure: {kind}")]
    ExternalService { service: Service, kind: ExternalKind },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The collaborator an [`Error::ExternalService`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Ledger,
    Pool,
    Custody,
    Cache,
    Notifier,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Service::Ledger => "ledger",
            Service::Pool => "pool",
            Service::Custody => "custody",
            Service::Cache => "cache",
            Service::Notifier => "notifier",
        })
    }
}

#[derive(Debug, Error)]
pub enum ExternalKind {
    #[error("http: {0}")]
    Http(#[source] reqwest::Error),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    /// Node unreachable or answering with a non-success HTTP status.
    #[error("transport ({status:?}): {message}")]
    Transport { status: Option<u16>, message: String },
    #[error("redis: {0}")]
    Redis(#[source] redis::RedisError),
    #[error("pool error {code}: {message}")]
    Pool { code: i64, message: String },
    #[error("custody: {0}")]
    Custody(String),
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("cancelled")]
    Cancelled,
}

/// JSON-RPC "limit exceeded", returned by rate limited node providers.
const RPC_LIMIT_EXCEEDED: i64 = -32005;

impl ExternalKind {
    pub fn is_transient(&self) -> bool {
        match self {
            ExternalKind::Http(err) => {
                if err.is_timeout() || err.is_connect() {
                    return true;
                }
                retryable_status(err.status())
            }
            ExternalKind::Rpc { code, .. } => *code == RPC_LIMIT_EXCEEDED,
            ExternalKind::Transport { status, .. } => match status {
                Some(code) => retryable_status(StatusCode::from_u16(*code).ok()),
                None => true,
            },
            ExternalKind::Redis(err) => {
                err.is_io_error() || err.is_timeout() || err.is_connection_dropped()
            }
            ExternalKind::Timeout(_) => true,
            ExternalKind::Pool { .. } | ExternalKind::Custody(_) | ExternalKind::Cancelled => {
                false
            }
        }
    }
}

impl Error {
    pub fn external(service: Service, kind: ExternalKind) -> Self {
        Error::ExternalService { service, kind }
    }

    pub fn cancelled(service: Service) -> Self {
        Error::external(service, ExternalKind::Cancelled)
    }

    pub fn http(service: Service, err: reqwest::Error) -> Self {
        Error::external(service, ExternalKind::Http(err))
    }

    pub fn redis(err: redis::RedisError) -> Self {
        Error::external(Service::Cache, ExternalKind::Redis(err))
    }

    pub fn is_transient(&self) -> bool {
        match self {
            Error::ExternalService { kind, .. } => kind.is_transient(),
            _ => false,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Error::ExternalService {
                kind: ExternalKind::Cancelled,
                ..
            }
        )
    }
}

impl From<PeriodError> for Error {
    fn from(err: PeriodError) -> Self {
        match err {
            PeriodError::EmptyRange { .. } => Error::EmptyRange(err.to_string()),
            other => Error::Validation(other.to_string()),
        }
    }
}

fn retryable_status(status: Option<StatusCode>) -> bool {
    match status {
        Some(code) => code.is_server_error() || code == StatusCode::TOO_MANY_REQUESTS,
        None => false,
    }
}

/// Runs `operation`, retrying transient failures with jittered exponential
/// backoff. Cancelling `cancel` abandons the call, including any pending
/// backoff sleep.
pub async fn with_retry<F, Fut, T>(
    operation: F,
    label: &'static str,
    service: Service,
    cancel: &CancellationToken,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut op = operation;
    let attempts = AtomicUsize::new(0);
    let backoff = ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(500))
        .with_max_delay(Duration::from_secs(10))
        .with_max_times(MAX_ATTEMPTS - 1)
        .with_jitter();

    let retried = (move || op())
        .retry(backoff)
        .when(Error::is_transient)
        .notify(|err: &Error, delay: Duration| {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                attempt,
                retry_in = ?delay,
                error = %err,
                operation = label,
                "transient {service} failure"
            );
        });

    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::cancelled(service)),
        result = retried => result,
    }
}

/// Runs `fut` once, abandoning it when `cancel` fires. Used for mutating calls
/// that must not be replayed.
pub async fn cancellable<Fut, T>(
    fut: Fut,
    service: Service,
    cancel: &CancellationToken,
) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::cancelled(service)),
        result = fut => result,
    }
}
