use thiserror::Error;

pub type Result<T = ()> = std::result::Result<T, PeriodError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeriodError {
    #[error("timestamp {0} is not aligned to the start of a UTC day")]
    NotDayAligned(i64),
    #[error("timestamp {0} is negative")]
    NegativeTimestamp(i64),
    #[error("invalid range: start {start} must be before end {end}")]
    InvalidRange { start: i64, end: i64 },
    #[error("range {start}..{end} yields no {granularity} periods")]
    EmptyRange {
        start: i64,
        end: i64,
        granularity: &'static str,
    },
    #[error("token id half does not fit a unix timestamp: {0}")]
    TimestampOverflow(u128),
    #[error("invalid token id: {0}")]
    InvalidTokenId(String),
    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("unknown granularity '{0}'")]
    UnknownGranularity(String),
}
