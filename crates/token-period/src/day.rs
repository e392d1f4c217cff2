//! UTC day arithmetic on unix timestamps.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::{PeriodError, Result};

pub const DAY_SECONDS: i64 = 86_400;

pub fn is_day_aligned(ts: i64) -> bool {
    ts.rem_euclid(DAY_SECONDS) == 0
}

pub fn ensure_day_aligned(ts: i64) -> Result {
    if ts < 0 {
        return Err(PeriodError::NegativeTimestamp(ts));
    }
    if !is_day_aligned(ts) {
        return Err(PeriodError::NotDayAligned(ts));
    }
    Ok(())
}

/// Parse `YYYY-MM-DD` into the timestamp of that day's UTC midnight.
pub fn parse_day(s: &str) -> Result<i64> {
    let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|_| PeriodError::InvalidDate(s.to_string()))?;
    Ok(date.and_time(NaiveTime::MIN).and_utc().timestamp())
}

/// Format a timestamp as `YYYY-MM-DD` (UTC).
pub fn format_day(ts: i64) -> String {
    match DateTime::<Utc>::from_timestamp(ts, 0) {
        Some(dt) => dt.format("%Y-%m-%d").to_string(),
        None => ts.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_format() {
        let ts = parse_day("2022-02-03").unwrap();
        assert_eq!(ts, 1_643_846_400);
        assert_eq!(format_day(ts), "2022-02-03");
        assert!(parse_day("2022/02/03").is_err());
    }

    #[test]
    fn test_alignment() {
        assert!(is_day_aligned(1_643_846_400));
        assert!(!is_day_aligned(1_643_846_401));
        assert_eq!(
            ensure_day_aligned(-DAY_SECONDS),
            Err(PeriodError::NegativeTimestamp(-DAY_SECONDS))
        );
    }
}
