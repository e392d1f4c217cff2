use std::fmt;

use serde::Serialize;

use crate::{
    Granularity, PeriodError, Result, TokenId, codec,
    day::{self, ensure_day_aligned},
};

/// A `[start_ts, end_ts)` range backing one mining token.
///
/// Periods built with [`Period::new`] are always canonical: day aligned and
/// exactly one granularity long. Periods recovered from a token id with
/// [`Period::decode`] only guarantee `0 <= start_ts < end_ts`; their
/// [`Period::granularity`] is `None` when the length is not one of the
/// canonical durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    start_ts: i64,
    end_ts: i64,
}

impl Period {
    pub fn new(start_ts: i64, granularity: Granularity) -> Result<Self> {
        ensure_day_aligned(start_ts)?;
        let end_ts = start_ts
            .checked_add(granularity.duration())
            .ok_or(PeriodError::InvalidRange {
                start: start_ts,
                end: i64::MAX,
            })?;
        Ok(Period { start_ts, end_ts })
    }

    pub fn from_bounds(start_ts: i64, end_ts: i64) -> Result<Self> {
        if start_ts < 0 {
            return Err(PeriodError::NegativeTimestamp(start_ts));
        }
        if start_ts >= end_ts {
            return Err(PeriodError::InvalidRange {
                start: start_ts,
                end: end_ts,
            });
        }
        Ok(Period { start_ts, end_ts })
    }

    pub fn decode(id: TokenId) -> Result<Self> {
        codec::decode(id)
    }

    pub fn token_id(&self) -> TokenId {
        codec::encode(self)
    }

    pub fn start_ts(&self) -> i64 {
        self.start_ts
    }

    pub fn end_ts(&self) -> i64 {
        self.end_ts
    }

    pub fn duration(&self) -> i64 {
        self.end_ts - self.start_ts
    }

    pub fn granularity(&self) -> Option<Granularity> {
        Granularity::from_duration(self.duration())
    }

    /// `daily`, `weekly`, `biweekly` or `custom`.
    pub fn kind(&self) -> &'static str {
        self.granularity().map_or("custom", Granularity::as_str)
    }

}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ~ {} ({})",
            day::format_day(self.start_ts),
            day::format_day(self.end_ts),
            self.kind()
        )
    }
}
