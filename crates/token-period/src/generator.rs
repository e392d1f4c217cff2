//! Boundary-aligned period generation.

use crate::{
    Granularity, Period, PeriodError, Result,
    day::{DAY_SECONDS, ensure_day_aligned},
};

/// Every full `granularity` period inside `[start_ts, end_ts)`.
///
/// Weekly and biweekly buckets start on a multiple of their own duration
/// counted from the unix epoch, so `start_ts` is moved forward to the next
/// such boundary first. A trailing bucket that would run past `end_ts` is
/// dropped. An empty result is reported as [`PeriodError::EmptyRange`].
pub fn generate(start_ts: i64, end_ts: i64, granularity: Granularity) -> Result<Vec<Period>> {
    ensure_day_aligned(start_ts)?;
    ensure_day_aligned(end_ts)?;
    if end_ts <= start_ts {
        return Err(PeriodError::InvalidRange {
            start: start_ts,
            end: end_ts,
        });
    }

    let duration = granularity.duration();
    let aligned = match granularity {
        Granularity::Daily => Some(start_ts),
        Granularity::Weekly | Granularity::Biweekly => align_up(start_ts, duration),
    };
    let Some(mut cursor) = aligned else {
        return Err(PeriodError::InvalidRange {
            start: start_ts,
            end: end_ts,
        });
    };

    let mut periods = Vec::new();
    while let Some(next) = cursor.checked_add(duration) {
        if next > end_ts {
            break;
        }
        periods.push(Period::new(cursor, granularity)?);
        cursor = next;
    }

    if periods.is_empty() {
        return Err(PeriodError::EmptyRange {
            start: start_ts,
            end: end_ts,
            granularity: granularity.as_str(),
        });
    }

    Ok(periods)
}

/// Candidate `granularity` buckets containing the day that ends at
/// `day_end_ts`, newest start first.
///
/// Every candidate start is returned, aligned or not. Candidates that would
/// start before the unix epoch are skipped.
pub fn periods_covering(day_end_ts: i64, granularity: Granularity) -> Result<Vec<Period>> {
    ensure_day_aligned(day_end_ts)?;
    (1..=granularity.days())
        .filter_map(|i| day_end_ts.checked_sub(i * DAY_SECONDS))
        .filter(|start| *start >= 0)
        .map(|start| Period::new(start, granularity))
        .collect()
}

/// Next multiple of `step` at or after `ts`, if it fits an `i64`.
fn align_up(ts: i64, step: i64) -> Option<i64> {
    match ts.rem_euclid(step) {
        0 => Some(ts),
        rem => ts.checked_add(step - rem),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::day::parse_day;

    #[test]
    fn test_daily_keeps_literal_start() {
        let start = parse_day("2022-02-05").unwrap();
        let end = parse_day("2022-02-08").unwrap();
        let periods = generate(start, end, Granularity::Daily).unwrap();
        assert_eq!(periods.len(), 3);
        assert_eq!(periods[0].start_ts(), start);
        assert_eq!(periods[2].end_ts(), end);
    }

    #[test]
    fn test_weekly_advances_to_epoch_boundary() {
        // 2022-02-05 is a Saturday; weekly epoch boundaries fall on Thursdays.
        let start = parse_day("2022-02-05").unwrap();
        let end = parse_day("2022-03-05").unwrap();
        let periods = generate(start, end, Granularity::Weekly).unwrap();
        assert_eq!(periods[0].start_ts(), parse_day("2022-02-10").unwrap());
        assert_eq!(periods[0].start_ts() % Granularity::Weekly.duration(), 0);
        assert_eq!(periods.len(), 3);
    }

    #[test]
    fn test_align_up() {
        assert_eq!(align_up(0, 7), Some(0));
        assert_eq!(align_up(1, 7), Some(7));
        assert_eq!(align_up(14, 7), Some(14));
        assert_eq!(align_up(i64::MAX - 1, 7), None);
    }

    #[test]
    fn test_range_at_the_end_of_time() {
        let start = i64::MAX - i64::MAX % DAY_SECONDS - DAY_SECONDS;
        let end = start + DAY_SECONDS;
        assert_eq!(
            generate(start, end, Granularity::Weekly),
            Err(PeriodError::InvalidRange { start, end })
        );
        assert_eq!(
            generate(start, end, Granularity::Biweekly),
            Err(PeriodError::InvalidRange { start, end })
        );
        assert_eq!(generate(start, end, Granularity::Daily).unwrap().len(), 1);
    }

    #[test]
    fn test_rejects_bad_input() {
        let day = parse_day("2022-02-05").unwrap();
        assert_eq!(
            generate(day + 1, day + DAY_SECONDS, Granularity::Daily),
            Err(PeriodError::NotDayAligned(day + 1))
        );
        assert!(matches!(
            generate(day, day, Granularity::Daily),
            Err(PeriodError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_empty_range_is_an_error() {
        let start = parse_day("2022-02-05").unwrap();
        let end = parse_day("2022-02-09").unwrap();
        assert!(matches!(
            generate(start, end, Granularity::Weekly),
            Err(PeriodError::EmptyRange { .. })
        ));
    }

    #[test]
    fn test_periods_covering() {
        let day_end = parse_day("2022-02-10").unwrap();
        let daily = periods_covering(day_end, Granularity::Daily).unwrap();
        assert_eq!(daily.len(), 1);
        assert_eq!(daily[0].end_ts(), day_end);

        let weekly = periods_covering(day_end, Granularity::Weekly).unwrap();
        assert_eq!(weekly.len(), 7);
        assert!(weekly.iter().all(|p| p.start_ts() < day_end && day_end <= p.end_ts()));

        let biweekly = periods_covering(day_end, Granularity::Biweekly).unwrap();
        assert_eq!(biweekly.len(), 14);
        assert!(biweekly.iter().all(|p| p.start_ts() < day_end && day_end <= p.end_ts()));
    }

    #[test]
    fn test_periods_covering_near_epoch() {
        let weekly = periods_covering(3 * DAY_SECONDS, Granularity::Weekly).unwrap();
        assert_eq!(weekly.len(), 3);
    }
}
