use mining_token_period::{
    Granularity, Period, PeriodError, TokenId,
    day::{DAY_SECONDS, parse_day},
    generator::generate,
};

#[test]
fn test_codec_round_trip_over_sample_ranges() {
    let starts = [0u128, 1, 86_400, 1_643_846_400, u128::from(u64::MAX), u128::MAX - 2];
    for start in starts {
        for delta in [1u128, 86_400, 604_800, 1_209_600] {
            let Some(end) = start.checked_add(delta) else {
                continue;
            };
            let id = TokenId::from_parts(start, end);
            assert_eq!(id.parts(), (start, end));
        }
    }
}

#[test]
fn test_weekly_generation_for_one_year() {
    let start = parse_day("2022-02-03").unwrap();
    let end = parse_day("2023-02-03").unwrap();
    let periods = generate(start, end, Granularity::Weekly).unwrap();

    assert_eq!(periods.len(), 52);
    assert!(periods[0].start_ts() >= start);
    assert_eq!(periods[0].start_ts() % Granularity::Weekly.duration(), 0);
    assert!(
        periods[0].start_ts() - start < Granularity::Weekly.duration(),
        "first bucket must be the nearest boundary at or after the start"
    );

    for period in &periods {
        assert_eq!(period.end_ts() - period.start_ts(), 604_800);
    }
    for pair in periods.windows(2) {
        assert_eq!(pair[0].end_ts(), pair[1].start_ts());
    }
    assert!(periods.last().unwrap().end_ts() <= end);
}

#[test]
fn test_no_trailing_partial_period() {
    let start = parse_day("2022-01-01").unwrap();
    for extra_days in 0..30 {
        let end = parse_day("2022-03-01").unwrap() + extra_days * DAY_SECONDS;
        for granularity in Granularity::ALL {
            if let Ok(periods) = generate(start, end, granularity) {
                assert!(periods.iter().all(|p| p.end_ts() <= end));
            }
        }
    }
}

#[test]
fn test_generated_periods_decode_to_themselves() {
    let start = parse_day("2022-02-03").unwrap();
    let end = parse_day("2022-04-03").unwrap();
    for granularity in Granularity::ALL {
        for period in generate(start, end, granularity).unwrap() {
            let decoded = Period::decode(period.token_id()).unwrap();
            assert_eq!(decoded, period);
            assert_eq!(decoded.granularity(), Some(granularity));
        }
    }
}

#[test]
fn test_decode_tolerates_custom_lengths() {
    let id = TokenId::from_parts(1_643_846_400, 1_643_846_400 + 3 * 86_400);
    let period = Period::decode(id).unwrap();
    assert_eq!(period.kind(), "custom");
    assert_eq!(period.token_id(), id);
}

#[test]
fn test_decode_rejects_reversed_range() {
    let id = TokenId::from_parts(1_643_932_800, 1_643_846_400);
    assert!(matches!(
        Period::decode(id),
        Err(PeriodError::InvalidRange { .. })
    ));
}
