//! Property-based tests for calendar values and the numeric kernels built on
//! them.
//!
//! ## Overview
//!
//! The aggregation plans rely on a handful of invariants that example-based
//! tests only spot-check. These properties are exercised here over generated
//! dates and counts:
//!
//! ### 1. Temporal values
//! - Display and parse are inverse for every kind
//! - Coarsening a day yields the bucket whose day span contains it
//! - Ranges are complete: `difference + 1` strictly increasing values
//!
//! ### 2. Bucketing and smoothing
//! - Bucketing preserves the total count and leaves no gaps
//! - A moving average has `n - window + 1` values and keeps constant series
//!
//! ### 3. Proportions
//! - Wilson intervals lie in `[0, 1]` and contain the observed proportion
//! - Joined ratios are never NaN or infinite; a zero denominator gives none
//!
//! ## Writing New Property Tests
//!
//! Generate values through the strategies below rather than raw integers so
//! that every case stays inside the supported calendar range.

use chrono::NaiveDate;
use proptest::prelude::*;
use std::collections::BTreeSet;
use surveil_query::granularity::{bucket_counts, sliding_average, DatedCount, Granularity};
use surveil_query::operators::{join_counts, MissingKeyPolicy};
use surveil_query::statistics::{wilson_interval, ConfidenceIntervalMethod};
use surveil_query::temporal::{generate_all_in_range, Temporal, TemporalKind};

// ============================================================================
// Strategies
// ============================================================================

fn any_day() -> impl Strategy<Value = Temporal> {
    (1900i32..2100, 1u32..=365).prop_map(|(year, ordinal)| {
        Temporal::from_date(NaiveDate::from_yo_opt(year, ordinal).unwrap()).unwrap()
    })
}

fn any_kind() -> impl Strategy<Value = TemporalKind> {
    prop_oneof![
        Just(TemporalKind::Day),
        Just(TemporalKind::Week),
        Just(TemporalKind::Month),
        Just(TemporalKind::Year),
    ]
}

fn any_granularity() -> impl Strategy<Value = Granularity> {
    prop_oneof![
        Just(Granularity::Day),
        Just(Granularity::Week),
        Just(Granularity::Month),
        Just(Granularity::Year),
    ]
}

/// Daily counts within a few months, including unknown dates.
fn dated_counts() -> impl Strategy<Value = Vec<DatedCount>> {
    prop::collection::vec((prop::option::weighted(0.9, 0i64..120), 0u64..1000), 0..40).prop_map(
        |rows| {
            let start = Temporal::day(2023, 11, 1).unwrap();
            rows.into_iter()
                .map(|(offset, count)| {
                    let date = offset.map(|offset| start.add_units(offset).unwrap());
                    DatedCount::new(date, count)
                })
                .collect()
        },
    )
}

// ============================================================================
// Temporal values
// ============================================================================

proptest! {
    #[test]
    fn prop_display_parse_round_trip(day in any_day(), kind in any_kind()) {
        let value = day.to_kind(kind).unwrap();
        let parsed: Temporal = value.to_string().parse().unwrap();
        prop_assert_eq!(parsed, value);
        prop_assert_eq!(parsed.kind(), kind);
    }

    #[test]
    fn prop_coarsening_contains_day(day in any_day(), kind in any_kind()) {
        let bucket = day.to_kind(kind).unwrap();
        prop_assert!(bucket.first_day() <= day.first_day());
        prop_assert!(day.last_day() <= bucket.last_day());
    }

    #[test]
    fn prop_range_is_complete(day in any_day(), kind in any_kind(), span in 0i64..400) {
        let min = day.to_kind(kind).unwrap();
        let max = min.add_units(span).unwrap();

        let range = generate_all_in_range(min, max).unwrap();
        prop_assert_eq!(range.len() as i64, max.difference(&min).unwrap() + 1);
        prop_assert_eq!(range.first(), Some(&min));
        prop_assert_eq!(range.last(), Some(&max));
        for pair in range.windows(2) {
            prop_assert!(pair[0] < pair[1]);
            prop_assert_eq!(pair[0].successor().unwrap(), pair[1]);
        }

        // Reversed bounds give nothing.
        if span > 0 {
            prop_assert!(generate_all_in_range(max, min).unwrap().is_empty());
        }
    }

    #[test]
    fn prop_add_units_inverts_difference(day in any_day(), kind in any_kind(), n in -500i64..500) {
        let value = day.to_kind(kind).unwrap();
        let shifted = value.add_units(n).unwrap();
        prop_assert_eq!(shifted.difference(&value).unwrap(), n);
    }
}

// ============================================================================
// Bucketing and smoothing
// ============================================================================

proptest! {
    #[test]
    fn prop_bucketing_preserves_total(rows in dated_counts(), granularity in any_granularity()) {
        let total: u64 = rows.iter().map(|row| row.count).sum();
        let bucketed = bucket_counts(rows.clone(), granularity).unwrap();
        prop_assert_eq!(bucketed.iter().map(|row| row.count).sum::<u64>(), total);

        let dates: Vec<Temporal> = bucketed.iter().filter_map(|row| row.date).collect();
        for pair in dates.windows(2) {
            prop_assert_eq!(pair[0].successor().unwrap(), pair[1]);
        }
        prop_assert!(dates.iter().all(|date| date.kind() == granularity.kind()));

        let unknown = bucketed.iter().filter(|row| row.date.is_none()).count();
        prop_assert_eq!(unknown, usize::from(rows.iter().any(|row| row.date.is_none())));
    }

    #[test]
    fn prop_sliding_average_length(
        values in prop::collection::vec(0.0f64..1000.0, 0..60),
        half in 0usize..5,
    ) {
        let window = 2 * half + 1;
        let averages = sliding_average(&values, window).unwrap();
        prop_assert_eq!(averages.len(), (values.len() + 1).saturating_sub(window));
    }

    #[test]
    fn prop_sliding_average_keeps_constant_series(value in 0u32..1000, len in 1usize..40, half in 0usize..5) {
        let values = vec![f64::from(value); len];
        for average in sliding_average(&values, 2 * half + 1).unwrap() {
            prop_assert!((average - f64::from(value)).abs() < 1e-9);
        }
    }
}

// ============================================================================
// Proportions
// ============================================================================

proptest! {
    #[test]
    fn prop_wilson_contains_proportion(sample in 1u32..100_000, fraction in 0.0f64..=1.0) {
        let sample = f64::from(sample);
        let observed = (sample * fraction).floor();
        let ci = wilson_interval(observed, sample).unwrap();

        prop_assert!(0.0 <= ci.lower);
        prop_assert!(ci.upper <= 1.0);
        prop_assert!(ci.contains(observed / sample));
    }

    #[test]
    fn prop_join_never_divides_by_zero(
        numerator in dated_counts(),
        denominator in dated_counts(),
        treat_as_zero in any::<bool>(),
    ) {
        let policy = if treat_as_zero {
            MissingKeyPolicy::TreatAsZero
        } else {
            MissingKeyPolicy::Omit
        };
        let rows = join_counts(
            numerator.clone(),
            denominator.clone(),
            policy,
            ConfidenceIntervalMethod::Wilson,
        );

        for row in &rows {
            match row.ratio {
                Some(ratio) => {
                    prop_assert!(row.denominator_count > 0.0);
                    prop_assert!(ratio.is_finite());
                }
                None => prop_assert_eq!(row.denominator_count, 0.0),
            }
            if row.numerator_count > row.denominator_count {
                prop_assert!(row.confidence_interval.is_none());
            }
        }

        let keys: Vec<Option<Temporal>> = rows.iter().map(|row| row.key).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        prop_assert_eq!(&keys, &sorted);

        let numerator_keys: BTreeSet<_> = numerator.iter().map(|row| row.date).collect();
        let denominator_keys: BTreeSet<_> = denominator.iter().map(|row| row.date).collect();
        let expected: BTreeSet<_> = match policy {
            MissingKeyPolicy::TreatAsZero => numerator_keys.union(&denominator_keys).copied().collect(),
            MissingKeyPolicy::Omit => numerator_keys.intersection(&denominator_keys).copied().collect(),
        };
        prop_assert_eq!(keys.into_iter().collect::<BTreeSet<_>>(), expected);
    }
}
