//! Bucketing dated counts into calendar units, filling gaps and smoothing.
//!
//! Aggregation responses only contain dates that had at least one record.
//! [`bucket_counts`] turns such a sparse daily series into a dense series at
//! the requested [`Granularity`]:
//!
//! 1. every date is coarsened to its containing bucket,
//! 2. counts landing in the same bucket are summed,
//! 3. every bucket between the smallest and largest one is emitted, with `0`
//!    where no row mapped to it,
//! 4. rows without a usable date are summed into one leading row whose date
//!    is `None`.
//!
//! [`sliding_average`] then optionally smooths the dense part with a centered
//! moving average.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{QueryError, QueryResult};
use crate::operators::KeyedCount;
use crate::temporal::{generate_all_in_range, min_max, Temporal, TemporalKind};

/// Calendar unit of a bucketed series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    #[default]
    Day,
    Week,
    Month,
    Year,
}

impl Granularity {
    /// The temporal kind bucket keys take at this granularity.
    pub fn kind(&self) -> TemporalKind {
        match self {
            Granularity::Day => TemporalKind::Day,
            Granularity::Week => TemporalKind::Week,
            Granularity::Month => TemporalKind::Month,
            Granularity::Year => TemporalKind::Year,
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.kind(), f)
    }
}

impl FromStr for Granularity {
    type Err = QueryError;

    fn from_str(s: &str) -> QueryResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "day" => Ok(Granularity::Day),
            "week" => Ok(Granularity::Week),
            "month" => Ok(Granularity::Month),
            "year" => Ok(Granularity::Year),
            other => Err(QueryError::invalid_config(format!(
                "unknown granularity '{other}', expected day, week, month or year"
            ))),
        }
    }
}

/// A count attached to a possibly unknown date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatedCount {
    pub date: Option<Temporal>,
    pub count: u64,
}

impl DatedCount {
    pub fn new(date: Option<Temporal>, count: u64) -> Self {
        Self { date, count }
    }
}

impl KeyedCount for DatedCount {
    type Key = Option<Temporal>;

    fn key(&self) -> Self::Key {
        self.date
    }

    fn count(&self) -> f64 {
        self.count as f64
    }
}

/// A moving-average value; only dates with a full window are present.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothedCount {
    pub date: Temporal,
    pub count: f64,
}

impl KeyedCount for SmoothedCount {
    type Key = Option<Temporal>;

    fn key(&self) -> Self::Key {
        Some(self.date)
    }

    fn count(&self) -> f64 {
        self.count
    }
}

/// Buckets, sums and gap-fills dated counts.
///
/// The output is the optional unknown-date row followed by one row per bucket
/// from the earliest to the latest, in chronological order. Dates coarser
/// than `granularity` cannot be refined and fail with
/// [`QueryError::TemporalKindMismatch`].
pub fn bucket_counts<I>(rows: I, granularity: Granularity) -> QueryResult<Vec<DatedCount>>
where
    I: IntoIterator<Item = DatedCount>,
{
    let kind = granularity.kind();
    let mut buckets: BTreeMap<Temporal, u64> = BTreeMap::new();
    let mut unknown: Option<u64> = None;

    for row in rows {
        match row.date {
            Some(date) => *buckets.entry(date.to_kind(kind)?).or_insert(0) += row.count,
            None => *unknown.get_or_insert(0) += row.count,
        }
    }

    let mut output = Vec::with_capacity(buckets.len() + 1);
    if let Some(count) = unknown {
        output.push(DatedCount::new(None, count));
    }

    let bounds = buckets
        .keys()
        .next()
        .copied()
        .zip(buckets.keys().next_back().copied());
    if let Some((min, max)) = bounds {
        for bucket in generate_all_in_range(min, max)? {
            let count = buckets.get(&bucket).copied().unwrap_or(0);
            output.push(DatedCount::new(Some(bucket), count));
        }
    }

    Ok(output)
}

/// Extends a bucketed series with zero rows so that it covers `min..=max`.
///
/// Buckets outside the range are kept, so the result spans the union of the
/// series' own range and `min..=max`. The unknown-date row stays first. All
/// dates must share the kind of `min` and `max`.
pub fn fill_range(rows: &[DatedCount], min: Temporal, max: Temporal) -> QueryResult<Vec<DatedCount>> {
    let mut counts: BTreeMap<Temporal, u64> = BTreeMap::new();
    let mut unknown: Option<u64> = None;
    for row in rows {
        match row.date {
            Some(date) => *counts.entry(date).or_insert(0) += row.count,
            None => *unknown.get_or_insert(0) += row.count,
        }
    }

    let (first, last) = match min_max(rows.iter().map(|row| &row.date)) {
        Some((first, last)) => (first.min(min), last.max(max)),
        None => (min, max),
    };

    let mut output = Vec::new();
    if let Some(count) = unknown {
        output.push(DatedCount::new(None, count));
    }
    for bucket in generate_all_in_range(first, last)? {
        let count = counts.get(&bucket).copied().unwrap_or(0);
        output.push(DatedCount::new(Some(bucket), count));
    }
    Ok(output)
}

/// Centered moving average over an odd `window`.
///
/// Only positions with a full window are emitted, so the result has
/// `values.len() - window + 1` elements, or none if the series is shorter
/// than the window. A zero or even window is a configuration error.
pub fn sliding_average(values: &[f64], window: usize) -> QueryResult<Vec<f64>> {
    if window == 0 || window % 2 == 0 {
        return Err(QueryError::invalid_config(format!(
            "smoothing window must be a positive odd number, got {window}"
        )));
    }
    if values.len() < window {
        return Ok(Vec::new());
    }

    let mut sum: f64 = values[..window].iter().sum();
    let mut averages = Vec::with_capacity(values.len() - window + 1);
    averages.push(sum / window as f64);
    for end in window..values.len() {
        sum += values[end] - values[end - window];
        averages.push(sum / window as f64);
    }
    Ok(averages)
}

/// Smooths the dated part of a bucketed series.
///
/// The unknown-date row does not belong to the series and is dropped. Each
/// average is attached to the date at the center of its window.
pub fn smooth_counts(rows: &[DatedCount], window: usize) -> QueryResult<Vec<SmoothedCount>> {
    let (dates, values): (Vec<Temporal>, Vec<f64>) = rows
        .iter()
        .filter_map(|row| row.date.map(|date| (date, row.count as f64)))
        .unzip();

    let averages = sliding_average(&values, window)?;
    let offset = window / 2;

    Ok(averages
        .into_iter()
        .zip(dates.into_iter().skip(offset))
        .map(|(count, date)| SmoothedCount { date, count })
        .collect())
}

/// Widens a date range so that it covers whole buckets.
///
/// Bounds are coarsened to `granularity`; a filter built from the result with
/// [`QueryFilter::with_date_range`](crate::filter::QueryFilter::with_date_range)
/// then starts on the first day of the first bucket and ends on the last day
/// of the last one.
pub fn date_range_for(
    granularity: Granularity,
    from: Option<Temporal>,
    to: Option<Temporal>,
) -> QueryResult<(Option<Temporal>, Option<Temporal>)> {
    let kind = granularity.kind();
    Ok((
        from.map(|from| from.to_kind(kind)).transpose()?,
        to.map(|to| to.to_kind(kind)).transpose()?,
    ))
}
