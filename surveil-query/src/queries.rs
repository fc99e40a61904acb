//! Prebuilt query plans for common surveillance questions.
//!
//! These assemble the operators of [`crate::operators`] into the plans a
//! dashboard typically needs: counts over time, prevalence of a variant
//! among all sequences, counts per category and a mutations-over-time grid.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use surveil_query::prelude::*;
//! use surveil_query::queries::{prevalence_over_time, PrevalenceOptions};
//!
//! # async fn example() -> QueryResult<()> {
//! let cache = Arc::new(TemporalCache::new());
//! let country = QueryFilter::new().with("country", "Switzerland");
//!
//! let plan = prevalence_over_time(
//!     country.clone().with("nextcladePangoLineage", "JN.1*"),
//!     country,
//!     PrevalenceOptions::new(Granularity::Week).with_smoothing(3),
//!     cache,
//! )?;
//!
//! let ctx = EvaluationContext::new("https://lapis.example.org/open")?;
//! for row in plan.evaluate(&ctx).await?.iter() {
//!     println!("{:?}: {:?}", row.key, row.ratio);
//! }
//! # Ok(())
//! # }
//! ```

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::dataset::Dataset;
use crate::error::{QueryError, QueryResult};
use crate::filter::{FieldValue, QueryFilter};
use crate::granularity::{bucket_counts, date_range_for, DatedCount, Granularity};
use crate::map2d::Map2D;
use crate::mutation::{MutationCell, SequenceType};
use crate::operators::{
    AggregatedRow, BoxedOperator, DivisionOperator, EvaluationContext, FetchAggregatedOperator,
    FetchMutationsOverTimeOperator, GroupByGranularityOperator, MissingKeyPolicy, Operator,
    OperatorExt, RatioRow, SmoothedDivisionOperator,
};
use crate::statistics::ConfidenceIntervalMethod;
use crate::temporal::{generate_all_in_range, Temporal, TemporalCache, TemporalKind};

/// Date field used when none is configured.
pub const DEFAULT_DATE_FIELD: &str = "date";

/// Reads a daily date field of an aggregated row.
///
/// A missing or null field is an unknown date. Any other non-text value, or
/// text that is not a canonical day, is an error.
pub fn parse_row_date(
    row: &AggregatedRow,
    date_field: &str,
    cache: &TemporalCache,
) -> QueryResult<Option<Temporal>> {
    match row.field(date_field) {
        None | Some(FieldValue::Null) => Ok(None),
        Some(FieldValue::Text(raw)) => cache.parse(TemporalKind::Day, raw).map(Some),
        Some(other) => Err(QueryError::invalid_temporal(
            TemporalKind::Day,
            other.to_string(),
            format!("field '{date_field}' is not a date string"),
        )),
    }
}

/// Daily counts matching `filter`, bucketed to `granularity` and gap-filled.
pub fn counts_over_time(
    filter: QueryFilter,
    date_field: &str,
    granularity: Granularity,
    cache: Arc<TemporalCache>,
) -> BoxedOperator<DatedCount> {
    let field = date_field.to_string();
    let daily = FetchAggregatedOperator::new(filter)
        .group_by([date_field])
        .try_map(move |row| Ok(DatedCount::new(parse_row_date(&row, &field, &cache)?, row.count)));

    GroupByGranularityOperator::new(daily, granularity).boxed()
}

/// Settings of a prevalence-over-time plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrevalenceOptions {
    pub granularity: Granularity,
    pub date_field: String,
    /// Odd window of the centered moving average; `None` disables smoothing.
    pub smoothing_window: Option<usize>,
    pub confidence_interval: ConfidenceIntervalMethod,
    pub missing_key_policy: MissingKeyPolicy,
    pub date_from: Option<Temporal>,
    pub date_to: Option<Temporal>,
}

impl PrevalenceOptions {
    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            date_field: DEFAULT_DATE_FIELD.to_string(),
            smoothing_window: None,
            confidence_interval: ConfidenceIntervalMethod::Wilson,
            missing_key_policy: MissingKeyPolicy::TreatAsZero,
            date_from: None,
            date_to: None,
        }
    }

    pub fn with_date_field(mut self, date_field: impl Into<String>) -> Self {
        self.date_field = date_field.into();
        self
    }

    pub fn with_smoothing(mut self, window: usize) -> Self {
        self.smoothing_window = Some(window);
        self
    }

    pub fn with_confidence_interval(mut self, method: ConfidenceIntervalMethod) -> Self {
        self.confidence_interval = method;
        self
    }

    pub fn with_missing_key_policy(mut self, policy: MissingKeyPolicy) -> Self {
        self.missing_key_policy = policy;
        self
    }

    /// Restricts both counts to the buckets containing `from` through `to`.
    pub fn with_date_range(mut self, from: Option<Temporal>, to: Option<Temporal>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    fn restrict(&self, filter: QueryFilter) -> QueryResult<QueryFilter> {
        let (from, to) = date_range_for(self.granularity, self.date_from, self.date_to)?;
        Ok(filter.with_date_range(&self.date_field, from, to))
    }
}

impl Default for PrevalenceOptions {
    fn default() -> Self {
        Self::new(Granularity::Day)
    }
}

/// Share of `numerator` records among `denominator` records per bucket.
///
/// Both sides are bucketed and gap-filled; with smoothing enabled both are
/// filled over their common date range and averaged before dividing. Fails
/// if the configured date range cannot be coarsened to the granularity.
pub fn prevalence_over_time(
    numerator: QueryFilter,
    denominator: QueryFilter,
    options: PrevalenceOptions,
    cache: Arc<TemporalCache>,
) -> QueryResult<BoxedOperator<RatioRow<Option<Temporal>>>> {
    let numerator = options.restrict(numerator)?;
    let denominator = options.restrict(denominator)?;

    let counts = |filter| {
        counts_over_time(
            filter,
            &options.date_field,
            options.granularity,
            Arc::clone(&cache),
        )
    };
    let numerator = counts(numerator);
    let denominator = counts(denominator);

    Ok(match options.smoothing_window {
        Some(window) => SmoothedDivisionOperator::new(
            numerator,
            denominator,
            window,
            options.missing_key_policy,
        )
        .with_confidence_interval(options.confidence_interval)
        .boxed(),
        None => DivisionOperator::new(numerator, denominator, options.missing_key_policy)
            .with_confidence_interval(options.confidence_interval)
            .boxed(),
    })
}

/// Prevalence of one named variant.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantPrevalence {
    pub name: String,
    pub rows: Dataset<RatioRow<Option<Temporal>>>,
}

/// Prevalence of several variants against a shared denominator.
///
/// All plans are evaluated concurrently and fail together: the first error
/// cancels the remaining requests. Each variant fetches the denominator on
/// its own, since identical requests are not shared.
#[instrument(skip_all, fields(variants = variants.len()))]
pub async fn prevalence_over_time_for_variants(
    ctx: &EvaluationContext,
    variants: Vec<(String, QueryFilter)>,
    denominator: QueryFilter,
    options: PrevalenceOptions,
    cache: Arc<TemporalCache>,
) -> QueryResult<Vec<VariantPrevalence>> {
    let plans = variants
        .into_iter()
        .map(|(name, numerator)| {
            let plan = prevalence_over_time(
                numerator,
                denominator.clone(),
                options.clone(),
                Arc::clone(&cache),
            )?;
            Ok((name, plan))
        })
        .collect::<QueryResult<Vec<_>>>()?;

    let results = try_join_all(plans.iter().map(|(_, plan)| plan.evaluate(ctx))).await?;

    Ok(plans
        .into_iter()
        .zip(results)
        .map(|((name, _), rows)| VariantPrevalence { name, rows })
        .collect())
}

/// Counts per value of `category_field` and per bucket.
///
/// Rows are categories in the order the endpoint first reports them, columns
/// every bucket between the earliest and latest date of any category. A
/// category without records in a bucket gets `0`. Records with an unknown
/// date are not part of the grid; a null category becomes the row `"null"`.
#[instrument(skip_all, fields(category = category_field, granularity = %granularity))]
pub async fn counts_by_category_over_time(
    ctx: &EvaluationContext,
    filter: QueryFilter,
    category_field: &str,
    date_field: &str,
    granularity: Granularity,
    cache: &TemporalCache,
) -> QueryResult<Map2D<String, Temporal, u64>> {
    let rows = FetchAggregatedOperator::new(filter)
        .group_by([category_field, date_field])
        .evaluate(ctx)
        .await?;

    let mut categories: Vec<String> = Vec::new();
    let mut by_category: HashMap<String, Vec<DatedCount>> = HashMap::new();
    let mut all_dates = Vec::with_capacity(rows.len());
    for row in rows.iter() {
        let category = row
            .field(category_field)
            .map_or_else(|| "null".to_string(), ToString::to_string);
        let date = parse_row_date(row, date_field, cache)?;
        let count = DatedCount::new(date, row.count);

        all_dates.push(DatedCount::new(date, 0));
        by_category
            .entry(category.clone())
            .or_insert_with(|| {
                categories.push(category);
                Vec::new()
            })
            .push(count);
    }

    let mut grid = Map2D::new();
    for bucket in bucket_counts(all_dates, granularity)?
        .into_iter()
        .filter_map(|row| row.date)
    {
        grid.add_column_key(bucket);
    }
    for category in categories {
        let counts = by_category.remove(&category).unwrap_or_default();
        let bucketed: HashMap<Temporal, u64> = bucket_counts(counts, granularity)?
            .into_iter()
            .filter_map(|row| row.date.map(|date| (date, row.count)))
            .collect();

        grid.add_row_key(category.clone());
        for bucket in grid.second_axis_keys().to_vec() {
            let count = bucketed.get(&bucket).copied().unwrap_or(0);
            grid.set(category.clone(), bucket, count);
        }
    }

    debug!(
        rows = grid.first_axis_keys().len(),
        columns = grid.second_axis_keys().len(),
        "built category grid"
    );
    Ok(grid)
}

/// Settings of a mutations-over-time grid.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationsOverTimeOptions {
    pub granularity: Granularity,
    pub date_field: String,
    pub from: Temporal,
    pub to: Temporal,
    /// Cells covered by fewer sequences are reported as below threshold.
    pub min_coverage: u64,
}

impl MutationsOverTimeOptions {
    pub fn new(granularity: Granularity, from: Temporal, to: Temporal) -> Self {
        Self {
            granularity,
            date_field: DEFAULT_DATE_FIELD.to_string(),
            from,
            to,
            min_coverage: 1,
        }
    }

    pub fn with_date_field(mut self, date_field: impl Into<String>) -> Self {
        self.date_field = date_field.into();
        self
    }

    pub fn with_min_coverage(mut self, min_coverage: u64) -> Self {
        self.min_coverage = min_coverage;
        self
    }

    /// Every bucket from `from` through `to` at the configured granularity.
    pub fn buckets(&self) -> QueryResult<Vec<Temporal>> {
        let kind = self.granularity.kind();
        generate_all_in_range(self.from.to_kind(kind)?, self.to.to_kind(kind)?)
    }
}

/// Proportions of selected mutations per bucket as a mutation × bucket grid.
///
/// Rows follow the order of `mutations`, columns are chronological.
#[instrument(skip_all, fields(sequence_type = ?sequence_type, mutations = mutations.len()))]
pub async fn mutations_over_time_grid(
    ctx: &EvaluationContext,
    sequence_type: SequenceType,
    filter: QueryFilter,
    mutations: Vec<String>,
    options: &MutationsOverTimeOptions,
) -> QueryResult<Map2D<String, Temporal, Option<MutationCell>>> {
    let plan = FetchMutationsOverTimeOperator::new(
        sequence_type,
        filter,
        options.date_field.clone(),
        options.buckets()?,
    )
    .include_mutations(mutations);

    let data = plan
        .evaluate(ctx)
        .await?
        .into_rows()
        .into_iter()
        .next()
        .ok_or_else(|| {
            QueryError::invalid_response(
                sequence_type.mutations_over_time_endpoint(),
                "no data returned",
            )
        })?;

    data.into_grid(options.min_coverage)
}
