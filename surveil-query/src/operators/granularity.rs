//! Time-series combinators over dated counts.

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::division::{join_counts, MissingKeyPolicy, RatioRow};
use super::{EvaluationContext, Operator};
use crate::dataset::Dataset;
use crate::error::{QueryError, QueryResult};
use crate::granularity::{
    bucket_counts, fill_range, smooth_counts, DatedCount, Granularity, SmoothedCount,
};
use crate::statistics::ConfidenceIntervalMethod;
use crate::temporal::{min_max, Temporal};

fn check_window(window: usize) -> QueryResult<()> {
    if window == 0 || window % 2 == 0 {
        return Err(QueryError::invalid_config(format!(
            "smoothing window must be a positive odd number, got {window}"
        )));
    }
    Ok(())
}

/// Buckets the child's dated counts and fills gaps between the first and
/// last bucket with zeros.
#[derive(Debug, Clone)]
pub struct GroupByGranularityOperator<O> {
    child: O,
    granularity: Granularity,
}

impl<O> GroupByGranularityOperator<O> {
    pub fn new(child: O, granularity: Granularity) -> Self {
        Self { child, granularity }
    }
}

#[async_trait]
impl<O> Operator for GroupByGranularityOperator<O>
where
    O: Operator<Row = DatedCount>,
{
    type Row = DatedCount;

    #[instrument(skip_all, fields(granularity = %self.granularity))]
    async fn evaluate(&self, ctx: &EvaluationContext) -> QueryResult<Dataset<DatedCount>> {
        let rows = self.child.evaluate(ctx).await?;
        let bucketed = bucket_counts(rows, self.granularity)?;
        debug!(buckets = bucketed.len(), "bucketed counts");
        Ok(Dataset::new(bucketed))
    }

    fn name(&self) -> &str {
        "group_by_granularity"
    }
}

/// Centered moving average over the child's dense series.
///
/// The child is expected to be gap-free, as produced by
/// [`GroupByGranularityOperator`]; the unknown-date row is dropped.
#[derive(Debug, Clone)]
pub struct SlidingAverageOperator<O> {
    child: O,
    window: usize,
}

impl<O> SlidingAverageOperator<O> {
    pub fn new(child: O, window: usize) -> Self {
        Self { child, window }
    }
}

#[async_trait]
impl<O> Operator for SlidingAverageOperator<O>
where
    O: Operator<Row = DatedCount>,
{
    type Row = SmoothedCount;

    #[instrument(skip_all, fields(window = self.window))]
    async fn evaluate(&self, ctx: &EvaluationContext) -> QueryResult<Dataset<SmoothedCount>> {
        // Reject a bad window before any request goes out.
        check_window(self.window)?;
        let rows = self.child.evaluate(ctx).await?;
        Ok(Dataset::new(smooth_counts(rows.rows(), self.window)?))
    }

    fn name(&self) -> &str {
        "sliding_average"
    }
}

/// Smooths two bucketed series over their common range and divides them.
///
/// Both children are gap-filled across the union of their date ranges before
/// averaging, so buckets where only one side has records are averaged with
/// zeros on the other side. Children are evaluated concurrently and the
/// first error wins.
#[derive(Debug)]
pub struct SmoothedDivisionOperator<N, D> {
    numerator: N,
    denominator: D,
    window: usize,
    policy: MissingKeyPolicy,
    method: ConfidenceIntervalMethod,
}

impl<N, D> SmoothedDivisionOperator<N, D> {
    pub fn new(numerator: N, denominator: D, window: usize, policy: MissingKeyPolicy) -> Self {
        Self {
            numerator,
            denominator,
            window,
            policy,
            method: ConfidenceIntervalMethod::None,
        }
    }

    pub fn with_confidence_interval(mut self, method: ConfidenceIntervalMethod) -> Self {
        self.method = method;
        self
    }
}

#[async_trait]
impl<N, D> Operator for SmoothedDivisionOperator<N, D>
where
    N: Operator<Row = DatedCount>,
    D: Operator<Row = DatedCount>,
{
    type Row = RatioRow<Option<Temporal>>;

    #[instrument(skip_all, fields(window = self.window, policy = ?self.policy))]
    async fn evaluate(&self, ctx: &EvaluationContext) -> QueryResult<Dataset<Self::Row>> {
        check_window(self.window)?;
        let (numerator, denominator) = tokio::try_join!(
            self.numerator.evaluate(ctx),
            self.denominator.evaluate(ctx)
        )?;

        let bounds = min_max(numerator.iter().chain(denominator.iter()).map(|row| &row.date));
        let (numerator, denominator) = match bounds {
            Some((min, max)) => (
                fill_range(numerator.rows(), min, max)?,
                fill_range(denominator.rows(), min, max)?,
            ),
            None => (numerator.into_rows(), denominator.into_rows()),
        };

        let rows = join_counts(
            smooth_counts(&numerator, self.window)?,
            smooth_counts(&denominator, self.window)?,
            self.policy,
            self.method,
        );
        debug!(rows = rows.len(), "divided smoothed series");
        Ok(Dataset::new(rows))
    }

    fn name(&self) -> &str {
        "smoothed_division"
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{offline_context, FailingOperator, StaticOperator};
    use super::*;
    use crate::temporal::Temporal;

    fn day(value: &str) -> Option<Temporal> {
        Some(value.parse().unwrap())
    }

    #[tokio::test]
    async fn test_group_then_smooth() {
        let raw = StaticOperator::new(vec![
            DatedCount::new(day("2023-01-01"), 3),
            DatedCount::new(day("2023-01-03"), 3),
            DatedCount::new(day("2023-01-05"), 6),
            DatedCount::new(day("2023-01-06"), 0),
        ]);
        let plan = SlidingAverageOperator::new(
            GroupByGranularityOperator::new(raw, Granularity::Day),
            3,
        );

        let rows = plan.evaluate(&offline_context()).await.unwrap();
        let values: Vec<f64> = rows.iter().map(|row| row.count).collect();
        assert_eq!(values, vec![2.0, 1.0, 3.0, 2.0]);
        assert_eq!(rows.first().unwrap().date.to_string(), "2023-01-02");
    }

    #[tokio::test]
    async fn test_even_window_is_rejected() {
        let plan = SlidingAverageOperator::new(FailingOperator::<DatedCount>::new("not reached"), 4);
        let err = plan.evaluate(&offline_context()).await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidConfiguration(_)));
    }

    #[tokio::test]
    async fn test_sparse_numerator_is_smoothed_over_shared_range() {
        let numerator = StaticOperator::new(vec![DatedCount::new(day("2023-01-03"), 3)]);
        let denominator = StaticOperator::new(
            ["2023-01-01", "2023-01-02", "2023-01-03", "2023-01-04", "2023-01-05"]
                .into_iter()
                .map(|date| DatedCount::new(day(date), 10))
                .collect(),
        );
        let plan =
            SmoothedDivisionOperator::new(numerator, denominator, 3, MissingKeyPolicy::TreatAsZero);

        let rows = plan.evaluate(&offline_context()).await.unwrap();
        let keys: Vec<String> = rows
            .iter()
            .map(|row| row.key.unwrap().to_string())
            .collect();
        assert_eq!(keys, ["2023-01-02", "2023-01-03", "2023-01-04"]);
        for row in rows.iter() {
            assert!((row.ratio.unwrap() - 0.1).abs() < 1e-12);
            assert!((row.numerator_count - 1.0).abs() < 1e-12);
        }
    }

    #[tokio::test]
    async fn test_smoothed_division_rejects_even_window() {
        let plan = SmoothedDivisionOperator::new(
            FailingOperator::<DatedCount>::new("not reached"),
            FailingOperator::<DatedCount>::new("not reached"),
            2,
            MissingKeyPolicy::Omit,
        );
        let err = plan.evaluate(&offline_context()).await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidConfiguration(_)));
    }
}
