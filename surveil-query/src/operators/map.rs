//! Row-wise combinators.

use async_trait::async_trait;
use std::fmt;
use std::marker::PhantomData;
use tracing::{debug, instrument};

use super::{EvaluationContext, Operator};
use crate::dataset::Dataset;
use crate::error::QueryResult;

/// Applies a function to every row of the child dataset.
pub struct MapOperator<O, F, T> {
    child: O,
    f: F,
    _output: PhantomData<fn() -> T>,
}

impl<O, F, T> MapOperator<O, F, T> {
    pub fn new(child: O, f: F) -> Self {
        Self {
            child,
            f,
            _output: PhantomData,
        }
    }
}

impl<O: fmt::Debug, F, T> fmt::Debug for MapOperator<O, F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapOperator")
            .field("child", &self.child)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<O, F, T> Operator for MapOperator<O, F, T>
where
    O: Operator,
    F: Fn(O::Row) -> T + Send + Sync,
    T: Send + Sync + fmt::Debug + 'static,
{
    type Row = T;

    async fn evaluate(&self, ctx: &EvaluationContext) -> QueryResult<Dataset<T>> {
        let rows = self.child.evaluate(ctx).await?;
        Ok(rows.into_iter().map(&self.f).collect())
    }

    fn name(&self) -> &str {
        "map"
    }
}

/// Applies a fallible function to every row; the first error wins.
pub struct TryMapOperator<O, F, T> {
    child: O,
    f: F,
    _output: PhantomData<fn() -> T>,
}

impl<O, F, T> TryMapOperator<O, F, T> {
    pub fn new(child: O, f: F) -> Self {
        Self {
            child,
            f,
            _output: PhantomData,
        }
    }
}

impl<O: fmt::Debug, F, T> fmt::Debug for TryMapOperator<O, F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TryMapOperator")
            .field("child", &self.child)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<O, F, T> Operator for TryMapOperator<O, F, T>
where
    O: Operator,
    F: Fn(O::Row) -> QueryResult<T> + Send + Sync,
    T: Send + Sync + fmt::Debug + 'static,
{
    type Row = T;

    #[instrument(skip_all, fields(child = self.child.name()))]
    async fn evaluate(&self, ctx: &EvaluationContext) -> QueryResult<Dataset<T>> {
        let rows = self.child.evaluate(ctx).await?;
        let mapped = rows
            .into_iter()
            .map(&self.f)
            .collect::<QueryResult<Vec<T>>>()?;
        debug!(rows = mapped.len(), "mapped rows");
        Ok(Dataset::new(mapped))
    }

    fn name(&self) -> &str {
        "try_map"
    }
}

/// Stable sort of the child dataset by an extracted key.
pub struct SortOperator<O, F, K> {
    child: O,
    key: F,
    _key: PhantomData<fn() -> K>,
}

impl<O, F, K> SortOperator<O, F, K> {
    pub fn new(child: O, key: F) -> Self {
        Self {
            child,
            key,
            _key: PhantomData,
        }
    }
}

impl<O: fmt::Debug, F, K> fmt::Debug for SortOperator<O, F, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SortOperator")
            .field("child", &self.child)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<O, F, K> Operator for SortOperator<O, F, K>
where
    O: Operator,
    F: Fn(&O::Row) -> K + Send + Sync,
    K: Ord,
{
    type Row = O::Row;

    async fn evaluate(&self, ctx: &EvaluationContext) -> QueryResult<Dataset<O::Row>> {
        let mut rows = self.child.evaluate(ctx).await?.into_rows();
        rows.sort_by_key(|row| (self.key)(row));
        Ok(Dataset::new(rows))
    }

    fn name(&self) -> &str {
        "sort"
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{offline_context, FailingOperator, StaticOperator};
    use super::super::{Operator, OperatorExt};
    use crate::error::QueryError;
    use crate::temporal::{Temporal, TemporalKind};

    #[tokio::test]
    async fn test_map_transforms_rows() {
        let plan = StaticOperator::new(vec![1u64, 2, 3]).map(|n| n * 10);
        let rows = plan.evaluate(&offline_context()).await.unwrap();
        assert_eq!(rows.into_rows(), vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_try_map_propagates_format_errors() {
        let plan = StaticOperator::new(vec!["2023-01-01", "01/02/2023"])
            .try_map(|raw| Temporal::parse(TemporalKind::Day, raw));

        let err = plan.evaluate(&offline_context()).await.unwrap_err();
        assert!(matches!(err, QueryError::InvalidTemporalFormat { .. }));
    }

    #[tokio::test]
    async fn test_child_errors_pass_through_unchanged() {
        let plan = FailingOperator::<u64>::new("boom").map(|n| n + 1);
        let err = plan.evaluate(&offline_context()).await.unwrap_err();
        assert_eq!(err.to_string(), QueryError::invalid_request("boom").to_string());
    }

    #[tokio::test]
    async fn test_sort_is_stable() {
        let plan = StaticOperator::new(vec![(2, 'a'), (1, 'b'), (2, 'c'), (1, 'd')])
            .sorted_by_key(|row| row.0);
        let rows = plan.evaluate(&offline_context()).await.unwrap();
        assert_eq!(rows.into_rows(), vec![(1, 'b'), (1, 'd'), (2, 'a'), (2, 'c')]);
    }
}
