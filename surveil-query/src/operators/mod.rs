//! Composable query operators.
//!
//! An [`Operator`] evaluates to a [`Dataset`]. Leaf operators perform exactly
//! one request against the aggregation endpoint; combinators derive a new
//! dataset from the datasets of their children without touching the network.
//! Plans are plain values: build them once, evaluate them as often as needed
//! with a fresh [`EvaluationContext`].
//!
//! ```rust,no_run
//! use surveil_query::prelude::*;
//!
//! # async fn example() -> QueryResult<()> {
//! let plan = FetchAggregatedOperator::new(QueryFilter::new().with("country", "Switzerland"))
//!     .group_by(["lineage"])
//!     .map(|row| row.count);
//!
//! let ctx = EvaluationContext::new("https://lapis.example.org/open")?;
//! let counts = plan.evaluate(&ctx).await?;
//! println!("{} lineages", counts.len());
//! # Ok(())
//! # }
//! ```

mod division;
mod fetch;
mod granularity;
mod map;
mod mutations;

pub use division::{join_counts, DivisionOperator, KeyedCount, MissingKeyPolicy, RatioRow};
pub use fetch::{AggregatedRow, DetailsRow, FetchAggregatedOperator, FetchDetailsOperator};
pub use granularity::{
    GroupByGranularityOperator, SlidingAverageOperator, SmoothedDivisionOperator,
};
pub use map::{MapOperator, SortOperator, TryMapOperator};
pub use mutations::{
    FetchInsertionsOperator, FetchMutationsOverTimeOperator, FetchSubstitutionsOrDeletionsOperator,
    InsertionEntry, MutationCount, MutationsOverTimeData, SubstitutionOrDeletionEntry,
};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::client::AggregationClient;
use crate::config::ClientConfig;
use crate::dataset::Dataset;
use crate::error::QueryResult;

/// A node of a query plan.
///
/// Implementations must be cheap to evaluate repeatedly and must not keep
/// state between evaluations; everything an evaluation needs comes from the
/// [`EvaluationContext`].
#[async_trait]
pub trait Operator: Send + Sync + Debug {
    /// The row type of the produced dataset.
    type Row: Send + Sync + Debug + 'static;

    /// Evaluates the operator and all of its children.
    ///
    /// The first error anywhere in the subtree is returned unchanged.
    async fn evaluate(&self, ctx: &EvaluationContext) -> QueryResult<Dataset<Self::Row>>;

    /// Short name used in tracing spans.
    fn name(&self) -> &str;
}

#[async_trait]
impl<O> Operator for Arc<O>
where
    O: Operator + ?Sized,
{
    type Row = O::Row;

    async fn evaluate(&self, ctx: &EvaluationContext) -> QueryResult<Dataset<Self::Row>> {
        (**self).evaluate(ctx).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// A type-erased operator producing rows of type `R`.
pub type BoxedOperator<R> = Arc<dyn Operator<Row = R>>;

/// Per-evaluation inputs: where to send requests and when to stop.
///
/// One cancellation token reaches every leaf of the plan. Cancelling it
/// aborts in-flight requests and makes the evaluation fail with
/// [`QueryError::Cancelled`](crate::error::QueryError::Cancelled).
#[derive(Debug, Clone)]
pub struct EvaluationContext {
    client: AggregationClient,
    cancellation: CancellationToken,
}

impl EvaluationContext {
    /// Creates a context for the endpoint at `base_url` with default settings.
    pub fn new(base_url: &str) -> QueryResult<Self> {
        Self::with_config(ClientConfig::new(base_url)?)
    }

    pub fn with_config(config: ClientConfig) -> QueryResult<Self> {
        Ok(Self::from_client(AggregationClient::new(config)?))
    }

    /// Reuses an existing client and its connection pool.
    pub fn from_client(client: AggregationClient) -> Self {
        Self {
            client,
            cancellation: CancellationToken::new(),
        }
    }

    /// Replaces the cancellation token.
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn client(&self) -> &AggregationClient {
        &self.client
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub(crate) async fn post<B, T>(&self, endpoint: &str, body: &B) -> QueryResult<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        self.client.post_json(endpoint, body, &self.cancellation).await
    }
}

/// Combinator methods available on every operator.
pub trait OperatorExt: Operator + Sized {
    /// Transforms every row.
    fn map<F, T>(self, f: F) -> MapOperator<Self, F, T>
    where
        F: Fn(Self::Row) -> T + Send + Sync,
        T: Send + Sync + Debug + 'static,
    {
        MapOperator::new(self, f)
    }

    /// Transforms every row with a fallible function; the first error fails
    /// the evaluation.
    fn try_map<F, T>(self, f: F) -> TryMapOperator<Self, F, T>
    where
        F: Fn(Self::Row) -> QueryResult<T> + Send + Sync,
        T: Send + Sync + Debug + 'static,
    {
        TryMapOperator::new(self, f)
    }

    /// Stable sort by a key extracted from each row.
    fn sorted_by_key<F, K>(self, key: F) -> SortOperator<Self, F, K>
    where
        F: Fn(&Self::Row) -> K + Send + Sync,
        K: Ord,
    {
        SortOperator::new(self, key)
    }

    fn boxed(self) -> BoxedOperator<Self::Row>
    where
        Self: 'static,
    {
        Arc::new(self)
    }
}

impl<O: Operator> OperatorExt for O {}
