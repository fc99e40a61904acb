//! Keyed division of two count datasets.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use tracing::{debug, instrument};

use super::{EvaluationContext, Operator};
use crate::dataset::Dataset;
use crate::error::QueryResult;
use crate::statistics::{ConfidenceInterval, ConfidenceIntervalMethod};

/// A row that contributes a count under a join key.
pub trait KeyedCount: Send + Sync + Debug + 'static {
    type Key: Ord + Clone + Send + Sync + Debug + 'static;

    fn key(&self) -> Self::Key;

    fn count(&self) -> f64;
}

/// What to do with a key that only one side of a division reports.
///
/// The two call sites that divide counts disagree on this, so it is always
/// chosen explicitly:
///
/// - [`Omit`](MissingKeyPolicy::Omit) keeps only keys present on both sides.
/// - [`TreatAsZero`](MissingKeyPolicy::TreatAsZero) keeps every key and
///   counts the missing side as `0`; a zero denominator gives no ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MissingKeyPolicy {
    Omit,
    TreatAsZero,
}

/// One joined key with its counts and derived proportion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatioRow<K> {
    pub key: K,
    pub numerator_count: f64,
    pub denominator_count: f64,
    /// `None` when the denominator is zero.
    pub ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_interval: Option<ConfidenceInterval>,
}

/// Joins numerator and denominator rows by key and divides their counts.
///
/// Rows sharing a key on the same side are summed first. The result is
/// sorted by key.
pub fn join_counts<N, D>(
    numerator: impl IntoIterator<Item = N>,
    denominator: impl IntoIterator<Item = D>,
    policy: MissingKeyPolicy,
    method: ConfidenceIntervalMethod,
) -> Vec<RatioRow<N::Key>>
where
    N: KeyedCount,
    D: KeyedCount<Key = N::Key>,
{
    let numerators = sum_by_key(numerator);
    let mut denominators = sum_by_key(denominator);

    let mut joined: BTreeMap<N::Key, (f64, f64)> = BTreeMap::new();
    for (key, numerator_count) in numerators {
        match (denominators.remove(&key), policy) {
            (Some(denominator_count), _) => {
                joined.insert(key, (numerator_count, denominator_count));
            }
            (None, MissingKeyPolicy::TreatAsZero) => {
                joined.insert(key, (numerator_count, 0.0));
            }
            (None, MissingKeyPolicy::Omit) => {}
        }
    }
    if policy == MissingKeyPolicy::TreatAsZero {
        for (key, denominator_count) in denominators {
            joined.insert(key, (0.0, denominator_count));
        }
    }

    joined
        .into_iter()
        .map(|(key, (numerator_count, denominator_count))| {
            ratio_row(key, numerator_count, denominator_count, method)
        })
        .collect()
}

fn sum_by_key<R: KeyedCount>(rows: impl IntoIterator<Item = R>) -> BTreeMap<R::Key, f64> {
    let mut sums = BTreeMap::new();
    for row in rows {
        *sums.entry(row.key()).or_insert(0.0) += row.count();
    }
    sums
}

fn ratio_row<K>(
    key: K,
    numerator_count: f64,
    denominator_count: f64,
    method: ConfidenceIntervalMethod,
) -> RatioRow<K> {
    let defined = denominator_count > 0.0;
    let ratio = defined.then(|| numerator_count / denominator_count);
    let confidence_interval = if defined && (0.0..=denominator_count).contains(&numerator_count) {
        method.interval(numerator_count, denominator_count)
    } else {
        None
    };

    RatioRow {
        key,
        numerator_count,
        denominator_count,
        ratio,
        confidence_interval,
    }
}

/// Divides the counts of one operator by those of another.
///
/// Both children are evaluated concurrently. If either fails, the other is
/// dropped, which aborts its in-flight request, and the error is returned.
#[derive(Debug)]
pub struct DivisionOperator<N, D> {
    numerator: N,
    denominator: D,
    policy: MissingKeyPolicy,
    method: ConfidenceIntervalMethod,
}

impl<N, D> DivisionOperator<N, D> {
    pub fn new(numerator: N, denominator: D, policy: MissingKeyPolicy) -> Self {
        Self {
            numerator,
            denominator,
            policy,
            method: ConfidenceIntervalMethod::None,
        }
    }

    /// Attaches a confidence interval to every defined ratio.
    pub fn with_confidence_interval(mut self, method: ConfidenceIntervalMethod) -> Self {
        self.method = method;
        self
    }

    pub fn policy(&self) -> MissingKeyPolicy {
        self.policy
    }
}

#[async_trait]
impl<N, D> Operator for DivisionOperator<N, D>
where
    N: Operator,
    N::Row: KeyedCount,
    D: Operator,
    D::Row: KeyedCount<Key = <N::Row as KeyedCount>::Key>,
{
    type Row = RatioRow<<N::Row as KeyedCount>::Key>;

    #[instrument(skip_all, fields(
        numerator = self.numerator.name(),
        denominator = self.denominator.name(),
        policy = ?self.policy
    ))]
    async fn evaluate(&self, ctx: &EvaluationContext) -> QueryResult<Dataset<Self::Row>> {
        let (numerator, denominator) = tokio::try_join!(
            self.numerator.evaluate(ctx),
            self.denominator.evaluate(ctx)
        )?;

        let rows = join_counts(numerator, denominator, self.policy, self.method);
        debug!(rows = rows.len(), "joined numerator and denominator");
        Ok(Dataset::new(rows))
    }

    fn name(&self) -> &str {
        "division"
    }
}
