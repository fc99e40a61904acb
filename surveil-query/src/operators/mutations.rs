//! Leaf operators for mutation, insertion and mutations-over-time endpoints.

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::fetch::DataEnvelope;
use super::{EvaluationContext, Operator};
use crate::dataset::Dataset;
use crate::error::{QueryError, QueryResult};
use crate::filter::QueryFilter;
use crate::map2d::Map2D;
use crate::mutation::{Insertion, Mutation, MutationCell, SequenceType};
use crate::temporal::Temporal;

const DEFAULT_MIN_PROPORTION: f64 = 0.05;
const DEFAULT_MUTATION_BATCH_SIZE: usize = 100;

/// A substitution or deletion with how often it occurs.
#[derive(Debug, Clone, PartialEq)]
pub struct SubstitutionOrDeletionEntry {
    pub mutation: Mutation,
    pub count: u64,
    pub proportion: f64,
}

#[derive(Debug, Deserialize)]
struct MutationRow {
    mutation: String,
    count: u64,
    proportion: f64,
}

/// An insertion with how often it occurs.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertionEntry {
    pub insertion: Insertion,
    pub count: u64,
}

#[derive(Debug, Deserialize)]
struct InsertionRow {
    insertion: String,
    count: u64,
}

#[derive(Debug, Serialize)]
struct MutationsRequest<'a> {
    #[serde(flatten)]
    filter: &'a QueryFilter,
    #[serde(rename = "minProportion")]
    min_proportion: f64,
}

/// Fetches substitutions and deletions above a minimum proportion:
/// `POST <base>/{nucleotide|aminoAcid}Mutations`.
#[derive(Debug, Clone)]
pub struct FetchSubstitutionsOrDeletionsOperator {
    sequence_type: SequenceType,
    filter: QueryFilter,
    min_proportion: f64,
}

impl FetchSubstitutionsOrDeletionsOperator {
    pub fn new(sequence_type: SequenceType, filter: QueryFilter) -> Self {
        Self {
            sequence_type,
            filter,
            min_proportion: DEFAULT_MIN_PROPORTION,
        }
    }

    /// Only mutations carried by at least this fraction of sequences are returned.
    pub fn with_min_proportion(mut self, min_proportion: f64) -> Self {
        self.min_proportion = min_proportion;
        self
    }
}

#[async_trait]
impl Operator for FetchSubstitutionsOrDeletionsOperator {
    type Row = SubstitutionOrDeletionEntry;

    #[instrument(skip_all, fields(endpoint = self.sequence_type.mutations_endpoint()))]
    async fn evaluate(&self, ctx: &EvaluationContext) -> QueryResult<Dataset<Self::Row>> {
        if !(0.0..=1.0).contains(&self.min_proportion) {
            return Err(QueryError::invalid_config(format!(
                "minimum proportion must be within [0, 1], got {}",
                self.min_proportion
            )));
        }
        self.filter.validate()?;

        let body = MutationsRequest {
            filter: &self.filter,
            min_proportion: self.min_proportion,
        };
        let response: DataEnvelope<Vec<MutationRow>> = ctx
            .post(self.sequence_type.mutations_endpoint(), &body)
            .await?;
        debug!(rows = response.data.len(), "fetched mutations");

        response
            .data
            .into_iter()
            .map(|row| -> QueryResult<SubstitutionOrDeletionEntry> {
                Ok(SubstitutionOrDeletionEntry {
                    mutation: row.mutation.parse()?,
                    count: row.count,
                    proportion: row.proportion,
                })
            })
            .collect()
    }

    fn name(&self) -> &str {
        "fetch_substitutions_or_deletions"
    }
}

/// Fetches insertions: `POST <base>/{nucleotide|aminoAcid}Insertions`.
#[derive(Debug, Clone)]
pub struct FetchInsertionsOperator {
    sequence_type: SequenceType,
    filter: QueryFilter,
}

impl FetchInsertionsOperator {
    pub fn new(sequence_type: SequenceType, filter: QueryFilter) -> Self {
        Self {
            sequence_type,
            filter,
        }
    }
}

#[async_trait]
impl Operator for FetchInsertionsOperator {
    type Row = InsertionEntry;

    #[instrument(skip_all, fields(endpoint = self.sequence_type.insertions_endpoint()))]
    async fn evaluate(&self, ctx: &EvaluationContext) -> QueryResult<Dataset<Self::Row>> {
        self.filter.validate()?;

        let response: DataEnvelope<Vec<InsertionRow>> = ctx
            .post(self.sequence_type.insertions_endpoint(), &self.filter)
            .await?;
        debug!(rows = response.data.len(), "fetched insertions");

        response
            .data
            .into_iter()
            .map(|row| -> QueryResult<InsertionEntry> {
                Ok(InsertionEntry {
                    insertion: row.insertion.parse()?,
                    count: row.count,
                })
            })
            .collect()
    }

    fn name(&self) -> &str {
        "fetch_insertions"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DateRangeBody {
    date_from: Option<String>,
    date_to: Option<String>,
}

impl From<&Temporal> for DateRangeBody {
    fn from(bucket: &Temporal) -> Self {
        Self {
            date_from: Some(bucket.first_day().format("%Y-%m-%d").to_string()),
            date_to: Some(bucket.last_day().format("%Y-%m-%d").to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MutationsOverTimeRequest<'a> {
    filters: &'a QueryFilter,
    include_mutations: &'a [String],
    date_ranges: &'a [DateRangeBody],
    date_field: &'a str,
}

/// How many sequences in one bucket carry a mutation, and how many cover its
/// position at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationCount {
    pub count: u64,
    pub coverage: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MutationsOverTimeBody {
    data: Vec<Vec<Option<MutationCount>>>,
    mutations: Vec<String>,
    date_ranges: Vec<DateRangeBody>,
    total_counts_by_date_range: Vec<u64>,
}

/// Per-mutation, per-bucket counts as parallel arrays.
///
/// `data[i][j]` belongs to `mutations[i]` and `date_ranges[j]`; a `None` cell
/// means the endpoint reported nothing for it.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationsOverTimeData {
    pub mutations: Vec<String>,
    pub date_ranges: Vec<Temporal>,
    pub data: Vec<Vec<Option<MutationCount>>>,
    pub total_counts_by_date_range: Vec<u64>,
}

impl MutationsOverTimeData {
    /// Classifies every cell and reshapes the arrays into a grid keyed by
    /// mutation code and bucket.
    ///
    /// A bucket without any sequences, or a cell the endpoint left empty,
    /// becomes `None`. Cells covered by fewer than `min_coverage` sequences
    /// are [`MutationCell::BelowThreshold`].
    pub fn into_grid(
        self,
        min_coverage: u64,
    ) -> QueryResult<Map2D<String, Temporal, Option<MutationCell>>> {
        let totals = self.total_counts_by_date_range;
        let cells: Vec<Vec<Option<MutationCell>>> = self
            .data
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .zip(&totals)
                    .map(|(cell, &total_count)| match cell {
                        Some(cell) if total_count > 0 => Some(MutationCell::classify(
                            cell.count,
                            cell.coverage,
                            total_count,
                            min_coverage,
                        )),
                        _ => None,
                    })
                    .collect()
            })
            .collect();

        Map2D::from_parallel_arrays(self.mutations, self.date_ranges, cells)
    }
}

/// Fetches counts and coverage of selected mutations per time bucket:
/// `POST <base>/component/{nucleotide|aminoAcid}MutationsOverTime`.
///
/// Mutations are requested in batches, sent concurrently, and the batches'
/// rows are concatenated in request order into a single
/// [`MutationsOverTimeData`] row.
#[derive(Debug, Clone)]
pub struct FetchMutationsOverTimeOperator {
    sequence_type: SequenceType,
    filter: QueryFilter,
    mutations: Vec<String>,
    buckets: Vec<Temporal>,
    date_field: String,
    batch_size: usize,
}

impl FetchMutationsOverTimeOperator {
    pub fn new(
        sequence_type: SequenceType,
        filter: QueryFilter,
        date_field: impl Into<String>,
        buckets: Vec<Temporal>,
    ) -> Self {
        Self {
            sequence_type,
            filter,
            mutations: Vec::new(),
            buckets,
            date_field: date_field.into(),
            batch_size: DEFAULT_MUTATION_BATCH_SIZE,
        }
    }

    pub fn include_mutations<I, S>(mut self, mutations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mutations = mutations.into_iter().map(Into::into).collect();
        self
    }

    /// Maximum number of mutations per request.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    fn validate(&self) -> QueryResult<()> {
        if self.batch_size == 0 {
            return Err(QueryError::invalid_config("mutation batch size must be positive"));
        }
        for code in &self.mutations {
            code.parse::<Mutation>()?;
        }
        self.filter.validate()
    }

    async fn fetch_batch(
        &self,
        ctx: &EvaluationContext,
        mutations: &[String],
        date_ranges: &[DateRangeBody],
    ) -> QueryResult<MutationsOverTimeBody> {
        let endpoint = self.sequence_type.mutations_over_time_endpoint();
        let body = MutationsOverTimeRequest {
            filters: &self.filter,
            include_mutations: mutations,
            date_ranges,
            date_field: &self.date_field,
        };
        let response: DataEnvelope<MutationsOverTimeBody> = ctx.post(endpoint, &body).await?;
        let batch = response.data;

        let shape_error = |message: String| QueryError::invalid_response(endpoint, message);
        if batch.mutations.len() != batch.data.len() {
            return Err(shape_error(format!(
                "{} mutations but {} data rows",
                batch.mutations.len(),
                batch.data.len()
            )));
        }
        if batch.date_ranges != date_ranges {
            return Err(shape_error("date ranges differ from the requested ones".to_string()));
        }
        if batch.total_counts_by_date_range.len() != date_ranges.len() {
            return Err(shape_error(format!(
                "{} total counts for {} date ranges",
                batch.total_counts_by_date_range.len(),
                date_ranges.len()
            )));
        }
        if let Some(row) = batch.data.iter().find(|row| row.len() != date_ranges.len()) {
            return Err(shape_error(format!(
                "data row has {} cells for {} date ranges",
                row.len(),
                date_ranges.len()
            )));
        }
        Ok(batch)
    }
}

#[async_trait]
impl Operator for FetchMutationsOverTimeOperator {
    type Row = MutationsOverTimeData;

    #[instrument(skip_all, fields(
        endpoint = self.sequence_type.mutations_over_time_endpoint(),
        mutations = self.mutations.len(),
        buckets = self.buckets.len()
    ))]
    async fn evaluate(&self, ctx: &EvaluationContext) -> QueryResult<Dataset<Self::Row>> {
        self.validate()?;

        let date_ranges: Vec<DateRangeBody> = self.buckets.iter().map(DateRangeBody::from).collect();
        let mut batches: Vec<&[String]> = self.mutations.chunks(self.batch_size).collect();
        if batches.is_empty() {
            batches.push(&[]);
        }

        let responses = try_join_all(
            batches
                .iter()
                .map(|batch| self.fetch_batch(ctx, batch, &date_ranges)),
        )
        .await?;
        debug!(batches = responses.len(), "fetched mutations over time");

        let mut merged = MutationsOverTimeData {
            mutations: Vec::with_capacity(self.mutations.len()),
            date_ranges: self.buckets.clone(),
            data: Vec::with_capacity(self.mutations.len()),
            total_counts_by_date_range: Vec::new(),
        };
        for batch in responses {
            merged.mutations.extend(batch.mutations);
            merged.data.extend(batch.data);
            merged.total_counts_by_date_range = batch.total_counts_by_date_range;
        }

        Ok(Dataset::new(vec![merged]))
    }

    fn name(&self) -> &str {
        "fetch_mutations_over_time"
    }
}
