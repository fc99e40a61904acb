//! Leaf operators for grouped counts and raw record details.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use super::{EvaluationContext, Operator};
use crate::dataset::Dataset;
use crate::error::QueryResult;
use crate::filter::{FieldValue, FieldsRequest, OrderBy, Paging, QueryFilter};

/// Successful response body of the row-returning endpoints.
#[derive(Debug, Deserialize)]
pub(crate) struct DataEnvelope<T> {
    pub(crate) data: T,
}

/// One group of the `aggregated` endpoint: the grouping fields and how many
/// records fall into the group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedRow {
    pub count: u64,
    #[serde(flatten)]
    pub fields: BTreeMap<String, FieldValue>,
}

impl AggregatedRow {
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// The field as a string, or `None` if it is missing, null or not text.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(FieldValue::as_str)
    }
}

/// One record of the `details` endpoint.
pub type DetailsRow = BTreeMap<String, FieldValue>;

/// Fetches grouped counts: `POST <base>/aggregated`.
///
/// Without grouping fields the result is a single row with the total count.
#[derive(Debug, Clone)]
pub struct FetchAggregatedOperator {
    filter: QueryFilter,
    fields: Vec<String>,
    paging: Paging,
}

impl FetchAggregatedOperator {
    pub fn new(filter: QueryFilter) -> Self {
        Self {
            filter,
            fields: Vec::new(),
            paging: Paging::default(),
        }
    }

    /// Groups the counts by the given fields.
    pub fn group_by<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.paging.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.paging.offset = Some(offset);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.paging.order_by.push(order);
        self
    }

    pub fn filter(&self) -> &QueryFilter {
        &self.filter
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }
}

#[async_trait]
impl Operator for FetchAggregatedOperator {
    type Row = AggregatedRow;

    #[instrument(skip_all, fields(endpoint = "aggregated", fields = ?self.fields))]
    async fn evaluate(&self, ctx: &EvaluationContext) -> QueryResult<Dataset<AggregatedRow>> {
        self.filter.validate()?;
        let body = FieldsRequest {
            filter: &self.filter,
            fields: &self.fields,
            paging: &self.paging,
        };

        let response: DataEnvelope<Vec<AggregatedRow>> = ctx.post("aggregated", &body).await?;
        debug!(rows = response.data.len(), "fetched aggregated counts");
        Ok(Dataset::new(response.data))
    }

    fn name(&self) -> &str {
        "fetch_aggregated"
    }
}

/// Fetches individual records: `POST <base>/details`.
///
/// An empty field list asks the endpoint for every field.
#[derive(Debug, Clone)]
pub struct FetchDetailsOperator {
    filter: QueryFilter,
    fields: Vec<String>,
    paging: Paging,
}

impl FetchDetailsOperator {
    pub fn new(filter: QueryFilter) -> Self {
        Self {
            filter,
            fields: Vec::new(),
            paging: Paging::default(),
        }
    }

    pub fn select<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.paging.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.paging.offset = Some(offset);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.paging.order_by.push(order);
        self
    }
}

#[async_trait]
impl Operator for FetchDetailsOperator {
    type Row = DetailsRow;

    #[instrument(skip_all, fields(endpoint = "details", fields = ?self.fields))]
    async fn evaluate(&self, ctx: &EvaluationContext) -> QueryResult<Dataset<DetailsRow>> {
        self.filter.validate()?;
        let body = FieldsRequest {
            filter: &self.filter,
            fields: &self.fields,
            paging: &self.paging,
        };

        let response: DataEnvelope<Vec<DetailsRow>> = ctx.post("details", &body).await?;
        debug!(rows = response.data.len(), "fetched details");
        Ok(Dataset::new(response.data))
    }

    fn name(&self) -> &str {
        "fetch_details"
    }
}
