//! Prelude for commonly used types and traits in surveil-query.

pub use crate::dataset::Dataset;
pub use crate::error::{QueryError, QueryResult};
pub use crate::filter::{FilterValue, OrderBy, QueryFilter};
pub use crate::granularity::{DatedCount, Granularity, SmoothedCount};
pub use crate::logging::LogConfig;
pub use crate::map2d::Map2D;
pub use crate::mutation::{MutationCell, SequenceType};
pub use crate::operators::{
    BoxedOperator, DivisionOperator, EvaluationContext, FetchAggregatedOperator, MissingKeyPolicy,
    Operator, OperatorExt, RatioRow,
};
pub use crate::statistics::{ConfidenceInterval, ConfidenceIntervalMethod};
pub use crate::temporal::{Temporal, TemporalCache, TemporalKind};
