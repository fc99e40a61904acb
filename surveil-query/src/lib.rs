//! # surveil-query - query and aggregation engine for genomic surveillance
//!
//! surveil-query turns filters over a remote aggregation endpoint into
//! chart-ready series: counts over time, prevalence of a variant among all
//! sequences with confidence intervals, and category or mutation grids over
//! time buckets.
//!
//! ## Overview
//!
//! Queries are trees of [`operators`]. Leaf operators send exactly one
//! request to the endpoint; combinators map, bucket, smooth and divide the
//! datasets of their children in memory. Evaluating a tree needs only an
//! [`EvaluationContext`](operators::EvaluationContext), which carries the
//! HTTP client and a cancellation token reaching every leaf.
//!
//! Time is modelled by [`Temporal`](temporal::Temporal) values (day, ISO week,
//! month, year) with canonical string forms, so that sparse server responses
//! can be bucketed and gap-filled into dense series.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use surveil_query::prelude::*;
//! use surveil_query::queries::counts_over_time;
//!
//! # async fn example() -> QueryResult<()> {
//! let cache = Arc::new(TemporalCache::new());
//! let plan = counts_over_time(
//!     QueryFilter::new().with("country", "Germany"),
//!     "date",
//!     Granularity::Month,
//!     cache,
//! );
//!
//! let ctx = EvaluationContext::new("https://lapis.example.org/open")?;
//! for row in plan.evaluate(&ctx).await?.iter() {
//!     match row.date {
//!         Some(month) => println!("{month}: {}", row.count),
//!         None => println!("unknown date: {}", row.count),
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! Every failure is a [`QueryError`](error::QueryError). Remote rejections
//! carry the endpoint's problem detail, malformed dates fail fast instead of
//! being coerced, and cancellation is its own variant so that superseded
//! queries can be ignored rather than reported.
//!
//! ## Logging
//!
//! The crate emits `tracing` spans for every operator evaluation and events
//! for every request. See [`logging`] for a ready-made subscriber setup.

/// Declares a lazily compiled regex from a hard-coded pattern.
macro_rules! static_regex {
    ($name:ident, $pattern:expr) => {
        static $name: once_cell::sync::Lazy<regex::Regex> = once_cell::sync::Lazy::new(|| {
            #[allow(clippy::expect_used)]
            regex::Regex::new($pattern).expect("Hard-coded regex pattern should be valid")
        });
    };
}

pub mod client;
pub mod config;
pub mod dataset;
pub mod error;
pub mod filter;
pub mod granularity;
pub mod logging;
pub mod map2d;
pub mod mutation;
pub mod operators;
pub mod prelude;
pub mod queries;
pub mod statistics;
pub mod temporal;
