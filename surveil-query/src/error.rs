//! Error types for the surveil-query engine.
//!
//! Every failure surfaced by an evaluation is a [`QueryError`]. Leaf operators
//! produce remote, network and format errors; combinators pass them through
//! unchanged so callers can tell a superseded (cancelled) query apart from a
//! real failure and render the server's problem detail when there is one.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::temporal::TemporalKind;

/// Problem-detail payload returned by the aggregation endpoint on failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDetail {
    pub title: String,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
}

impl fmt::Display for ProblemDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {}", self.title, detail),
            None => write!(f, "{}", self.title),
        }
    }
}

/// Wire envelope of an error response: `{ "error": { ... } }`.
#[derive(Debug, Deserialize)]
pub(crate) struct ProblemEnvelope {
    pub error: ProblemDetail,
}

/// The main error type for query evaluation.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The aggregation endpoint answered with a non-2xx status.
    #[error("Remote request to '{endpoint}' failed ({status}): {problem}")]
    RemoteRequest {
        /// Path of the endpoint that was called, relative to the base URL
        endpoint: String,
        /// HTTP status code
        status: u16,
        /// Problem detail reported by the server
        problem: ProblemDetail,
    },

    /// A date string did not match the canonical pattern of its kind.
    #[error("Invalid temporal value '{input}': {reason}")]
    InvalidTemporalFormat {
        /// Expected kind, if the caller asked for a specific one
        kind: Option<TemporalKind>,
        input: String,
        reason: String,
    },

    /// Two temporal values of different kinds were combined.
    #[error("Cannot combine temporal values of kind {left} and {right}")]
    TemporalKindMismatch {
        left: TemporalKind,
        right: TemporalKind,
    },

    /// Evaluation was aborted through its cancellation token.
    #[error("Query evaluation was cancelled")]
    Cancelled,

    /// The request never produced an HTTP response.
    #[error("Network error calling '{endpoint}': {message}")]
    Network { endpoint: String, message: String },

    /// A response body could not be decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The request could not be built from the given inputs.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Invalid configuration or parameters.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A mutation or insertion code did not match its expected pattern.
    #[error("Invalid mutation code '{0}'")]
    InvalidMutationCode(String),

    /// Parallel arrays describing a matrix disagree in length.
    #[error("Shape mismatch: {0}")]
    ShapeMismatch(String),

    /// The server answered with data that violates the response contract.
    #[error("Invalid response from '{endpoint}': {message}")]
    InvalidResponse { endpoint: String, message: String },
}

/// A type alias for `Result<T, QueryError>`.
pub type QueryResult<T> = std::result::Result<T, QueryError>;

impl QueryError {
    /// Creates an invalid temporal format error.
    pub fn invalid_temporal(
        kind: impl Into<Option<TemporalKind>>,
        input: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidTemporalFormat {
            kind: kind.into(),
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid configuration error with the given message.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfiguration(msg.into())
    }

    /// Creates an invalid request error with the given message.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Creates an invalid response error for the given endpoint.
    pub fn invalid_response(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Returns true if the evaluation was cancelled rather than failed.
    ///
    /// Callers typically ignore these, since a newer query superseded the
    /// cancelled one.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, QueryError::Cancelled)
    }

    /// Returns true if the server rejected the request.
    pub fn is_remote(&self) -> bool {
        matches!(self, QueryError::RemoteRequest { .. })
    }

    /// Returns the server's problem detail, if this is a remote error.
    pub fn problem(&self) -> Option<&ProblemDetail> {
        match self {
            QueryError::RemoteRequest { problem, .. } => Some(problem),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
