//! Mutation and insertion codes, and the per-bucket values of a
//! mutations-over-time grid.
//!
//! Codes follow the aggregation endpoint's notation:
//!
//! - substitution: `C241T`, `S:D614G`
//! - deletion: `C241-`, `S:H69-`
//! - insertion: `ins_22204:GAG`, `ins_S:214:EPE`
//!
//! The optional `segment:` prefix names the gene or genome segment.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{QueryError, QueryResult};

static_regex!(
    MUTATION_PATTERN,
    r"^(?:(?P<segment>[A-Za-z0-9_.-]+):)?(?P<reference>[A-Za-z*])(?P<position>\d+)(?P<value>[A-Za-z*.-])$"
);
static_regex!(
    INSERTION_PATTERN,
    r"^ins_(?:(?P<segment>[A-Za-z0-9_.-]+):)?(?P<position>\d+):(?P<inserted>[A-Za-z*?]+)$"
);

/// Nucleotide or amino-acid sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SequenceType {
    Nucleotide,
    AminoAcid,
}

impl SequenceType {
    pub(crate) fn mutations_endpoint(&self) -> &'static str {
        match self {
            SequenceType::Nucleotide => "nucleotideMutations",
            SequenceType::AminoAcid => "aminoAcidMutations",
        }
    }

    pub(crate) fn insertions_endpoint(&self) -> &'static str {
        match self {
            SequenceType::Nucleotide => "nucleotideInsertions",
            SequenceType::AminoAcid => "aminoAcidInsertions",
        }
    }

    pub(crate) fn mutations_over_time_endpoint(&self) -> &'static str {
        match self {
            SequenceType::Nucleotide => "component/nucleotideMutationsOverTime",
            SequenceType::AminoAcid => "component/aminoAcidMutationsOverTime",
        }
    }
}

/// A substitution or deletion at one position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Mutation {
    Substitution {
        segment: Option<String>,
        reference: char,
        position: u32,
        value: char,
    },
    Deletion {
        segment: Option<String>,
        reference: char,
        position: u32,
    },
}

impl Mutation {
    pub fn segment(&self) -> Option<&str> {
        match self {
            Mutation::Substitution { segment, .. } | Mutation::Deletion { segment, .. } => {
                segment.as_deref()
            }
        }
    }

    pub fn position(&self) -> u32 {
        match self {
            Mutation::Substitution { position, .. } | Mutation::Deletion { position, .. } => {
                *position
            }
        }
    }

    pub fn is_deletion(&self) -> bool {
        matches!(self, Mutation::Deletion { .. })
    }
}

impl FromStr for Mutation {
    type Err = QueryError;

    fn from_str(code: &str) -> QueryResult<Self> {
        let invalid = || QueryError::InvalidMutationCode(code.to_string());
        let captures = MUTATION_PATTERN.captures(code).ok_or_else(invalid)?;

        let segment = captures.name("segment").map(|m| m.as_str().to_string());
        let reference = captures
            .name("reference")
            .and_then(|m| m.as_str().chars().next())
            .ok_or_else(invalid)?;
        let position = captures
            .name("position")
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .ok_or_else(invalid)?;
        let value = captures
            .name("value")
            .and_then(|m| m.as_str().chars().next())
            .ok_or_else(invalid)?;

        Ok(if value == '-' {
            Mutation::Deletion {
                segment,
                reference,
                position,
            }
        } else {
            Mutation::Substitution {
                segment,
                reference,
                position,
                value,
            }
        })
    }
}

impl fmt::Display for Mutation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(segment) = self.segment() {
            write!(f, "{segment}:")?;
        }
        match self {
            Mutation::Substitution {
                reference,
                position,
                value,
                ..
            } => write!(f, "{reference}{position}{value}"),
            Mutation::Deletion {
                reference,
                position,
                ..
            } => write!(f, "{reference}{position}-"),
        }
    }
}

/// Symbols inserted after a position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Insertion {
    pub segment: Option<String>,
    pub position: u32,
    pub inserted: String,
}

impl FromStr for Insertion {
    type Err = QueryError;

    fn from_str(code: &str) -> QueryResult<Self> {
        let invalid = || QueryError::InvalidMutationCode(code.to_string());
        let captures = INSERTION_PATTERN.captures(code).ok_or_else(invalid)?;

        Ok(Insertion {
            segment: captures.name("segment").map(|m| m.as_str().to_string()),
            position: captures
                .name("position")
                .and_then(|m| m.as_str().parse::<u32>().ok())
                .ok_or_else(invalid)?,
            inserted: captures
                .name("inserted")
                .map(|m| m.as_str().to_string())
                .ok_or_else(invalid)?,
        })
    }
}

impl fmt::Display for Insertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.segment {
            Some(segment) => write!(f, "ins_{segment}:{}:{}", self.position, self.inserted),
            None => write!(f, "ins_{}:{}", self.position, self.inserted),
        }
    }
}

/// Value of one (mutation, time bucket) cell of a mutations-over-time grid.
///
/// A grid stores `Option<MutationCell>`: `None` means the bucket had no
/// samples at all, which is different both from a cell that was never set
/// and from a cell whose coverage was too low to report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MutationCell {
    /// Samples exist, but too few cover the position.
    BelowThreshold {
        #[serde(rename = "totalCount")]
        total_count: u64,
    },
    /// `count` of the `coverage` samples covering the position carry the mutation.
    ValueWithCoverage {
        count: u64,
        coverage: u64,
        #[serde(rename = "totalCount")]
        total_count: u64,
    },
}

impl MutationCell {
    /// Classifies a measured cell against a minimum coverage.
    ///
    /// Zero coverage is always below threshold, since no proportion exists.
    pub fn classify(count: u64, coverage: u64, total_count: u64, min_coverage: u64) -> Self {
        if coverage == 0 || coverage < min_coverage {
            MutationCell::BelowThreshold { total_count }
        } else {
            MutationCell::ValueWithCoverage {
                count,
                coverage,
                total_count,
            }
        }
    }

    /// Fraction of covering samples that carry the mutation.
    pub fn proportion(&self) -> Option<f64> {
        match self {
            MutationCell::ValueWithCoverage {
                count, coverage, ..
            } if *coverage > 0 => Some(*count as f64 / *coverage as f64),
            _ => None,
        }
    }

    pub fn total_count(&self) -> u64 {
        match self {
            MutationCell::BelowThreshold { total_count }
            | MutationCell::ValueWithCoverage { total_count, .. } => *total_count,
        }
    }
}
