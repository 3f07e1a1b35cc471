//! Failure taxonomy: recovered-locally outcomes and contract violations

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Phase;

/// Malformed input reported to the caller.
///
/// Everything else that can go wrong during estimation is recovered locally
/// and surfaces as an [`EstimationFailure`] on the station result.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EstimationError {
    #[error("Sequence length mismatch: u={u}, k={k}, q={q}")]
    LengthMismatch { u: usize, k: usize, q: usize },

    #[error("Empty time series")]
    EmptySeries,

    #[error("Snow event times are not increasing: {0}")]
    EventOrder(String),

    #[error("Snow event indices [{start}, {end}] outside series of length {len}")]
    EventOutOfRange { start: usize, end: usize, len: usize },

    #[error("Invalid data interval: {0} seconds")]
    InvalidInterval(u32),

    #[error("Section {0} has no stations")]
    EmptySection(String),

    #[error("Stage {requested} requested while context is at {current}")]
    StageOrder { requested: String, current: String },
}

/// Why a station ended without some or all of its phase indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationFailure {
    /// Not enough valid samples to compute FFS or any phase
    InsufficientData,
    /// The rth ladder topped out without bounding the storm minimum
    NoThreshold,
    /// No sustained recovery before the data ends
    NoRecoveryPoint,
    /// A recovery point exists but no index reached the recovered ratio
    NoNcrt,
    /// A phase would have broken the ordering invariant and was unset
    InvariantViolation(Phase),
    /// No member had a Type-1 NCRT and the merged series was unusable
    SectionInconsistent,
}

impl std::fmt::Display for EstimationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EstimationFailure::InsufficientData => write!(f, "insufficient data"),
            EstimationFailure::NoThreshold => write!(f, "no speed threshold"),
            EstimationFailure::NoRecoveryPoint => write!(f, "no recovery point"),
            EstimationFailure::NoNcrt => write!(f, "no NCRT"),
            EstimationFailure::InvariantViolation(p) => write!(f, "{p} violated phase ordering"),
            EstimationFailure::SectionInconsistent => write!(f, "section inconsistent"),
        }
    }
}
