//! Threshold & Recovery-Point Search
//!
//! Finds where a station's speed recovered for good after the storm and
//! the Type-1 NCRT that follows from it.
//!
//! ## Architecture
//!
//! ```text
//! worst-ratio point ─┐
//! snow change points ├─► search start ─► recovery point ─► search end ─► NCRT
//! external hint ─────┘                        ▲                          │
//!                                             └── partial recovery ◄─────┘
//!                                                 (bounded restarts)
//! ```
//!
//! - [`threshold`]: the `uth`/`rth` ladder
//! - [`search`]: every scan of the flow above, on the analysis series

pub mod search;
pub mod threshold;

pub use search::{
    determine_ncrt, find_recovery_point, ncrt_search_end, partial_recovery_restart, search_start,
    snow_change_points, worst_ratio_point,
};
pub use threshold::SpeedThreshold;

use serde::Serialize;
use tracing::{debug, warn};

use crate::pipeline::StationView;
use crate::types::EstimationFailure;

/// A sustained recovery above the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecoveryPoint {
    pub index: usize,
    /// Density at the recovery, floored at `min_recovery_k`
    pub k_at_recovery: f64,
}

/// Result of a complete Type-1 search.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecoveryOutcome {
    pub recovery: RecoveryPoint,
    pub search_end: usize,
    pub ncrt: usize,
    /// Partial recoveries rejected before this one
    pub restarts: usize,
}

/// Runs the recovery search with partial-recovery rejection.
pub struct RecoverySearch;

impl RecoverySearch {
    /// Search from `start` for a recovery point and its NCRT.
    ///
    /// A recovery rejected as partial restarts the search after the group
    /// that exposed it, at most `max_partial_recovery_restarts` times. When a
    /// restart finds nothing the last complete result stands.
    pub fn run(
        view: &StationView<'_>,
        start: usize,
        uth: f64,
        worst: usize,
    ) -> Result<RecoveryOutcome, EstimationFailure> {
        let max_restarts = view.config.threshold.max_partial_recovery_restarts;
        let mut from = start;
        let mut last: Option<RecoveryOutcome> = None;

        for restarts in 0..=max_restarts {
            let Some(recovery) = find_recovery_point(view, from, uth, worst) else {
                return last.ok_or(EstimationFailure::NoRecoveryPoint);
            };
            let search_end = ncrt_search_end(view, recovery.index);
            let Some(ncrt) = determine_ncrt(view, recovery.index, search_end) else {
                return last.ok_or(EstimationFailure::NoNcrt);
            };
            let outcome = RecoveryOutcome {
                recovery,
                search_end,
                ncrt,
                restarts,
            };

            if restarts == max_restarts {
                if restarts > 0 {
                    warn!(restarts, ncrt, "Partial-recovery restarts exhausted, keeping last result");
                }
                return Ok(outcome);
            }
            match partial_recovery_restart(view, from, recovery.index, search_end) {
                Some(next) if next > from => {
                    debug!(rejected = recovery.index, restart_from = next, "Recovery was partial");
                    last = Some(outcome);
                    from = next;
                }
                _ => return Ok(outcome),
            }
        }
        last.ok_or(EstimationFailure::NoRecoveryPoint)
    }
}
