//! Shared data structures for NCRT estimation
//!
//! This module defines the value types every stage exchanges:
//! - `TimeSeries`: aligned speed/density/flow samples with a missing sentinel
//! - `SnowEvent`: the storm window and its time base
//! - `PhaseIndices`: the tagged-optional SRST/LST/SIST/PST/NCRT result fields
//! - `EstimationFailure` / `EstimationError`: local failures vs contract violations

mod error;
mod event;
mod phase;
mod series;

pub use error::*;
pub use event::*;
pub use phase::*;
pub use series::*;
