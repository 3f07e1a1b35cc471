//! NCRTES: Normal Clearance Recovery Time Estimation
//!
//! Estimates when traffic at roadway detector stations returned to normal
//! after a winter storm, together with the phase markers of the storm's
//! impact.
//!
//! ## Architecture
//!
//! - **Signal Preprocessor**: multi-window smoothing and plateau stepping
//! - **Baseline Adapter**: free-flow speed and the ratio-to-normal series
//! - **Segmenter**: hills and trajectory groups on the speed-density plane
//! - **Recovery Search**: speed threshold, recovery point and Type-1 NCRT
//! - **Phase Detector**: SRST, LST, SIST and PST around the NCRT
//! - **Section Consensus**: Type-2 back-propagation and Type-3 fallback

pub mod baseline;
pub mod config;
pub mod phase;
pub mod pipeline;
pub mod processing;
pub mod recovery;
pub mod section;
pub mod segment;
pub mod types;

// Re-export configuration
pub use config::EstimationConfig;

// Re-export commonly used types
pub use types::{
    EstimationError, EstimationFailure, NcrtType, Phase, PhaseIndices, SnowEvent, TimeSeries, MISSING,
};

// Re-export the estimation entry points
pub use pipeline::{
    EstimationContext, SectionEstimator, SectionInput, SectionReport, StationEstimator, StationInput,
    StationReport,
};

// Re-export baseline components
pub use baseline::{BaselineError, BaselineModel, BaselineProvider, InMemoryBaselines};
