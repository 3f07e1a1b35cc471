//! Estimation Pipeline Module
//!
//! ## Stage Order
//!
//! ```text
//! STAGE 1: Preprocess   (multi-window smoothing, stepping)
//! STAGE 2: Baseline     (FFS, ratio-to-normal series)
//! STAGE 3: Threshold    (worst point, snow change points, search start, uth)
//! STAGE 4: Recovery     (recovery point, search end, Type-1 NCRT)
//! STAGE 5: Phases       (SRST, LST, SIST, PST)
//! ─────────────────────────────────────────────────────────────────────
//! SECTION: consensus barrier over every station's Type-1 pass
//!          (Type-2 back-propagation or Type-3 merged fallback,
//!           then STAGE 5 again for the members that received an NCRT)
//! ```
//!
//! Stages 1-5 of different stations run in parallel; one station's stages
//! always run in order on one thread.

mod context;
mod estimator;
mod report;
mod view;

pub use context::{EstimationContext, Scratch, Stage};
pub use estimator::{SectionEstimator, SectionInput, StationEstimator, StationInput};
pub use report::{PhaseMark, SectionReport, StationReport};
pub use view::StationView;
