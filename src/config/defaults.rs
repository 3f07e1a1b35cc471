//! System-wide default constants.
//!
//! Every empirically tuned margin of the estimator lives here under a name.
//! The values were calibrated against historical reported lane-regain times,
//! so they are carried as-is and only overridden through `ncrt_config.toml`.
//! Durations are in minutes and converted to sample counts with the data
//! interval at runtime.

// ============================================================================
// Data
// ============================================================================

/// Sampling interval of the detector series (seconds).
pub const DATA_INTERVAL_SECS: u32 = 30;

/// Values below zero mark a missing sample.
pub const MISSING_VALUE: f64 = -1.0;

// ============================================================================
// Smoothing
// ============================================================================

/// Window of the series every search runs on (minutes).
pub const ANALYSIS_WINDOW_MIN: u32 = 60;

/// Window of the long trend series used for nighttime ratios (minutes).
pub const TREND_WINDOW_MIN: u32 = 120;

/// Minimum share of valid samples a smoothing window needs to emit a value.
pub const MIN_VALID_FRACTION: f64 = 0.5;

/// Plateau step of the stepped speed series used by the phase detector (mph).
pub const SPEED_STEP: f64 = 5.0;

/// Plateau step of the stepped density series (veh/mile).
pub const DENSITY_STEP: f64 = 3.0;

/// Plateau step used when aligning an NCRT to a speed plateau (mph).
pub const ALIGN_SPEED_STEP: f64 = 2.0;

// ============================================================================
// Free-flow speed
// ============================================================================

/// Densities below this are free-flow samples (veh/mile).
pub const FFS_K: f64 = 25.0;

/// Densities at or below this are too sparse to trust (veh/mile).
pub const LOW_K: f64 = 10.0;

/// Percentile of qualifying speeds taken as in-situ FFS.
pub const FFS_PERCENTILE: usize = 80;

/// Baseline FFS is trusted only with at least this many supporting samples.
pub const MIN_BASELINE_SAMPLES: usize = 100;

/// Upper density bound of the uncongested band when the baseline has no `kt`.
pub const DEFAULT_KT: f64 = 25.0;

// ============================================================================
// Threshold & recovery search
// ============================================================================

/// First ratio tried in the speed-threshold search.
pub const RTH_START: f64 = 0.70;

/// Increment of the ratio per iteration.
pub const RTH_STEP: f64 = 0.05;

/// Highest ratio the search may reach.
pub const RTH_MAX: f64 = 1.0;

/// Margin above `uth` the next hour must hold (mph).
pub const SUSTAIN_MARGIN: f64 = 5.0;

/// Separation from the worst speed a recovery must show (mph).
pub const WORST_SEPARATION: f64 = 5.0;

/// Falling this far below the worst speed restarts the refinement (mph).
pub const WORST_UNDERSHOOT: f64 = 3.0;

/// Floor of the density reported with a recovery point (veh/mile).
pub const MIN_RECOVERY_K: f64 = 15.0;

/// Speed below which a sample counts as congested (mph).
pub const CONGESTED_SPEED: f64 = 30.0;

/// Density floor of worst-ratio candidates (veh/mile).
pub const WORST_MIN_K: f64 = 5.0;

/// Ratio to normal counted as recovered.
pub const RECOVERED_RATIO: f64 = 0.9;

/// Span a stable free-flow hour may cover (mph).
pub const STABLE_SPEED_SPAN: f64 = 5.0;

/// Minimum speed drop of a snow reduction at near-constant density (mph).
pub const SNOW_REDUCTION_DROP: f64 = 8.0;

/// Maximum density rise during a snow reduction (veh/mile).
pub const SNOW_REDUCTION_K_RISE: f64 = 5.0;

/// Ratio to FFS that marks a reduction as a temporary dip.
pub const TEMPORARY_DROP_RATIO: f64 = 0.8;

/// Restarts of the recovery search after a partial recovery is rejected.
pub const MAX_PARTIAL_RECOVERY_RESTARTS: usize = 3;

// ============================================================================
// Phase detector
// ============================================================================

/// Ratio drop below the pre-storm maximum that marks a reduction.
pub const SRST_RATIO_DROP: f64 = 0.1;

/// Night ratio below which the nighttime reduction check fires.
pub const NIGHT_RATIO_THRESHOLD: f64 = 0.85;

/// Minimum SRST-to-trough drop to keep an SRST (mph).
pub const SRST_MIN_DROP: f64 = 5.0;

/// Renewed drop below the speed limit the PST guard tolerates (mph).
pub const PST_DROP_MARGIN: f64 = 5.0;

/// Margin over the worst ratio that floors the SRST reduction threshold.
pub const SRST_WORST_MARGIN: f64 = 0.05;

/// Stepped-speed drop that ends the quiet lead-in before SRST (mph).
pub const SRST_START_DROP: f64 = 2.0;

/// Stepped-speed change tolerated while walking to the SIST trough (mph).
pub const SIST_STEP_TOLERANCE: f64 = 1.0;

// ============================================================================
// Segmenter
// ============================================================================

/// Distance from the running centroid that closes a trajectory point.
pub const TRACKING_DISTANCE: f64 = 5.0;

/// Slope magnitude above which an edge counts as vertical.
pub const VERTICAL_SLOPE: f64 = 3.0;

/// Speed change a vertical edge needs (mph).
pub const VERTICAL_MIN_DU: f64 = 5.0;

/// Density distance within which two points share the same k (veh/mile).
pub const SAME_K_LIMIT: f64 = 5.0;

/// Angle difference below which two segments are parallel (degrees).
pub const PARALLEL_DEGREE: f64 = 10.0;

/// Hills spanning less than this in k and u are noise.
pub const LITTLE_HILL_K: f64 = 1.0;

/// See [`LITTLE_HILL_K`].
pub const LITTLE_HILL_U: f64 = 1.0;

// ============================================================================
// Section consensus
// ============================================================================

/// Spread below which section NCRTs are left alone (minutes).
pub const MIN_SPREAD_MIN: u32 = 60;

/// Deviation from the raw mean that marks an outlier NCRT (minutes).
pub const OUTLIER_DEVIATION_MIN: u32 = 120;

/// Ratio a member must show at a candidate NCRT.
pub const PLAUSIBLE_RATIO: f64 = 0.8;

/// Time a member may spend below the ratio after the candidate (minutes).
pub const MAX_LOW_RATIO_MIN: u32 = 30;

/// Density above which a low-ratio sample counts against a candidate.
pub const LOW_RATIO_MIN_K: f64 = 10.0;
