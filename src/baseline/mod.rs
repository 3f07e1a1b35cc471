//! Baseline Model Adapter - Free-Flow Speed & Normal Speed Reference
//!
//! Wraps the per-station "normal" behavior supplied by an external
//! normal-function collaborator and turns it into the two references every
//! search needs: a free-flow speed (FFS) and a ratio-to-normal series.
//!
//! ## Architecture
//!
//! - `BaselineModel`: per-station, per-season FFS plus optional day curve
//!   (speed vs density) and nighttime profile (speed vs time of day)
//! - `BaselineProvider`: lookup seam for the collaborator; `InMemoryBaselines`
//!   serves models loaded from JSON
//! - `resolve_ffs`: baseline FFS when it is trusted, otherwise an in-situ
//!   percentile from the station's own free-flow samples
//! - `RatioSeries`: smoothed speed over normal speed, day and night
//!
//! ## FFS fallback
//!
//! ```text
//! baseline present and sample_count >= min_baseline_samples -> baseline FFS
//! otherwise, for the pre-event and post-event windows:
//!     speeds with low_k < k < ffs_k and u > speed_limit
//!     -> p-th percentile (default 80th)
//! FFS = max(pre, post); neither window qualifies -> NoQualifyingSamples
//! ```

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::config::EstimationConfig;
use crate::processing::{stats, Trend};
use crate::types::{is_valid, SnowEvent, TimeSeries, MISSING};

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BaselineError {
    #[error("No free-flow samples (pre-event: {pre}, post-event: {post})")]
    NoQualifyingSamples { pre: usize, post: usize },

    #[error("Invalid speed-density curve: {0}")]
    InvalidCurve(String),

    #[error("Invalid nighttime profile: {0}")]
    InvalidProfile(String),
}

// ============================================================================
// Normal functions
// ============================================================================

/// Piecewise-linear normal speed as a function of density.
///
/// Beyond the first and last breakpoints the curve is flat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(f64, f64)>", into = "Vec<(f64, f64)>")]
pub struct SpeedDensityCurve {
    points: Vec<(f64, f64)>,
}

impl TryFrom<Vec<(f64, f64)>> for SpeedDensityCurve {
    type Error = BaselineError;

    fn try_from(points: Vec<(f64, f64)>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<SpeedDensityCurve> for Vec<(f64, f64)> {
    fn from(curve: SpeedDensityCurve) -> Self {
        curve.points
    }
}

impl SpeedDensityCurve {
    /// Build from `(k, u)` breakpoints with strictly increasing `k`.
    pub fn new(points: Vec<(f64, f64)>) -> Result<Self, BaselineError> {
        if points.is_empty() {
            return Err(BaselineError::InvalidCurve("no breakpoints".into()));
        }
        if points.iter().any(|(k, u)| !k.is_finite() || !u.is_finite() || *u <= 0.0) {
            return Err(BaselineError::InvalidCurve("non-finite or non-positive value".into()));
        }
        if points.windows(2).any(|w| w[1].0 <= w[0].0) {
            return Err(BaselineError::InvalidCurve("density must strictly increase".into()));
        }
        Ok(Self { points })
    }

    /// Normal speed at density `k`.
    pub fn speed_at(&self, k: f64) -> f64 {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];
        if k <= first.0 {
            return first.1;
        }
        if k >= last.0 {
            return last.1;
        }
        let i = self.points.partition_point(|(pk, _)| *pk <= k);
        let (k0, u0) = self.points[i - 1];
        let (k1, u1) = self.points[i];
        u0 + (u1 - u0) * (k - k0) / (k1 - k0)
    }
}

/// Normal nighttime speed by time of day.
///
/// The night window may wrap midnight (`start > end`). Between breakpoints
/// the speed is interpolated linearly in minutes since the window start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NightProfile {
    pub start: NaiveTime,
    pub end: NaiveTime,
    /// `(time, speed)` breakpoints in window order
    pub points: Vec<(NaiveTime, f64)>,
}

impl NightProfile {
    pub fn validate(&self) -> Result<(), BaselineError> {
        if self.points.is_empty() {
            return Err(BaselineError::InvalidProfile("no breakpoints".into()));
        }
        let offsets: Vec<u32> = self.points.iter().map(|(t, _)| self.offset(*t)).collect();
        if offsets.windows(2).any(|w| w[1] <= w[0]) {
            return Err(BaselineError::InvalidProfile("breakpoints out of order".into()));
        }
        Ok(())
    }

    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start <= self.end {
            t >= self.start && t < self.end
        } else {
            t >= self.start || t < self.end
        }
    }

    /// Normal speed at `t`, `None` outside the night window.
    pub fn speed_at(&self, t: NaiveTime) -> Option<f64> {
        if !self.contains(t) || self.points.is_empty() {
            return None;
        }
        let x = f64::from(self.offset(t));
        let pts: Vec<(f64, f64)> = self
            .points
            .iter()
            .map(|(pt, u)| (f64::from(self.offset(*pt)), *u))
            .collect();
        let first = pts[0];
        let last = pts[pts.len() - 1];
        if x <= first.0 {
            return Some(first.1);
        }
        if x >= last.0 {
            return Some(last.1);
        }
        let i = pts.partition_point(|(px, _)| *px <= x);
        let (x0, u0) = pts[i - 1];
        let (x1, u1) = pts[i];
        Some(u0 + (u1 - u0) * (x - x0) / (x1 - x0))
    }

    fn offset(&self, t: NaiveTime) -> u32 {
        let m = t.num_seconds_from_midnight() / 60;
        let s = self.start.num_seconds_from_midnight() / 60;
        (m + 24 * 60 - s) % (24 * 60)
    }
}

// ============================================================================
// Baseline model and provider
// ============================================================================

/// Normal behavior of one station in one season.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineModel {
    pub station_id: String,
    #[serde(default)]
    pub season: Option<String>,
    pub ffs: f64,
    /// Samples that supported the FFS fit
    #[serde(default)]
    pub sample_count: usize,
    /// Upper density bound of uncongested operation
    #[serde(default)]
    pub kt: Option<f64>,
    #[serde(default)]
    pub day_curve: Option<SpeedDensityCurve>,
    #[serde(default)]
    pub night_profile: Option<NightProfile>,
}

impl BaselineModel {
    /// A model with only an FFS.
    pub fn with_ffs(station_id: impl Into<String>, ffs: f64, sample_count: usize) -> Self {
        Self {
            station_id: station_id.into(),
            season: None,
            ffs,
            sample_count,
            kt: None,
            day_curve: None,
            night_profile: None,
        }
    }

    /// True when the FFS is backed by enough samples to be trusted.
    pub fn has_valid_ffs(&self, config: &EstimationConfig) -> bool {
        self.ffs.is_finite() && self.ffs > 0.0 && self.sample_count >= config.ffs.min_baseline_samples
    }

    /// Normal speed at density `k`, falling back to `ffs`.
    pub fn normal_speed(&self, k: f64, ffs: f64) -> f64 {
        self.day_curve.as_ref().map_or(ffs, |c| c.speed_at(k))
    }
}

/// Source of baseline models.
pub trait BaselineProvider: Send + Sync {
    fn baseline(&self, station_id: &str) -> Option<Arc<BaselineModel>>;
}

/// Baselines held in memory, keyed by station.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBaselines {
    models: HashMap<String, Arc<BaselineModel>>,
}

impl InMemoryBaselines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, model: BaselineModel) {
        self.models.insert(model.station_id.clone(), Arc::new(model));
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl FromIterator<BaselineModel> for InMemoryBaselines {
    fn from_iter<I: IntoIterator<Item = BaselineModel>>(iter: I) -> Self {
        let mut b = Self::new();
        for m in iter {
            b.insert(m);
        }
        b
    }
}

impl BaselineProvider for InMemoryBaselines {
    fn baseline(&self, station_id: &str) -> Option<Arc<BaselineModel>> {
        self.models.get(station_id).cloned()
    }
}

// ============================================================================
// FFS determination
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FfsSource {
    Baseline,
    PreEvent,
    PostEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FfsEstimate {
    pub value: f64,
    pub source: FfsSource,
}

/// Determine the FFS of one station for one event.
pub fn resolve_ffs(
    baseline: Option<&BaselineModel>,
    series: &TimeSeries,
    event: &SnowEvent,
    speed_limit: f64,
    config: &EstimationConfig,
) -> Result<FfsEstimate, BaselineError> {
    if let Some(model) = baseline.filter(|m| m.has_valid_ffs(config)) {
        return Ok(FfsEstimate {
            value: model.ffs,
            source: FfsSource::Baseline,
        });
    }

    let n = series.len();
    let start = event.snow_start_index().min(n);
    let end = (event.snow_end_index() + 1).min(n);
    let pre = qualifying_speeds(series, 0..start, speed_limit, config);
    let post = qualifying_speeds(series, end..n, speed_limit, config);
    let (pre_n, post_n) = (pre.len(), post.len());

    let p = config.ffs.percentile;
    let pre_ffs = stats::percentile(pre, p);
    let post_ffs = stats::percentile(post, p);
    debug!(pre = ?pre_ffs, post = ?post_ffs, pre_n, post_n, "In-situ FFS candidates");

    match (pre_ffs, post_ffs) {
        (Some(a), Some(b)) if b > a => Ok(FfsEstimate { value: b, source: FfsSource::PostEvent }),
        (Some(a), _) => Ok(FfsEstimate { value: a, source: FfsSource::PreEvent }),
        (None, Some(b)) => Ok(FfsEstimate { value: b, source: FfsSource::PostEvent }),
        (None, None) => Err(BaselineError::NoQualifyingSamples { pre: pre_n, post: post_n }),
    }
}

fn qualifying_speeds(
    series: &TimeSeries,
    range: std::ops::Range<usize>,
    speed_limit: f64,
    config: &EstimationConfig,
) -> Vec<f64> {
    let (u, k) = (&series.u()[range.clone()], &series.k()[range]);
    u.iter()
        .zip(k)
        .filter(|&(&u, &k)| {
            is_valid(u) && is_valid(k) && k > config.ffs.low_k && k < config.ffs.ffs_k && u > speed_limit
        })
        .map(|(&u, _)| u)
        .collect()
}

// ============================================================================
// Ratio series
// ============================================================================

/// Speed relative to normal behavior.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RatioSeries {
    /// Analysis speed over normal speed at the observed density
    pub normal: Vec<f64>,
    /// Long-trend speed over nighttime normal speed, only at night indices
    pub night: Vec<Option<f64>>,
}

impl RatioSeries {
    pub fn build(
        analysis: &Trend,
        long: &Trend,
        baseline: Option<&BaselineModel>,
        ffs: f64,
        event: &SnowEvent,
    ) -> Self {
        let normal = analysis
            .u
            .iter()
            .zip(&analysis.k)
            .map(|(&u, &k)| {
                if !is_valid(u) || !is_valid(k) {
                    return MISSING;
                }
                let expected = baseline.map_or(ffs, |b| b.normal_speed(k, ffs));
                if expected > 0.0 { u / expected } else { MISSING }
            })
            .collect();

        // A profile with unordered breakpoints gives no night ratios at all
        let profile = baseline
            .and_then(|b| b.night_profile.as_ref())
            .filter(|p| p.validate().is_ok());
        let night = long
            .u
            .iter()
            .enumerate()
            .map(|(i, &u)| {
                let expected = profile?.speed_at(event.time_at(i).time())?;
                (is_valid(u) && expected > 0.0).then(|| u / expected)
            })
            .collect();

        Self { normal, night }
    }

    pub fn is_night(&self, idx: usize) -> bool {
        self.night.get(idx).is_some_and(Option::is_some)
    }
}
