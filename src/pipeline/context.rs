//! Working aggregate of one (station, event) estimation

use std::sync::Arc;

use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::StationView;
use crate::baseline::{resolve_ffs, BaselineModel, FfsEstimate, RatioSeries};
use crate::config::EstimationConfig;
use crate::phase::PhaseDetector;
use crate::processing::{SignalPreprocessor, SmoothedSeries};
use crate::recovery::{self, RecoveryPoint, RecoverySearch, SpeedThreshold};
use crate::types::{
    EstimationError, EstimationFailure, NcrtType, OrderViolation, PhaseIndices, SnowEvent, TimeSeries,
};

// ============================================================================
// Stage cursor
// ============================================================================

/// Position of a context in the fixed stage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Created,
    Preprocessed,
    Baselined,
    Thresholded,
    Recovered,
    Phased,
}

impl Stage {
    /// The stage that must be complete before `self` may run.
    fn previous(self) -> Self {
        match self {
            Stage::Created | Stage::Preprocessed => Stage::Created,
            Stage::Baselined => Stage::Preprocessed,
            Stage::Thresholded => Stage::Baselined,
            Stage::Recovered => Stage::Thresholded,
            Stage::Phased => Stage::Recovered,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Created => write!(f, "created"),
            Stage::Preprocessed => write!(f, "preprocess"),
            Stage::Baselined => write!(f, "baseline"),
            Stage::Thresholded => write!(f, "threshold"),
            Stage::Recovered => write!(f, "recovery"),
            Stage::Phased => write!(f, "phases"),
        }
    }
}

/// Intermediate results kept for the section pass and the report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Scratch {
    pub worst: Option<usize>,
    pub change_points: Vec<usize>,
    pub search_start: Option<usize>,
    pub threshold: Option<SpeedThreshold>,
    pub recovery: Option<RecoveryPoint>,
    pub search_end: Option<usize>,
    /// Partial recoveries rejected on the way to the final one
    pub restarts: usize,
}

// ============================================================================
// Context
// ============================================================================

/// Everything one station accumulates for one event.
///
/// Stages run in [`Stage`] order; calling one out of turn is an
/// [`EstimationError::StageOrder`]. A stage that cannot produce its result
/// records an [`EstimationFailure`] and leaves the cursor where it was, so
/// the remaining stages are skipped.
#[derive(Debug, Clone)]
pub struct EstimationContext {
    station_id: String,
    speed_limit: f64,
    series: TimeSeries,
    event: Arc<SnowEvent>,
    baseline: Option<Arc<BaselineModel>>,
    config: Arc<EstimationConfig>,
    /// Externally supplied earliest search start
    hint: Option<usize>,
    reported_regain: Option<NaiveDateTime>,

    stage: Stage,
    smoothed: Option<SmoothedSeries>,
    ffs: Option<FfsEstimate>,
    ratios: Option<RatioSeries>,
    scratch: Scratch,
    phases: PhaseIndices,
    failure: Option<EstimationFailure>,
    violations: Vec<OrderViolation>,
}

impl EstimationContext {
    /// Create a context, checking that the event fits the series.
    ///
    /// The configured data interval is replaced by the event's when they
    /// differ.
    pub fn new(
        station_id: impl Into<String>,
        speed_limit: f64,
        series: TimeSeries,
        event: Arc<SnowEvent>,
        baseline: Option<Arc<BaselineModel>>,
        config: Arc<EstimationConfig>,
    ) -> Result<Self, EstimationError> {
        event.check_fits(series.len())?;
        let station_id = station_id.into();
        let config = if config.data.interval_secs == event.interval_secs() {
            config
        } else {
            debug!(
                station = %station_id,
                configured = config.data.interval_secs,
                event = event.interval_secs(),
                "Using the event's data interval"
            );
            let mut adjusted = (*config).clone();
            adjusted.data.interval_secs = event.interval_secs();
            Arc::new(adjusted)
        };

        Ok(Self {
            station_id,
            speed_limit,
            series,
            event,
            baseline,
            config,
            hint: None,
            reported_regain: None,
            stage: Stage::Created,
            smoothed: None,
            ffs: None,
            ratios: None,
            scratch: Scratch::default(),
            phases: PhaseIndices::default(),
            failure: None,
            violations: Vec::new(),
        })
    }

    /// Never start the recovery search before `hint`.
    pub fn with_search_hint(mut self, hint: Option<usize>) -> Self {
        self.hint = hint;
        self
    }

    /// Attach an externally reported lane-regain time for the report.
    pub fn with_reported_regain(mut self, regain: Option<NaiveDateTime>) -> Self {
        self.reported_regain = regain;
        self
    }

    // ------------------------------------------------------------------------
    // Stages
    // ------------------------------------------------------------------------

    /// Run every Type-1 stage in order, stopping at the first failure.
    pub fn run(&mut self) -> Result<(), EstimationError> {
        let stages: [fn(&mut Self) -> Result<(), EstimationError>; 5] = [
            Self::preprocess,
            Self::resolve_baseline,
            Self::find_threshold,
            Self::find_recovery,
            Self::detect_phases,
        ];
        for stage in stages {
            if self.failure.is_some() {
                break;
            }
            stage(self)?;
        }
        info!(
            station = %self.station_id,
            ncrt = ?self.phases.ncrt_index(),
            failure = ?self.failure,
            "Type-1 pass complete"
        );
        Ok(())
    }

    pub fn preprocess(&mut self) -> Result<(), EstimationError> {
        self.enter(Stage::Preprocessed)?;
        match SignalPreprocessor::run(&self.series, &self.config) {
            Ok(smoothed) => {
                self.smoothed = Some(smoothed);
                self.stage = Stage::Preprocessed;
            }
            Err(e) => {
                warn!(station = %self.station_id, error = %e, "Preprocessing failed");
                self.fail(EstimationFailure::InsufficientData);
            }
        }
        Ok(())
    }

    pub fn resolve_baseline(&mut self) -> Result<(), EstimationError> {
        self.enter(Stage::Baselined)?;
        let smoothed = self.smoothed.as_ref().ok_or_else(|| self.order_error(Stage::Baselined))?;
        let baseline = self.baseline.as_deref();
        match resolve_ffs(baseline, &self.series, &self.event, self.speed_limit, &self.config) {
            Ok(ffs) => {
                debug!(station = %self.station_id, ffs = ffs.value, source = ?ffs.source, "FFS");
                self.ratios = Some(RatioSeries::build(
                    smoothed.analysis(),
                    smoothed.long(),
                    baseline,
                    ffs.value,
                    &self.event,
                ));
                self.ffs = Some(ffs);
                self.stage = Stage::Baselined;
            }
            Err(e) => {
                warn!(station = %self.station_id, error = %e, "No FFS");
                self.fail(EstimationFailure::InsufficientData);
            }
        }
        Ok(())
    }

    pub fn find_threshold(&mut self) -> Result<(), EstimationError> {
        self.enter(Stage::Thresholded)?;
        let view = self.view().ok_or_else(|| self.order_error(Stage::Thresholded))?;

        let worst = recovery::worst_ratio_point(&view);
        let change_points = recovery::snow_change_points(&view);
        let snow = view.snow_start()..view.snow_end() + 1;
        let threshold = SpeedThreshold::find(view.ffs, &view.sus()[snow], &self.config.threshold);
        let search_start = worst.map(|w| recovery::search_start(w, &change_points, self.hint));

        self.scratch.worst = worst;
        self.scratch.change_points = change_points;
        self.scratch.search_start = search_start;
        let Some(worst) = worst else {
            self.fail(EstimationFailure::InsufficientData);
            return Ok(());
        };
        match threshold {
            Ok(t) => {
                debug!(
                    station = %self.station_id,
                    worst,
                    uth = t.uth,
                    rth = t.rth,
                    iterations = t.iterations,
                    start = ?search_start,
                    "Threshold"
                );
                self.scratch.threshold = Some(t);
                self.stage = Stage::Thresholded;
            }
            Err(f) => self.fail(f),
        }
        Ok(())
    }

    pub fn find_recovery(&mut self) -> Result<(), EstimationError> {
        self.enter(Stage::Recovered)?;
        let view = self.view().ok_or_else(|| self.order_error(Stage::Recovered))?;
        let (Some(threshold), Some(worst), Some(start)) =
            (self.scratch.threshold, self.scratch.worst, self.scratch.search_start)
        else {
            return Err(self.order_error(Stage::Recovered));
        };

        match RecoverySearch::run(&view, start, threshold.uth, worst) {
            Ok(outcome) => {
                self.scratch.recovery = Some(outcome.recovery);
                self.scratch.search_end = Some(outcome.search_end);
                self.scratch.restarts = outcome.restarts;
                self.phases.set_ncrt(outcome.ncrt, NcrtType::Station);
                self.stage = Stage::Recovered;
            }
            Err(f) => self.fail(f),
        }
        Ok(())
    }

    pub fn detect_phases(&mut self) -> Result<(), EstimationError> {
        self.enter(Stage::Phased)?;
        let view = self.view().ok_or_else(|| self.order_error(Stage::Phased))?;
        let mut phases = self.phases;
        let violations = PhaseDetector::detect(&view, self.scratch.worst, &mut phases);

        self.phases = phases;
        if let Some(v) = violations.first() {
            self.failure.get_or_insert(EstimationFailure::InvariantViolation(v.phase));
        }
        self.violations = violations;
        self.stage = Stage::Phased;
        Ok(())
    }

    /// Take an NCRT from the section pass.
    ///
    /// Allowed once FFS is known and before phases ran. Any earlier failure
    /// is cleared; the phases must be detected again afterwards.
    pub fn assign_ncrt(&mut self, index: usize, kind: NcrtType) -> Result<(), EstimationError> {
        if !(Stage::Baselined..=Stage::Recovered).contains(&self.stage) {
            return Err(EstimationError::StageOrder {
                requested: format!("{kind} assignment"),
                current: self.stage.to_string(),
            });
        }
        let index = index.min(self.series.len().saturating_sub(1));
        info!(station = %self.station_id, ncrt = index, kind = %kind, "NCRT assigned");
        self.phases.set_ncrt(index, kind);
        self.failure = None;
        self.stage = Stage::Recovered;
        Ok(())
    }

    /// Record a failure that is not tied to one stage.
    pub fn mark_failed(&mut self, failure: EstimationFailure) {
        self.fail(failure);
    }

    fn enter(&self, requested: Stage) -> Result<(), EstimationError> {
        if self.stage == requested.previous() {
            Ok(())
        } else {
            Err(self.order_error(requested))
        }
    }

    fn order_error(&self, requested: Stage) -> EstimationError {
        EstimationError::StageOrder {
            requested: requested.to_string(),
            current: self.stage.to_string(),
        }
    }

    fn fail(&mut self, failure: EstimationFailure) {
        warn!(station = %self.station_id, stage = %self.stage, %failure, "Station estimation stopped");
        self.failure = Some(failure);
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Borrowed inputs of the searches, available from the baseline stage on.
    pub fn view(&self) -> Option<StationView<'_>> {
        Some(StationView {
            series: &self.series,
            smoothed: self.smoothed.as_ref()?,
            ratios: self.ratios.as_ref()?,
            event: &self.event,
            ffs: self.ffs?.value,
            kt: self.kt(),
            speed_limit: self.speed_limit,
            config: &self.config,
        })
    }

    /// Upper density bound of uncongested operation.
    pub fn kt(&self) -> f64 {
        self.baseline
            .as_ref()
            .and_then(|b| b.kt)
            .unwrap_or(self.config.ffs.default_kt)
    }

    /// True once FFS and the ratio series exist.
    pub fn is_usable(&self) -> bool {
        self.stage >= Stage::Baselined
    }

    pub fn station_id(&self) -> &str {
        &self.station_id
    }

    pub fn speed_limit(&self) -> f64 {
        self.speed_limit
    }

    pub fn series(&self) -> &TimeSeries {
        &self.series
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn event(&self) -> &SnowEvent {
        &self.event
    }

    pub fn config(&self) -> &EstimationConfig {
        &self.config
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn smoothed(&self) -> Option<&SmoothedSeries> {
        self.smoothed.as_ref()
    }

    pub fn ffs(&self) -> Option<FfsEstimate> {
        self.ffs
    }

    pub fn ratios(&self) -> Option<&RatioSeries> {
        self.ratios.as_ref()
    }

    pub fn scratch(&self) -> &Scratch {
        &self.scratch
    }

    pub fn phases(&self) -> &PhaseIndices {
        &self.phases
    }

    pub fn failure(&self) -> Option<EstimationFailure> {
        self.failure
    }

    pub fn violations(&self) -> &[OrderViolation] {
        &self.violations
    }

    pub fn reported_regain(&self) -> Option<NaiveDateTime> {
        self.reported_regain
    }

    /// Type-1 NCRT, when the station found one itself.
    pub fn type1_ncrt(&self) -> Option<usize> {
        self.phases
            .ncrt()
            .filter(|n| n.kind == NcrtType::Station)
            .map(|n| n.index)
    }
}
