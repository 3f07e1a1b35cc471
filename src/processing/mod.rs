//! Signal processing module - multi-window smoothing and plateau stepping
//!
//! Turns the raw `u, k, q` samples of one station into the derived series every
//! later stage reads:
//!
//! - centered moving averages at the 30-min, 1-h, 2-h and 3-h windows (plus
//!   the configured analysis and trend windows when they differ)
//! - stepped speed/density series that collapse near-constant runs into
//!   plateaus
//!
//! Index alignment is preserved everywhere, and a missing raw sample is
//! missing in every derived series.

mod smoothing;
pub mod stats;

pub use smoothing::{smooth, stepping};

use serde::Serialize;
use thiserror::Error;

use crate::config::EstimationConfig;
use crate::types::TimeSeries;

/// Errors in signal processing
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessingError {
    #[error("Smoothing window must be odd and positive, got {0}")]
    InvalidWindow(usize),

    #[error("Insufficient data: need {needed}, have {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("No trend computed at the {0}-min window")]
    MissingTrend(u32),
}

/// Standard smoothing windows in minutes.
pub const STANDARD_WINDOWS_MIN: [u32; 4] = [30, 60, 120, 180];

/// Smoothed speed, density and flow at one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trend {
    pub window_min: u32,
    pub u: Vec<f64>,
    pub k: Vec<f64>,
    pub q: Vec<f64>,
}

/// Every derived series of one station.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmoothedSeries {
    trends: Vec<Trend>,
    /// Positions of the analysis and long trends in `trends`
    analysis: usize,
    long: usize,
    /// Analysis speed stepped at the phase-detector step
    pub stepped_u: Vec<f64>,
    /// Analysis density stepped at the density step
    pub stepped_k: Vec<f64>,
    /// Analysis speed stepped at the alignment step
    pub aligned_u: Vec<f64>,
}

impl SmoothedSeries {
    /// Trend at `window_min`, when it was computed.
    pub fn at(&self, window_min: u32) -> Option<&Trend> {
        self.trends.iter().find(|t| t.window_min == window_min)
    }

    /// The series all searches run on.
    pub fn analysis(&self) -> &Trend {
        &self.trends[self.analysis]
    }

    /// The long trend series.
    pub fn long(&self) -> &Trend {
        &self.trends[self.long]
    }

    pub fn len(&self) -> usize {
        self.stepped_u.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stepped_u.is_empty()
    }
}

/// Builds [`SmoothedSeries`] from raw station samples.
pub struct SignalPreprocessor;

impl SignalPreprocessor {
    /// Smooth and step one station's series.
    ///
    /// Fails with `InsufficientData` when fewer than one analysis window of
    /// valid samples exists.
    pub fn run(series: &TimeSeries, config: &EstimationConfig) -> Result<SmoothedSeries, ProcessingError> {
        let s = &config.smoothing;
        let needed = config.intervals(s.analysis_window_min);
        let available = series.valid_count();
        if available < needed {
            return Err(ProcessingError::InsufficientData { needed, available });
        }

        let mut windows: Vec<u32> = STANDARD_WINDOWS_MIN.to_vec();
        for w in [s.analysis_window_min, s.trend_window_min] {
            if !windows.contains(&w) {
                windows.push(w);
            }
        }

        let trends = windows
            .into_iter()
            .map(|w| Self::trend(series, w, config))
            .collect::<Result<Vec<_>, _>>()?;

        let analysis = trend_position(&trends, s.analysis_window_min)?;
        let long = trend_position(&trends, s.trend_window_min)?;
        let stepped_u = stepping(&trends[analysis].u, s.speed_step);
        let stepped_k = stepping(&trends[analysis].k, s.density_step);
        let aligned_u = stepping(&trends[analysis].u, s.align_speed_step);

        Ok(SmoothedSeries {
            trends,
            analysis,
            long,
            stepped_u,
            stepped_k,
            aligned_u,
        })
    }

    fn trend(series: &TimeSeries, window_min: u32, config: &EstimationConfig) -> Result<Trend, ProcessingError> {
        let window = config.window_len(window_min);
        let frac = config.smoothing.min_valid_fraction;
        Ok(Trend {
            window_min,
            u: smooth(series.u(), window, frac)?,
            k: smooth(series.k(), window, frac)?,
            q: smooth(series.q(), window, frac)?,
        })
    }
}

fn trend_position(trends: &[Trend], window_min: u32) -> Result<usize, ProcessingError> {
    trends
        .iter()
        .position(|t| t.window_min == window_min)
        .ok_or(ProcessingError::MissingTrend(window_min))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{is_valid, MISSING};

    fn ramp_series() -> TimeSeries {
        let u: Vec<f64> = (0..400).map(|i| 40.0 + f64::from(i % 50) * 0.2).collect();
        let k: Vec<f64> = vec![20.0; 400];
        TimeSeries::from_speed_density(u, k).expect("aligned")
    }

    #[test]
    fn test_all_windows_present_and_aligned() {
        let config = EstimationConfig::default();
        let s = SignalPreprocessor::run(&ramp_series(), &config).expect("enough data");
        for w in STANDARD_WINDOWS_MIN {
            let t = s.at(w).expect("standard window");
            assert_eq!(t.u.len(), 400);
            assert_eq!(t.k.len(), 400);
            assert_eq!(t.q.len(), 400);
        }
        assert_eq!(s.analysis().window_min, config.smoothing.analysis_window_min);
        assert_eq!(s.long().window_min, config.smoothing.trend_window_min);
        assert_eq!(s.stepped_u.len(), 400);
    }

    #[test]
    fn test_missing_propagates_to_every_series() {
        let mut u: Vec<f64> = vec![55.0; 300];
        u[77] = MISSING;
        let series = TimeSeries::from_speed_density(u, vec![20.0; 300]).expect("aligned");
        let s = SignalPreprocessor::run(&series, &EstimationConfig::default()).expect("enough data");
        for w in STANDARD_WINDOWS_MIN {
            assert!(!is_valid(s.at(w).expect("window").u[77]));
        }
        assert!(!is_valid(s.stepped_u[77]));
        assert!(!is_valid(s.aligned_u[77]));
    }

    #[test]
    fn test_missing_trend_is_reported_by_window() {
        let trends: Vec<Trend> = [30, 60]
            .into_iter()
            .map(|w| Trend { window_min: w, u: vec![], k: vec![], q: vec![] })
            .collect();
        assert_eq!(trend_position(&trends, 60), Ok(1));
        assert_eq!(trend_position(&trends, 45), Err(ProcessingError::MissingTrend(45)));
    }

    #[test]
    fn test_custom_windows_are_resolved() {
        let mut config = EstimationConfig::default();
        config.smoothing.analysis_window_min = 45;
        config.smoothing.trend_window_min = 90;
        let s = SignalPreprocessor::run(&ramp_series(), &config).expect("enough data");
        assert_eq!(s.analysis().window_min, 45);
        assert_eq!(s.long().window_min, 90);
        assert_eq!(s.at(30).map(|t| t.window_min), Some(30));
    }

    #[test]
    fn test_too_few_valid_samples() {
        let series = TimeSeries::from_speed_density(vec![MISSING; 200], vec![20.0; 200]).expect("aligned");
        assert!(matches!(
            SignalPreprocessor::run(&series, &EstimationConfig::default()),
            Err(ProcessingError::InsufficientData { .. })
        ));
    }
}
