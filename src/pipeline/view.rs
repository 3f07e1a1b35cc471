//! Read-only bundle of everything the searches read for one station

use crate::baseline::RatioSeries;
use crate::config::EstimationConfig;
use crate::processing::SmoothedSeries;
use crate::types::{SnowEvent, TimeSeries};

/// Borrowed inputs of the recovery search and phase detector.
#[derive(Debug, Clone, Copy)]
pub struct StationView<'a> {
    pub series: &'a TimeSeries,
    pub smoothed: &'a SmoothedSeries,
    pub ratios: &'a RatioSeries,
    pub event: &'a SnowEvent,
    pub ffs: f64,
    /// Upper density bound of uncongested operation
    pub kt: f64,
    pub speed_limit: f64,
    pub config: &'a EstimationConfig,
}

impl<'a> StationView<'a> {
    pub fn len(&self) -> usize {
        self.smoothed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.smoothed.is_empty()
    }

    /// Analysis-window speed.
    pub fn sus(&self) -> &'a [f64] {
        &self.smoothed.analysis().u
    }

    /// Analysis-window density.
    pub fn sks(&self) -> &'a [f64] {
        &self.smoothed.analysis().k
    }

    /// Samples in `minutes`.
    pub fn iv(&self, minutes: u32) -> usize {
        self.config.intervals(minutes)
    }

    pub fn snow_start(&self) -> usize {
        self.event.snow_start_index().min(self.len().saturating_sub(1))
    }

    pub fn snow_end(&self) -> usize {
        self.event.snow_end_index().min(self.len().saturating_sub(1))
    }
}
