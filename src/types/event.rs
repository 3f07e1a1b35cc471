//! Snow event window and the time base of a station series

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::EstimationError;

/// One reported snow event.
///
/// Index 0 of every series in the event's section corresponds to
/// `data_start`; index `i` to `data_start + i * interval`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSnowEvent")]
pub struct SnowEvent {
    data_start: NaiveDateTime,
    snow_start: NaiveDateTime,
    snow_end: NaiveDateTime,
    interval_secs: u32,
}

#[derive(Deserialize)]
struct RawSnowEvent {
    data_start: NaiveDateTime,
    snow_start: NaiveDateTime,
    snow_end: NaiveDateTime,
    interval_secs: u32,
}

impl TryFrom<RawSnowEvent> for SnowEvent {
    type Error = EstimationError;

    fn try_from(raw: RawSnowEvent) -> Result<Self, Self::Error> {
        Self::new(raw.data_start, raw.snow_start, raw.snow_end, raw.interval_secs)
    }
}

impl SnowEvent {
    pub fn new(
        data_start: NaiveDateTime,
        snow_start: NaiveDateTime,
        snow_end: NaiveDateTime,
        interval_secs: u32,
    ) -> Result<Self, EstimationError> {
        if interval_secs == 0 {
            return Err(EstimationError::InvalidInterval(interval_secs));
        }
        if snow_start < data_start {
            return Err(EstimationError::EventOrder(format!(
                "snow start {snow_start} precedes data start {data_start}"
            )));
        }
        if snow_end <= snow_start {
            return Err(EstimationError::EventOrder(format!(
                "snow end {snow_end} is not after snow start {snow_start}"
            )));
        }
        Ok(Self {
            data_start,
            snow_start,
            snow_end,
            interval_secs,
        })
    }

    /// Build an event from sample indices instead of timestamps.
    pub fn from_indices(
        data_start: NaiveDateTime,
        start_index: usize,
        end_index: usize,
        interval_secs: u32,
    ) -> Result<Self, EstimationError> {
        let at = |idx: usize| -> Result<NaiveDateTime, EstimationError> {
            let secs = i64::try_from(idx)
                .ok()
                .and_then(|i| i.checked_mul(i64::from(interval_secs)))
                .ok_or_else(|| EstimationError::EventOrder(format!("index {idx} overflows")))?;
            Ok(data_start + Duration::seconds(secs))
        };
        Self::new(data_start, at(start_index)?, at(end_index)?, interval_secs)
    }

    pub fn data_start(&self) -> NaiveDateTime {
        self.data_start
    }

    pub fn snow_start(&self) -> NaiveDateTime {
        self.snow_start
    }

    pub fn snow_end(&self) -> NaiveDateTime {
        self.snow_end
    }

    pub fn interval_secs(&self) -> u32 {
        self.interval_secs
    }

    pub fn snow_start_index(&self) -> usize {
        self.index_floor(self.snow_start)
    }

    pub fn snow_end_index(&self) -> usize {
        self.index_floor(self.snow_end)
    }

    /// Timestamp of sample `idx`.
    pub fn time_at(&self, idx: usize) -> NaiveDateTime {
        let secs = i64::try_from(idx)
            .unwrap_or(i64::MAX)
            .saturating_mul(i64::from(self.interval_secs));
        self.data_start + Duration::seconds(secs)
    }

    /// Index of the sample covering `t`, or `None` before the data starts.
    pub fn index_of(&self, t: NaiveDateTime) -> Option<usize> {
        (t >= self.data_start).then(|| self.index_floor(t))
    }

    /// Check that the snow window fits a series of `len` samples.
    pub fn check_fits(&self, len: usize) -> Result<(), EstimationError> {
        let (start, end) = (self.snow_start_index(), self.snow_end_index());
        if end >= len {
            return Err(EstimationError::EventOutOfRange { start, end, len });
        }
        Ok(())
    }

    fn index_floor(&self, t: NaiveDateTime) -> usize {
        let secs = (t - self.data_start).num_seconds().max(0);
        usize::try_from(secs / i64::from(self.interval_secs)).unwrap_or(usize::MAX)
    }
}
