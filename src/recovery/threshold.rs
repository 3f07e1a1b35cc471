//! Recovery speed threshold
//!
//! ```text
//! rth = 0.70, 0.75, ... (capped at rth_max)
//! uth = FFS * rth
//! stop at the first uth above the minimum speed of the snow window
//! ```

use serde::Serialize;

use crate::config::ThresholdConfig;
use crate::processing::stats;
use crate::types::EstimationFailure;

/// The converged threshold of one station.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpeedThreshold {
    pub uth: f64,
    pub rth: f64,
    /// Ladder steps taken, starting at 1
    pub iterations: usize,
}

impl SpeedThreshold {
    /// Climb the rth ladder until `ffs * rth` exceeds the minimum of
    /// `snow_speeds`.
    ///
    /// Fails with `NoThreshold` when the ladder tops out first, and with
    /// `InsufficientData` when the snow window holds no valid speed.
    pub fn find(ffs: f64, snow_speeds: &[f64], config: &ThresholdConfig) -> Result<Self, EstimationFailure> {
        let minu = stats::valid_min(snow_speeds).ok_or(EstimationFailure::InsufficientData)?;
        let steps = Self::ladder_len(config);
        for i in 0..steps {
            let rth = (config.rth_start + i as f64 * config.rth_step).min(config.rth_max);
            let uth = ffs * rth;
            if uth > minu {
                return Ok(Self {
                    uth,
                    rth,
                    iterations: i + 1,
                });
            }
        }
        Err(EstimationFailure::NoThreshold)
    }

    /// Number of rungs between `rth_start` and `rth_max`, both included.
    fn ladder_len(config: &ThresholdConfig) -> usize {
        if config.rth_step <= 0.0 || config.rth_max < config.rth_start {
            return 1;
        }
        // Tolerance keeps 0.70 + 6 * 0.05 on the ladder
        let span = (config.rth_max - config.rth_start) / config.rth_step + 1e-9;
        span.floor() as usize + 1
    }
}
