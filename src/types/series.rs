//! Aligned per-interval detector samples

use serde::{Deserialize, Serialize};

use super::EstimationError;
use crate::config::defaults::MISSING_VALUE;

/// Sentinel stored in place of a missing sample.
pub const MISSING: f64 = MISSING_VALUE;

/// True when `v` holds a usable measurement.
///
/// Negative values are the sentinel; NaN and infinities are treated the same
/// way so that nothing non-finite reaches a statistic.
#[inline]
pub fn is_valid(v: f64) -> bool {
    v.is_finite() && v >= 0.0
}

/// Speed `u`, density `k` and flow `q` for one station and event.
///
/// All three sequences share one index: sample `i` of each was taken in the
/// same interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSeries")]
pub struct TimeSeries {
    u: Vec<f64>,
    k: Vec<f64>,
    q: Vec<f64>,
}

#[derive(Deserialize)]
struct RawSeries {
    u: Vec<f64>,
    k: Vec<f64>,
    #[serde(default)]
    q: Option<Vec<f64>>,
}

impl TryFrom<RawSeries> for TimeSeries {
    type Error = EstimationError;

    fn try_from(raw: RawSeries) -> Result<Self, Self::Error> {
        match raw.q {
            Some(q) => Self::new(raw.u, raw.k, q),
            None => Self::from_speed_density(raw.u, raw.k),
        }
    }
}

impl TimeSeries {
    /// Build a series, rejecting mismatched or empty sequences.
    pub fn new(u: Vec<f64>, k: Vec<f64>, q: Vec<f64>) -> Result<Self, EstimationError> {
        if u.len() != k.len() || u.len() != q.len() {
            return Err(EstimationError::LengthMismatch {
                u: u.len(),
                k: k.len(),
                q: q.len(),
            });
        }
        if u.is_empty() {
            return Err(EstimationError::EmptySeries);
        }
        Ok(Self { u, k, q })
    }

    /// Build a series deriving flow as `u * k`.
    pub fn from_speed_density(u: Vec<f64>, k: Vec<f64>) -> Result<Self, EstimationError> {
        let q = u
            .iter()
            .zip(&k)
            .map(|(&u, &k)| if is_valid(u) && is_valid(k) { u * k } else { MISSING })
            .collect();
        if u.len() != k.len() {
            return Err(EstimationError::LengthMismatch {
                u: u.len(),
                k: k.len(),
                q: u.len().min(k.len()),
            });
        }
        Self::new(u, k, q)
    }

    pub fn len(&self) -> usize {
        self.u.len()
    }

    pub fn is_empty(&self) -> bool {
        self.u.is_empty()
    }

    pub fn u(&self) -> &[f64] {
        &self.u
    }

    pub fn k(&self) -> &[f64] {
        &self.k
    }

    pub fn q(&self) -> &[f64] {
        &self.q
    }

    /// Number of intervals where both speed and density are valid.
    pub fn valid_count(&self) -> usize {
        self.u
            .iter()
            .zip(&self.k)
            .filter(|&(&u, &k)| is_valid(u) && is_valid(k))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_mismatch_rejected() {
        let err = TimeSeries::new(vec![1.0; 3], vec![1.0; 2], vec![1.0; 3]).expect_err("mismatch");
        assert_eq!(err, EstimationError::LengthMismatch { u: 3, k: 2, q: 3 });
    }

    #[test]
    fn test_empty_rejected() {
        assert_eq!(
            TimeSeries::new(vec![], vec![], vec![]).expect_err("empty"),
            EstimationError::EmptySeries
        );
    }

    #[test]
    fn test_flow_derived_and_missing_propagates() {
        let s = TimeSeries::from_speed_density(vec![50.0, MISSING, 40.0], vec![20.0, 10.0, MISSING])
            .expect("aligned");
        assert!((s.q()[0] - 1000.0).abs() < 1e-9);
        assert!(!is_valid(s.q()[1]));
        assert!(!is_valid(s.q()[2]));
        assert_eq!(s.valid_count(), 1);
    }

    #[test]
    fn test_nan_is_not_valid() {
        assert!(!is_valid(f64::NAN));
        assert!(!is_valid(-0.5));
        assert!(is_valid(0.0));
    }

    #[test]
    fn test_deserialize_checks_lengths() {
        let bad: Result<TimeSeries, _> = serde_json::from_str(r#"{"u":[1.0,2.0],"k":[1.0]}"#);
        assert!(bad.is_err());
        let ok: TimeSeries =
            serde_json::from_str(r#"{"u":[60.0,58.0],"k":[20.0,21.0]}"#).expect("valid series");
        assert_eq!(ok.len(), 2);
    }
}
