//! Hill segmentation of a smoothed U-K trajectory
//!
//! A boundary is placed wherever the density trend or the speed trend
//! reverses between two successive sample pairs. After a boundary the scan
//! skips one sample so that a single noisy sample cannot open two hills.
//! Consecutive hills share no sample and together cover the whole series.

use serde::Serialize;

use super::{value_on_line, Segment, UkPoint};
use crate::types::is_valid;

/// Direction of a hill's speed or density.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Increase,
    Decrease,
}

impl Trend {
    fn between(a: f64, b: f64) -> Self {
        if a < b {
            Trend::Increase
        } else {
            Trend::Decrease
        }
    }
}

/// A maximal interval `[sidx, eidx]` of one trend pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hill {
    /// Position in the hill sequence
    pub idx: usize,
    pub sidx: usize,
    /// Inclusive
    pub eidx: usize,
    k: Vec<f64>,
    u: Vec<f64>,
}

impl Hill {
    fn new(idx: usize, sidx: usize, eidx: usize, k: &[f64], u: &[f64]) -> Self {
        Self {
            idx,
            sidx,
            eidx,
            k: k[sidx..=eidx].to_vec(),
            u: u[sidx..=eidx].to_vec(),
        }
    }

    pub fn ks(&self) -> &[f64] {
        &self.k
    }

    pub fn us(&self) -> &[f64] {
        &self.u
    }

    pub fn len(&self) -> usize {
        self.u.len()
    }

    pub fn is_empty(&self) -> bool {
        self.u.is_empty()
    }

    pub fn trend_u(&self) -> Trend {
        Trend::between(self.u[0], self.u[self.u.len() - 1])
    }

    pub fn trend_k(&self) -> Trend {
        Trend::between(self.k[0], self.k[self.k.len() - 1])
    }

    pub fn k_range(&self) -> (f64, f64) {
        min_max(&self.k)
    }

    pub fn u_range(&self) -> (f64, f64) {
        min_max(&self.u)
    }

    /// Speed lost from the first to the last sample.
    pub fn speed_drop(&self) -> f64 {
        self.u[0] - self.u[self.u.len() - 1]
    }

    /// Density gained from the first to the last sample.
    pub fn density_rise(&self) -> f64 {
        self.k[self.k.len() - 1] - self.k[0]
    }

    /// A hill too small in both density and speed to carry a trend.
    pub fn is_little_hill(&self, kth: f64, uth: f64) -> bool {
        let (mink, maxk) = self.k_range();
        let (minu, maxu) = self.u_range();
        maxk - mink < kth && maxu - minu < uth
    }

    /// Least-squares slope of speed over density.
    fn fitted_slope(&self) -> Option<f64> {
        let n = self.k.len() as f64;
        if self.k.len() < 2 {
            return None;
        }
        let mk = self.k.iter().sum::<f64>() / n;
        let mu = self.u.iter().sum::<f64>() / n;
        let (mut sxy, mut sxx) = (0.0, 0.0);
        for (k, u) in self.k.iter().zip(&self.u) {
            sxy += (k - mk) * (u - mu);
            sxx += (k - mk) * (k - mk);
        }
        (sxx > f64::EPSILON).then(|| sxy / sxx)
    }
}

impl Segment for Hill {
    fn minmax(&self) -> ((f64, f64), (f64, f64)) {
        (self.k_range(), self.u_range())
    }

    fn u_at_k(&self, k: f64) -> Option<f64> {
        self.k
            .windows(2)
            .zip(self.u.windows(2))
            .find_map(|(kw, uw)| value_on_line(k, kw[0], uw[0], kw[1], uw[1]))
    }

    fn k_at_u(&self, u: f64) -> Option<f64> {
        self.u
            .windows(2)
            .zip(self.k.windows(2))
            .find_map(|(uw, kw)| value_on_line(u, uw[0], kw[0], uw[1], kw[1]))
    }

    fn endpoints(&self) -> (UkPoint, UkPoint) {
        let last = self.u.len() - 1;
        (
            UkPoint { k: self.k[0], u: self.u[0] },
            UkPoint { k: self.k[last], u: self.u[last] },
        )
    }

    fn slope(&self) -> Option<f64> {
        self.fitted_slope()
    }
}

fn min_max(data: &[f64]) -> (f64, f64) {
    data.iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
}

/// Builds and edits hill sequences.
pub struct HillSegmenter;

impl HillSegmenter {
    /// Split the trajectory `(k, u)` into hills.
    ///
    /// Missing samples carry the last valid value forward (leading gaps take
    /// the first valid value), so a gap never opens a boundary of its own.
    /// Returns an empty sequence when nothing is valid.
    pub fn segment(k: &[f64], u: &[f64]) -> Vec<Hill> {
        let n = k.len().min(u.len());
        let (Some(k), Some(u)) = (fill_missing(&k[..n]), fill_missing(&u[..n])) else {
            return Vec::new();
        };

        let mut locs = vec![0usize];
        let mut idx = 1;
        while idx + 1 < n {
            let pk = Trend::between(k[idx - 1], k[idx]);
            let pu = Trend::between(u[idx - 1], u[idx]);
            let nk = Trend::between(k[idx], k[idx + 1]);
            let nu = Trend::between(u[idx], u[idx + 1]);
            if pk != nk || pu != nu {
                locs.push(idx);
                idx += 2;
            } else {
                idx += 1;
            }
        }

        let mut hills: Vec<Hill> = locs
            .windows(2)
            .enumerate()
            .map(|(i, w)| Hill::new(i, w[0], w[1] - 1, &k, &u))
            .collect();
        let last = locs[locs.len() - 1];
        hills.push(Hill::new(hills.len(), last, n - 1, &k, &u));
        hills
    }

    /// Extend `hills[target]` over neighbors with the same speed trend or
    /// that are little hills, then trim little hills off both ends again.
    ///
    /// Returns the positions of the first and last hill of the extent.
    pub fn extend(hills: &[Hill], target: usize, little_k: f64, little_u: f64) -> (usize, usize) {
        let Some(th) = hills.get(target) else {
            return (target, target);
        };
        let trend = th.trend_u();
        let little = |h: &Hill| h.is_little_hill(little_k, little_u);

        let mut start = target;
        for h in hills[..target].iter().rev() {
            if h.trend_u() == trend || little(h) {
                start = h.idx;
            } else {
                break;
            }
        }
        // Trim leading little hills, never past the target
        if let Some(h) = hills[start..].iter().find(|h| !little(h)) {
            if h.idx > target {
                start = h.idx;
            }
        }

        let mut end = target;
        for h in &hills[target + 1..] {
            if h.trend_u() == trend || little(h) {
                end = h.idx;
            } else {
                break;
            }
        }
        if let Some(h) = hills[..=end].iter().rev().find(|h| !little(h)) {
            if h.idx > target {
                end = h.idx;
            }
        }

        if start > end {
            return (target, target);
        }
        (start, end)
    }

    /// One hill spanning `hills[first..=last]`.
    pub fn merge(hills: &[Hill], first: usize, last: usize) -> Option<Hill> {
        let run = hills.get(first..=last)?;
        let head = run.first()?;
        let tail = run.last()?;
        Some(Hill {
            idx: head.idx,
            sidx: head.sidx,
            eidx: tail.eidx,
            k: run.iter().flat_map(|h| h.k.iter().copied()).collect(),
            u: run.iter().flat_map(|h| h.u.iter().copied()).collect(),
        })
    }
}

fn fill_missing(data: &[f64]) -> Option<Vec<f64>> {
    let first = data.iter().copied().find(|v| is_valid(*v))?;
    let mut last = first;
    Some(
        data.iter()
            .map(|&v| {
                if is_valid(v) {
                    last = v;
                }
                last
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MISSING;

    /// Speed falls then recovers while density rises then falls.
    fn v_shape() -> (Vec<f64>, Vec<f64>) {
        let mut u = Vec::new();
        let mut k = Vec::new();
        for i in 0..20 {
            u.push(60.0 - f64::from(i) * 2.0);
            k.push(20.0 + f64::from(i));
        }
        for i in 0..20 {
            u.push(22.0 + f64::from(i) * 2.0);
            k.push(39.0 - f64::from(i));
        }
        (k, u)
    }

    #[test]
    fn test_hills_partition_series() {
        let (k, u) = v_shape();
        let hills = HillSegmenter::segment(&k, &u);
        assert!(hills.len() >= 2);
        assert_eq!(hills[0].sidx, 0);
        assert_eq!(hills[hills.len() - 1].eidx, u.len() - 1);
        for w in hills.windows(2) {
            assert_eq!(w[0].eidx + 1, w[1].sidx);
        }
        let covered: usize = hills.iter().map(Hill::len).sum();
        assert_eq!(covered, u.len());
    }

    #[test]
    fn test_reversal_splits_trend() {
        let (k, u) = v_shape();
        let hills = HillSegmenter::segment(&k, &u);
        assert_eq!(hills[0].trend_u(), Trend::Decrease);
        assert_eq!(hills[0].trend_k(), Trend::Increase);
        assert_eq!(hills[hills.len() - 1].trend_u(), Trend::Increase);
    }

    #[test]
    fn test_speed_reversal_alone_opens_boundary() {
        // Density keeps rising through the speed minimum at 10
        let u: Vec<f64> = (0..21_i32).map(|i| 50.0 + f64::from((10 - i).abs())).collect();
        let k: Vec<f64> = (0..21).map(|i| 10.0 + f64::from(i)).collect();
        let hills = HillSegmenter::segment(&k, &u);
        assert_eq!(hills.len(), 2);
        assert_eq!((hills[0].eidx, hills[1].sidx), (9, 10));
        assert!(hills.iter().all(|h| h.trend_k() == Trend::Increase));
    }

    #[test]
    fn test_constant_series_is_one_hill() {
        let hills = HillSegmenter::segment(&[20.0; 30], &[60.0; 30]);
        assert_eq!(hills.len(), 1);
        assert_eq!((hills[0].sidx, hills[0].eidx), (0, 29));
    }

    #[test]
    fn test_missing_does_not_open_boundary() {
        let mut u: Vec<f64> = (0..30).map(|i| 60.0 - f64::from(i)).collect();
        let k: Vec<f64> = (0..30).map(|i| 10.0 + f64::from(i)).collect();
        u[12] = MISSING;
        let hills = HillSegmenter::segment(&k, &u);
        // The carried value makes one flat step; still a single falling run
        assert!(hills.iter().all(|h| h.trend_u() == Trend::Decrease));
    }

    #[test]
    fn test_u_at_k_interpolates_within_range() {
        let (k, u) = v_shape();
        let hills = HillSegmenter::segment(&k, &u);
        let h = &hills[0];
        let v = h.u_at_k(25.5).expect("inside range");
        assert!((v - 49.0).abs() < 1e-9);
        assert_eq!(h.u_at_k(5.0), None);
        let kk = h.k_at_u(50.0).expect("inside range");
        assert!((kk - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_extend_over_same_trend_and_merge() {
        let k: Vec<f64> = (0..40).map(|i| 20.0 + f64::from(i % 7) * 0.1).collect();
        let mut u: Vec<f64> = (0..40).map(|i| 60.0 - f64::from(i) * 0.8).collect();
        // A small wiggle in the middle of a long decrease
        u[20] = u[19] + 0.2;
        let hills = HillSegmenter::segment(&k, &u);
        let (s, e) = HillSegmenter::extend(&hills, 0, 1.0, 1.0);
        assert_eq!(s, 0);
        let merged = HillSegmenter::merge(&hills, s, e).expect("valid range");
        assert_eq!(merged.sidx, 0);
        assert!(merged.speed_drop() > 20.0);
    }

    #[test]
    fn test_slope_of_straight_hill() {
        let k: Vec<f64> = (0..10).map(f64::from).collect();
        let u: Vec<f64> = k.iter().map(|k| 60.0 - 2.0 * k).collect();
        let hills = HillSegmenter::segment(&k, &u);
        let slope = hills[0].slope().expect("non-vertical");
        assert!((slope + 2.0).abs() < 1e-9);
    }
}
