//! U-K Trajectory Segmentation
//!
//! Decomposes a smoothed speed-density trajectory into pieces that the
//! recovery search can reason about geometrically.
//!
//! ## Architecture
//!
//! - [`hill`]: monotone "hills" bounded by coinciding speed/density trend
//!   reversals; used for snow-reduction change points
//! - [`trajectory`]: centroids of short sample runs (points), the edges
//!   between consecutive points, and groups of same-trend edges; used for
//!   partial-recovery rejection
//! - [`relation`]: the closed set of pairwise relations over any [`Segment`]
//!
//! Everything here is a derived, read-only view over an already smoothed
//! series.

pub mod hill;
pub mod relation;
pub mod trajectory;

pub use hill::{Hill, HillSegmenter, Trend};
pub use relation::Relation;
pub use trajectory::{Edge, Group, TrajectoryBuilder, TrajectoryPoint};

/// A `(k, u)` pair on the speed-density plane.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct UkPoint {
    pub k: f64,
    pub u: f64,
}

impl UkPoint {
    pub fn distance(&self, other: &UkPoint) -> f64 {
        (self.k - other.k).hypot(self.u - other.u)
    }
}

/// Common geometry of hills, edges and groups.
pub trait Segment {
    /// `((min_k, max_k), (min_u, max_u))`
    fn minmax(&self) -> ((f64, f64), (f64, f64));

    /// Speed on the segment at density `k`, `None` outside its density range.
    fn u_at_k(&self, k: f64) -> Option<f64>;

    /// Density on the segment at speed `u`, `None` outside its speed range.
    fn k_at_u(&self, u: f64) -> Option<f64>;

    /// First and last point of the segment in time order.
    fn endpoints(&self) -> (UkPoint, UkPoint);

    /// True when speed ends higher than it started.
    fn is_recovery(&self) -> bool {
        let (s, e) = self.endpoints();
        s.u < e.u
    }

    /// True when any part of the segment lies in the nighttime window.
    fn in_nighttime(&self) -> bool {
        false
    }

    /// Speed change per unit density between the endpoints.
    ///
    /// `None` for a vertical segment (no density change).
    fn slope(&self) -> Option<f64> {
        let (s, e) = self.endpoints();
        let dk = e.k - s.k;
        (dk.abs() > f64::EPSILON).then(|| (e.u - s.u) / dk)
    }
}

/// Linear interpolation of `y` at `x` between `(x0, y0)` and `(x1, y1)`,
/// `None` when `x` lies outside the pair.
pub(crate) fn value_on_line(x: f64, x0: f64, y0: f64, x1: f64, y1: f64) -> Option<f64> {
    let (lo, hi) = if x0 <= x1 { (x0, x1) } else { (x1, x0) };
    if x < lo || x > hi {
        return None;
    }
    if (x1 - x0).abs() < f64::EPSILON {
        // Degenerate pair: both ends answer equally
        return Some((y0 + y1) / 2.0);
    }
    Some(y0 + (y1 - y0) * (x - x0) / (x1 - x0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_on_line() {
        assert_eq!(value_on_line(5.0, 0.0, 10.0, 10.0, 20.0), Some(15.0));
        assert_eq!(value_on_line(5.0, 10.0, 20.0, 0.0, 10.0), Some(15.0));
        assert_eq!(value_on_line(11.0, 0.0, 10.0, 10.0, 20.0), None);
    }

    #[test]
    fn test_vertical_pair_has_no_division_by_zero() {
        assert_eq!(value_on_line(3.0, 3.0, 40.0, 3.0, 50.0), Some(45.0));
    }
}
