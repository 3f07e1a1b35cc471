//! Pairwise relations between segments
//!
//! The set is closed: every geometric question the recovery search asks
//! about two pieces of a trajectory is one of the [`Relation`] variants.

use serde::Serialize;

use super::Segment;
use crate::config::SegmentConfig;

/// A relation of `cur` to the earlier segment `prev`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    /// `prev` runs above `cur` over their common density range
    Over,
    /// The fitted lines of both segments differ by less than the parallel angle
    Parallel,
    /// `cur` is a steep speed rise
    VerticalUp,
    /// `cur` is a steep speed drop
    VerticalDown,
    /// `cur` is a reduction that falls below the recovery `prev`
    UnderRecovery,
}

impl Relation {
    pub fn holds<P, C>(self, prev: &P, cur: &C, config: &SegmentConfig) -> bool
    where
        P: Segment + ?Sized,
        C: Segment + ?Sized,
    {
        match self {
            Relation::Over => is_over(prev, cur),
            Relation::Parallel => is_parallel(prev, cur, config.parallel_degree),
            Relation::VerticalUp => is_vertical(cur, true, config),
            Relation::VerticalDown => is_vertical(cur, false, config),
            Relation::UnderRecovery => is_under_recovery(prev, cur, config.same_k_limit),
        }
    }
}

/// Density ranges overlap by at least one unit.
pub fn is_overlapped<A: Segment + ?Sized, B: Segment + ?Sized>(a: &A, b: &B) -> bool {
    let ((mink1, maxk1), _) = a.minmax();
    let ((mink2, maxk2), _) = b.minmax();
    !(maxk1 < mink2 + 1.0 || mink1 > maxk2 - 1.0)
}

/// Common `((min_k, max_k), (min_u, max_u))` box of two segments.
pub fn overlapped_area<A: Segment + ?Sized, B: Segment + ?Sized>(a: &A, b: &B) -> Option<((f64, f64), (f64, f64))> {
    if !is_overlapped(a, b) {
        return None;
    }
    let ((mink1, maxk1), (minu1, maxu1)) = a.minmax();
    let ((mink2, maxk2), (minu2, maxu2)) = b.minmax();
    Some(((mink1.max(mink2), maxk1.min(maxk2)), (minu1.max(minu2), maxu1.min(maxu2))))
}

/// Speed differences `a - b` sampled over the overlapped density range.
pub fn u_diffs<A: Segment + ?Sized, B: Segment + ?Sized>(a: &A, b: &B) -> Vec<f64> {
    let Some(((mink, maxk), _)) = overlapped_area(a, b) else {
        return Vec::new();
    };
    let step = (0.5_f64).min((maxk - mink) / 5.0);
    if step <= 0.0 {
        return Vec::new();
    }
    let mut diffs = Vec::new();
    let mut k = mink;
    while k < maxk {
        if let (Some(u1), Some(u2)) = (a.u_at_k(k), b.u_at_k(k)) {
            diffs.push(u1 - u2);
        }
        k += step;
    }
    diffs
}

/// `a` lies above `b` on average over their common density range.
pub fn is_over<A: Segment + ?Sized, B: Segment + ?Sized>(a: &A, b: &B) -> bool {
    let diffs = u_diffs(a, b);
    !diffs.is_empty() && diffs.iter().sum::<f64>() / diffs.len() as f64 > 0.0
}

/// Angle between the two fitted lines is below `degree_limit`.
pub fn is_parallel<A: Segment + ?Sized, B: Segment + ?Sized>(a: &A, b: &B, degree_limit: f64) -> bool {
    match (a.slope(), b.slope()) {
        (Some(s1), Some(s2)) => {
            let denom = 1.0 + s1 * s2;
            if denom.abs() < f64::EPSILON {
                return false;
            }
            ((s1 - s2) / denom).atan().to_degrees().abs() < degree_limit
        }
        (None, None) => true,
        _ => false,
    }
}

/// Every speed level shared by both segments maps to densities within
/// `limit` of each other.
pub fn has_near_ks<A: Segment + ?Sized, B: Segment + ?Sized>(a: &A, b: &B, limit: f64) -> bool {
    let (a0, a1) = a.endpoints();
    let (b0, b1) = b.endpoints();
    let maxu = a0.u.max(a1.u).max(b0.u).max(b1.u);
    let minu = a0.u.min(a1.u).min(b0.u).min(b1.u);
    let mut u = maxu;
    while u > minu {
        if let (Some(pk), Some(nk)) = (a.k_at_u(u), b.k_at_u(u)) {
            if (pk - nk).abs() > limit {
                return false;
            }
        }
        u -= 0.5;
    }
    true
}

fn is_vertical<S: Segment + ?Sized>(seg: &S, up: bool, config: &SegmentConfig) -> bool {
    if seg.is_recovery() != up || seg.in_nighttime() {
        return false;
    }
    let steep = seg.slope().map_or(true, |s| s.abs() > config.vertical_slope);
    let (s, e) = seg.endpoints();
    let du = if up { e.u - s.u } else { s.u - e.u };
    steep && du > config.vertical_min_du
}

/// A reduction `cur` that ends below the recovery `prev`.
///
/// Compared at whichever end reaches the other's density range: when the
/// recovery starts at or above the reduction's final density the reduction
/// end is checked against the recovery line, otherwise the recovery start is
/// checked against the reduction line. Segments that share their densities
/// closely are the same branch seen twice and do not count.
pub fn is_under_recovery<P: Segment + ?Sized, C: Segment + ?Sized>(prev: &P, cur: &C, same_k_limit: f64) -> bool {
    if !prev.is_recovery() || cur.is_recovery() || prev.in_nighttime() || cur.in_nighttime() {
        return false;
    }
    let (pp, _) = prev.endpoints();
    let (_, cp) = cur.endpoints();
    let found = if pp.k >= cp.k {
        prev.u_at_k(cp.k).is_some_and(|u| cp.u < u)
    } else {
        cur.u_at_k(pp.k).is_some_and(|u| pp.u > u)
    };
    found && !has_near_ks(prev, cur, same_k_limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{TrajectoryBuilder, UkPoint};

    /// Straight segment between two points for relation tests.
    struct Line(UkPoint, UkPoint);

    impl Segment for Line {
        fn minmax(&self) -> ((f64, f64), (f64, f64)) {
            let (a, b) = (self.0, self.1);
            ((a.k.min(b.k), a.k.max(b.k)), (a.u.min(b.u), a.u.max(b.u)))
        }
        fn u_at_k(&self, k: f64) -> Option<f64> {
            crate::segment::value_on_line(k, self.0.k, self.0.u, self.1.k, self.1.u)
        }
        fn k_at_u(&self, u: f64) -> Option<f64> {
            crate::segment::value_on_line(u, self.0.u, self.0.k, self.1.u, self.1.k)
        }
        fn endpoints(&self) -> (UkPoint, UkPoint) {
            (self.0, self.1)
        }
    }

    fn line(k0: f64, u0: f64, k1: f64, u1: f64) -> Line {
        Line(UkPoint { k: k0, u: u0 }, UkPoint { k: k1, u: u1 })
    }

    #[test]
    fn test_over_and_parallel() {
        let cfg = SegmentConfig::default();
        let high = line(10.0, 60.0, 30.0, 50.0);
        let low = line(10.0, 50.0, 30.0, 40.0);
        assert!(Relation::Over.holds(&high, &low, &cfg));
        assert!(!Relation::Over.holds(&low, &high, &cfg));
        assert!(Relation::Parallel.holds(&high, &low, &cfg));
        let steep = line(10.0, 60.0, 15.0, 20.0);
        assert!(!Relation::Parallel.holds(&high, &steep, &cfg));
    }

    #[test]
    fn test_disjoint_density_is_not_over() {
        let cfg = SegmentConfig::default();
        let a = line(10.0, 60.0, 15.0, 55.0);
        let b = line(30.0, 40.0, 40.0, 30.0);
        assert!(!is_overlapped(&a, &b));
        assert!(!Relation::Over.holds(&a, &b, &cfg));
    }

    #[test]
    fn test_vertical_down_and_up() {
        let cfg = SegmentConfig::default();
        let any = line(0.0, 0.0, 1.0, 1.0);
        let drop = line(20.0, 60.0, 22.0, 40.0);
        assert!(Relation::VerticalDown.holds(&any, &drop, &cfg));
        assert!(!Relation::VerticalUp.holds(&any, &drop, &cfg));
        let rise = line(22.0, 40.0, 22.0, 60.0);
        assert!(Relation::VerticalUp.holds(&any, &rise, &cfg));
        let shallow = line(20.0, 60.0, 40.0, 50.0);
        assert!(!Relation::VerticalDown.holds(&any, &shallow, &cfg));
    }

    #[test]
    fn test_under_recovery() {
        let cfg = SegmentConfig::default();
        // Recovery along the high branch, then a reduction far below it
        let recovery = line(40.0, 30.0, 20.0, 55.0);
        let reduction = line(20.0, 40.0, 45.0, 15.0);
        assert!(Relation::UnderRecovery.holds(&recovery, &reduction, &cfg));
        // Retracing the same branch is not a fall below it
        let retrace = line(20.0, 55.0, 40.0, 30.0);
        assert!(!Relation::UnderRecovery.holds(&recovery, &retrace, &cfg));
    }

    #[test]
    fn test_night_suppresses_vertical() {
        let cfg = SegmentConfig::default();
        let k: Vec<f64> = (0..40).map(|i| 20.0 + f64::from(i) * 0.05).collect();
        let u: Vec<f64> = (0..40).map(|i| 60.0 - f64::from(i)).collect();
        let day = TrajectoryBuilder::build(&k, &u, 0..40, |_| false, &cfg);
        let night = TrajectoryBuilder::build(&k, &u, 0..40, |_| true, &cfg);
        assert!(Relation::VerticalDown.holds(&day.groups[0], &day.groups[0], &cfg));
        assert!(!Relation::VerticalDown.holds(&night.groups[0], &night.groups[0], &cfg));
    }
}
