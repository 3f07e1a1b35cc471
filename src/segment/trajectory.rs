//! Trajectory points, edges and groups
//!
//! ```text
//! samples ──(tracking distance)──► points ──(consecutive pairs)──► edges
//!                                                      │
//!                                   (same speed trend) ▼
//!                                                   groups
//! ```

use serde::Serialize;

use super::{value_on_line, Segment, UkPoint};
use crate::config::SegmentConfig;
use crate::types::is_valid;

/// Centroid of a short run of samples that stayed close together.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TrajectoryPoint {
    pub idx: usize,
    pub sidx: usize,
    /// Inclusive
    pub eidx: usize,
    pub center: UkPoint,
    pub samples: usize,
    pub in_nighttime: bool,
}

/// Two consecutive points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Edge {
    pub idx: usize,
    pub start: TrajectoryPoint,
    pub end: TrajectoryPoint,
}

impl Edge {
    pub fn is_k_increase(&self) -> bool {
        self.start.center.k < self.end.center.k
    }

    /// Speed change from start to end.
    pub fn du(&self) -> f64 {
        self.end.center.u - self.start.center.u
    }
}

impl Segment for Edge {
    fn minmax(&self) -> ((f64, f64), (f64, f64)) {
        let (a, b) = (self.start.center, self.end.center);
        ((a.k.min(b.k), a.k.max(b.k)), (a.u.min(b.u), a.u.max(b.u)))
    }

    fn u_at_k(&self, k: f64) -> Option<f64> {
        let (a, b) = (self.start.center, self.end.center);
        value_on_line(k, a.k, a.u, b.k, b.u)
    }

    fn k_at_u(&self, u: f64) -> Option<f64> {
        let (a, b) = (self.start.center, self.end.center);
        value_on_line(u, a.u, a.k, b.u, b.k)
    }

    fn endpoints(&self) -> (UkPoint, UkPoint) {
        (self.start.center, self.end.center)
    }

    fn in_nighttime(&self) -> bool {
        self.start.in_nighttime || self.end.in_nighttime
    }
}

/// An ordered run of edges sharing one speed trend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub idx: usize,
    edges: Vec<Edge>,
}

impl Group {
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// First sample index covered by the group.
    pub fn sidx(&self) -> usize {
        self.edges[0].start.sidx
    }

    /// Last sample index covered by the group.
    pub fn eidx(&self) -> usize {
        self.edges[self.edges.len() - 1].end.eidx
    }

    pub fn contains(&self, idx: usize) -> bool {
        self.sidx() <= idx && idx <= self.eidx()
    }

    pub fn points(&self) -> Vec<TrajectoryPoint> {
        let mut points: Vec<TrajectoryPoint> = self.edges.iter().map(|e| e.start).collect();
        points.push(self.edges[self.edges.len() - 1].end);
        points
    }
}

impl Segment for Group {
    fn minmax(&self) -> ((f64, f64), (f64, f64)) {
        self.edges.iter().map(Segment::minmax).fold(
            ((f64::INFINITY, f64::NEG_INFINITY), (f64::INFINITY, f64::NEG_INFINITY)),
            |((k0, k1), (u0, u1)), ((a0, a1), (b0, b1))| ((k0.min(a0), k1.max(a1)), (u0.min(b0), u1.max(b1))),
        )
    }

    /// Mean over the edges that cover `k`.
    fn u_at_k(&self, k: f64) -> Option<f64> {
        mean_some(self.edges.iter().map(|e| e.u_at_k(k)))
    }

    fn k_at_u(&self, u: f64) -> Option<f64> {
        mean_some(self.edges.iter().map(|e| e.k_at_u(u)))
    }

    fn endpoints(&self) -> (UkPoint, UkPoint) {
        (self.edges[0].start.center, self.edges[self.edges.len() - 1].end.center)
    }

    fn in_nighttime(&self) -> bool {
        self.edges.iter().any(Segment::in_nighttime)
    }
}

fn mean_some(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let (sum, n) = values.flatten().fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

/// The full decomposition of one trajectory.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Trajectory {
    pub points: Vec<TrajectoryPoint>,
    pub edges: Vec<Edge>,
    pub groups: Vec<Group>,
}

impl Trajectory {
    /// Position of the group covering sample `idx`.
    pub fn group_at(&self, idx: usize) -> Option<usize> {
        self.groups.iter().position(|g| g.contains(idx))
    }
}

/// Builds a [`Trajectory`] from smoothed density and speed.
pub struct TrajectoryBuilder;

impl TrajectoryBuilder {
    /// Decompose samples `range` of `(k, u)`.
    ///
    /// `is_night(i)` tags points that cover a nighttime index. Missing
    /// samples are skipped.
    pub fn build(
        k: &[f64],
        u: &[f64],
        range: std::ops::Range<usize>,
        is_night: impl Fn(usize) -> bool,
        config: &SegmentConfig,
    ) -> Trajectory {
        let points = Self::aggregate(k, u, range, &is_night, config.tracking_distance);
        let edges: Vec<Edge> = points
            .windows(2)
            .enumerate()
            .map(|(idx, w)| Edge { idx, start: w[0], end: w[1] })
            .collect();
        let groups = Self::group(&edges, config.little_hill_u);
        Trajectory { points, edges, groups }
    }

    fn aggregate(
        k: &[f64],
        u: &[f64],
        range: std::ops::Range<usize>,
        is_night: &impl Fn(usize) -> bool,
        tracking: f64,
    ) -> Vec<TrajectoryPoint> {
        let end = range.end.min(k.len()).min(u.len());
        let valid: Vec<usize> = (range.start..end).filter(|&i| is_valid(k[i]) && is_valid(u[i])).collect();

        let mut points = Vec::new();
        let mut members: Vec<usize> = Vec::new();
        let mut center = UkPoint { k: 0.0, u: 0.0 };
        for (pos, &i) in valid.iter().enumerate() {
            let cur = UkPoint { k: k[i], u: u[i] };
            if let Some(&prev) = pos.checked_sub(1).and_then(|p| valid.get(p)) {
                let prev = UkPoint { k: k[prev], u: u[prev] };
                if cur.distance(&prev) > tracking || cur.distance(&center) > tracking {
                    points.push(Self::point(points.len(), &members, k, u, is_night));
                    members.clear();
                }
            }
            members.push(i);
            let n = members.len() as f64;
            center = UkPoint {
                k: members.iter().map(|&m| k[m]).sum::<f64>() / n,
                u: members.iter().map(|&m| u[m]).sum::<f64>() / n,
            };
        }
        if !members.is_empty() {
            points.push(Self::point(points.len(), &members, k, u, is_night));
        }
        points
    }

    fn point(idx: usize, members: &[usize], k: &[f64], u: &[f64], is_night: &impl Fn(usize) -> bool) -> TrajectoryPoint {
        let n = members.len() as f64;
        let sidx = members[0];
        let eidx = members[members.len() - 1];
        TrajectoryPoint {
            idx,
            sidx,
            eidx,
            center: UkPoint {
                k: members.iter().map(|&m| k[m]).sum::<f64>() / n,
                u: members.iter().map(|&m| u[m]).sum::<f64>() / n,
            },
            samples: members.len(),
            in_nighttime: (sidx..=eidx).any(is_night),
        }
    }

    /// Runs of edges with one speed trend. An edge whose speed change is
    /// below `flat_u` stays in the running group whatever its sign.
    fn group(edges: &[Edge], flat_u: f64) -> Vec<Group> {
        let mut groups: Vec<Group> = Vec::new();
        let mut current: Vec<Edge> = Vec::new();
        let mut trend: Option<bool> = None;
        for e in edges {
            let rising = e.du() > 0.0;
            let flat = e.du().abs() < flat_u;
            match trend {
                Some(t) if t != rising && !flat => {
                    groups.push(Group { idx: groups.len(), edges: std::mem::take(&mut current) });
                    trend = Some(rising);
                }
                None if !flat => trend = Some(rising),
                _ => {}
            }
            current.push(*e);
        }
        if !current.is_empty() {
            groups.push(Group { idx: groups.len(), edges: current });
        }
        groups
    }
}
