//! Type-3 fallback: one estimate from the merged section series

use crate::types::{is_valid, EstimationError, TimeSeries, MISSING};

use crate::pipeline::EstimationContext;

/// Per-index mean of the valid raw samples of every member.
///
/// The merged series is as long as the longest member; an index no member
/// has a valid sample for stays missing.
pub fn merge_series(members: &[EstimationContext]) -> Result<TimeSeries, EstimationError> {
    let n = members.iter().map(EstimationContext::len).max().unwrap_or(0);
    let mean_at = |i: usize, pick: fn(&TimeSeries) -> &[f64]| -> f64 {
        let (sum, count) = members
            .iter()
            .filter_map(|m| pick(m.series()).get(i).copied())
            .filter(|v| is_valid(*v))
            .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
        if count == 0 { MISSING } else { sum / count as f64 }
    };
    let u = (0..n).map(|i| mean_at(i, TimeSeries::u)).collect();
    let k = (0..n).map(|i| mean_at(i, TimeSeries::k)).collect();
    let q = (0..n).map(|i| mean_at(i, TimeSeries::q)).collect();
    TimeSeries::new(u, k, q)
}

/// Mean speed limit over the members.
pub fn merged_speed_limit(members: &[EstimationContext]) -> f64 {
    let limits: Vec<f64> = members.iter().map(EstimationContext::speed_limit).collect();
    limits.iter().sum::<f64>() / limits.len().max(1) as f64
}
