//! Missing-aware slice statistics
//!
//! Every helper skips sentinel samples; an all-missing slice yields `None`
//! rather than a number.

use statrs::statistics::{Data, OrderStatistics, Statistics};

use crate::types::is_valid;

pub fn valid_min(data: &[f64]) -> Option<f64> {
    data.iter().copied().filter(|v| is_valid(*v)).reduce(f64::min)
}

pub fn valid_max(data: &[f64]) -> Option<f64> {
    data.iter().copied().filter(|v| is_valid(*v)).reduce(f64::max)
}

pub fn valid_mean(data: &[f64]) -> Option<f64> {
    if !data.iter().any(|v| is_valid(*v)) {
        return None;
    }
    Some(data.iter().filter(|v| is_valid(**v)).mean())
}

/// Offset of the first minimum within `data`.
pub fn valid_argmin(data: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in data.iter().enumerate() {
        if is_valid(v) && best.map_or(true, |(_, b)| v < b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

/// Offset of the first maximum within `data`.
pub fn valid_argmax(data: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, &v) in data.iter().enumerate() {
        if is_valid(v) && best.map_or(true, |(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best.map(|(i, _)| i)
}

/// `p`-th percentile of `values` (already filtered), `None` when empty.
pub fn percentile(values: Vec<f64>, p: usize) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut data = Data::new(values);
    Some(data.percentile(p))
}

/// Clamp a half-open window `[start, start + len)` to a series of `n` samples.
pub fn window(start: usize, len: usize, n: usize) -> std::ops::Range<usize> {
    let s = start.min(n);
    s..start.saturating_add(len).min(n)
}
