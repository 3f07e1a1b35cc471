//! Centered moving average and plateau stepping

use super::ProcessingError;
use crate::types::{is_valid, MISSING};

/// Centered moving average over an odd `window`.
///
/// Near the ends the window shrinks to the samples that exist. Sentinel
/// samples stay sentinel in the output and are never averaged into a
/// neighbor; a window whose valid share is below `min_valid_fraction` emits
/// the sentinel as well.
pub fn smooth(data: &[f64], window: usize, min_valid_fraction: f64) -> Result<Vec<f64>, ProcessingError> {
    if window == 0 || window % 2 == 0 {
        return Err(ProcessingError::InvalidWindow(window));
    }
    let n = data.len();
    let half = window / 2;

    // Prefix sums over valid samples only
    let mut sums = Vec::with_capacity(n + 1);
    let mut counts = Vec::with_capacity(n + 1);
    sums.push(0.0);
    counts.push(0usize);
    for &v in data {
        let (s, c) = if is_valid(v) { (v, 1) } else { (0.0, 0) };
        sums.push(sums[sums.len() - 1] + s);
        counts.push(counts[counts.len() - 1] + c);
    }

    let out = (0..n)
        .map(|i| {
            if !is_valid(data[i]) {
                return MISSING;
            }
            let lo = i.saturating_sub(half);
            let hi = (i + half).min(n - 1);
            let span = hi - lo + 1;
            let count = counts[hi + 1] - counts[lo];
            if (count as f64) < min_valid_fraction * span as f64 {
                return MISSING;
            }
            (sums[hi + 1] - sums[lo]) / count as f64
        })
        .collect();
    Ok(out)
}

/// Collapse near-constant runs into plateaus.
///
/// The running anchor starts at the mean of the first three valid samples and
/// jumps to a sample whenever that sample departs from it by more than `step`.
/// Every run of samples sharing one anchor is replaced by the mean of its raw
/// members. Sentinels are skipped and stay sentinel.
pub fn stepping(data: &[f64], step: f64) -> Vec<f64> {
    let mut out = vec![MISSING; data.len()];
    let head: Vec<f64> = data.iter().copied().filter(|v| is_valid(*v)).take(3).collect();
    if head.is_empty() {
        return out;
    }
    let mut anchor = head.iter().sum::<f64>() / head.len() as f64;

    let mut run: Vec<usize> = Vec::new();
    for (i, &v) in data.iter().enumerate() {
        if !is_valid(v) {
            continue;
        }
        if (anchor - v).abs() > step {
            flush_run(&run, data, &mut out);
            run.clear();
            anchor = v;
        }
        run.push(i);
    }
    flush_run(&run, data, &mut out);
    out
}

fn flush_run(run: &[usize], data: &[f64], out: &mut [f64]) {
    if run.is_empty() {
        return;
    }
    let mean = run.iter().map(|&i| data[i]).sum::<f64>() / run.len() as f64;
    for &i in run {
        out[i] = mean;
    }
}
