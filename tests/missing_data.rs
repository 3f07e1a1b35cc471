//! Missing-Data and Smoothing Tests
//!
//! Scatters the missing-value sentinel over a noisy storm series and checks
//! that it never leaks into a statistic, then checks that re-smoothing a
//! smoothed series leaves its locally linear parts unchanged.

mod common;

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};

use common::{event, storm_speeds};
use ncrtes::pipeline::{StationEstimator, StationInput};
use ncrtes::processing::{smooth, SignalPreprocessor, STANDARD_WINDOWS_MIN};
use ncrtes::types::is_valid;
use ncrtes::{EstimationConfig, EstimationContext, TimeSeries, MISSING};

const N: usize = 300;

fn noisy_speeds(rng: &mut StdRng) -> Vec<f64> {
    storm_speeds(N, 119)
        .into_iter()
        .map(|u| u + rng.gen_range(-2.0..2.0))
        .collect()
}

fn with_sentinels(u: &[f64], rng: &mut StdRng) -> Vec<f64> {
    let mut out = u.to_vec();
    for i in sample(rng, N, N / 10) {
        out[i] = MISSING;
    }
    out
}

fn run_without_baseline(u: Vec<f64>) -> EstimationContext {
    let k = common::density_for(&u);
    let input = StationInput {
        station_id: "S1".to_string(),
        speed_limit: 55.0,
        series: TimeSeries::from_speed_density(u, k).expect("valid series"),
        search_hint: None,
        reported_regain: None,
    };
    StationEstimator::new(Arc::new(EstimationConfig::default()))
        .estimate(input, Arc::new(event()), None)
        .expect("contract holds")
}

#[test]
fn sentinels_barely_move_the_ffs() {
    let mut rng = StdRng::seed_from_u64(17);
    let clean = noisy_speeds(&mut rng);
    let holed = with_sentinels(&clean, &mut rng);
    assert_eq!(holed.iter().filter(|v| !is_valid(**v)).count(), N / 10);

    let ffs_clean = run_without_baseline(clean).ffs().expect("in-situ FFS").value;
    let ffs_holed = run_without_baseline(holed).ffs().expect("in-situ FFS").value;
    assert!(
        (ffs_clean - ffs_holed).abs() <= 1.0,
        "FFS moved from {ffs_clean:.2} to {ffs_holed:.2}"
    );
    assert!(ffs_holed > 55.0);
}

#[test]
fn sentinels_never_reach_smoothed_values() {
    let mut rng = StdRng::seed_from_u64(23);
    let u = with_sentinels(&noisy_speeds(&mut rng), &mut rng);
    let k = common::density_for(&u);
    let series = TimeSeries::from_speed_density(u, k).expect("valid series");
    let smoothed = SignalPreprocessor::run(&series, &EstimationConfig::default()).expect("enough data");

    let bounds = |data: &[f64]| {
        data.iter()
            .filter(|v| is_valid(**v))
            .fold((f64::MAX, f64::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)))
    };
    let (u_lo, u_hi) = bounds(series.u());
    let (k_lo, k_hi) = bounds(series.k());

    for w in STANDARD_WINDOWS_MIN {
        let trend = smoothed.at(w).expect("standard window present");
        for i in 0..N {
            if !is_valid(series.u()[i]) {
                assert!(!is_valid(trend.u[i]), "{w} min: sentinel at {i} was filled");
                assert!(!is_valid(trend.k[i]));
                continue;
            }
            // A mean of valid samples stays inside their range
            assert!(
                trend.u[i] >= u_lo - 1e-9 && trend.u[i] <= u_hi + 1e-9,
                "{w} min: u[{i}] = {}",
                trend.u[i]
            );
            assert!(trend.k[i] >= k_lo - 1e-9 && trend.k[i] <= k_hi + 1e-9);
        }
    }
    for stepped in [&smoothed.stepped_u, &smoothed.aligned_u] {
        assert!(stepped.iter().all(|v| !is_valid(*v) || (*v >= u_lo - 1e-9 && *v <= u_hi + 1e-9)));
    }
}

#[test]
fn holed_station_still_recovers() {
    let mut rng = StdRng::seed_from_u64(31);
    let u = with_sentinels(&storm_speeds(N, 119), &mut rng);
    let ctx = run_without_baseline(u);
    let ncrt = ctx.phases().ncrt_index().expect("ncrt despite gaps");
    assert!((150..=220).contains(&ncrt), "ncrt at {ncrt}");
    assert!(ctx.phases().is_ordered());
}

// ============================================================================
// Re-smoothing
// ============================================================================

#[test]
fn resmoothing_a_constant_series_is_exact() {
    let mut data = vec![42.0; 80];
    data[7] = MISSING;
    data[50] = MISSING;
    let once = smooth(&data, 9, 0.5).expect("odd window");
    let twice = smooth(&once, 9, 0.5).expect("odd window");
    for (a, b) in once.iter().zip(&twice) {
        assert!(a == b || (a - b).abs() < 1e-9, "{a} vs {b}");
    }
}

#[test]
fn resmoothing_keeps_linear_and_flat_stretches() {
    let window = 9;
    let half = window / 2;
    let data = storm_speeds(N, 119);
    let once = smooth(&data, window, 0.5).expect("odd window");
    let twice = smooth(&once, window, 0.5).expect("odd window");

    // Indices whose doubled neighborhood lies on one straight piece
    let pieces = [(0usize, 49usize), (49, 69), (69, 119), (119, 139), (139, N - 1)];
    let mut checked = 0;
    for (lo, hi) in pieces {
        for i in (lo + 2 * half)..=hi.saturating_sub(2 * half) {
            assert!((once[i] - twice[i]).abs() < 1e-9, "index {i}: {} vs {}", once[i], twice[i]);
            checked += 1;
        }
    }
    assert!(checked > 200, "only {checked} indices checked");
}
