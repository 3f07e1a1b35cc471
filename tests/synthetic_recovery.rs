//! Synthetic Recovery Tests
//!
//! Runs the complete Type-1 pass on a clean storm: 300 samples at 30 s,
//! speed 58 mph, a ramp down to 18 mph, a 25-minute trough, a ramp back
//! to 58 mph, snow over samples 40-130, FFS 60 and a 55 mph limit.

mod common;

use std::sync::Arc;

use common::{baseline, event, station, storm_speeds};
use ncrtes::pipeline::{Stage, StationEstimator, StationReport};
use ncrtes::{EstimationConfig, EstimationContext, NcrtType};

fn run_station() -> EstimationContext {
    let estimator = StationEstimator::new(Arc::new(EstimationConfig::default()));
    estimator
        .estimate(station("S1", storm_speeds(300, 119)), Arc::new(event()), Some(baseline("S1")))
        .expect("contract holds")
}

#[test]
fn threshold_converges_between_limits() {
    let ctx = run_station();
    let threshold = ctx.scratch().threshold.expect("threshold found");
    assert!(
        (38.5..=50.0).contains(&threshold.uth),
        "uth = {:.2} (rth {:.2})",
        threshold.uth,
        threshold.rth
    );
    // The trough's smoothed minimum sits well below the first rung
    assert!(threshold.uth > ctx.view().map_or(0.0, |v| v.sus()[ctx.scratch().worst.unwrap_or(0)]));
}

#[test]
fn recovery_point_follows_the_ramp() {
    let ctx = run_station();
    let recovery = ctx.scratch().recovery.expect("recovery found");
    assert!(
        (138..=150).contains(&recovery.index),
        "recovery at {}",
        recovery.index
    );
    assert_eq!(ctx.scratch().restarts, 0);
}

#[test]
fn ncrt_and_pst_agree_on_a_clean_ramp() {
    let ctx = run_station();
    assert_eq!(ctx.stage(), Stage::Phased);
    assert!(ctx.failure().is_none(), "failure: {:?}", ctx.failure());

    let phases = ctx.phases();
    assert_eq!(phases.ncrt_type(), Some(NcrtType::Station));
    let ncrt = phases.ncrt_index().expect("ncrt");
    let pst = phases.pst().expect("pst");
    assert!(ncrt.abs_diff(pst) <= 10, "ncrt {ncrt} vs pst {pst}");

    // NCRT never precedes the recovery point or the snow start
    let recovery = ctx.scratch().recovery.expect("recovery").index;
    assert!(ncrt >= recovery);
    assert!(ncrt > common::SNOW_START);
}

#[test]
fn phases_respect_ordering() {
    let ctx = run_station();
    let phases = ctx.phases();
    assert!(phases.is_ordered(), "{phases:?}");
    assert!(ctx.violations().is_empty());

    let lst = phases.lst().expect("lst");
    let ncrt = phases.ncrt_index().expect("ncrt");
    assert!(lst < ncrt);
    // The storm low falls in the trough
    assert!((60..=140).contains(&lst), "lst at {lst}");
    // Speed reduction starts on the free-flow plateau, ahead of the ramp at 50
    let srst = phases.srst().expect("srst on a 40 mph drop");
    assert!(srst < 50 && srst < lst, "srst at {srst}");
    if let Some(sist) = phases.sist() {
        assert!(lst <= sist && sist < ncrt);
        if let Some(pst) = phases.pst() {
            assert!(sist <= pst);
        }
    }
}

#[test]
fn pipeline_is_deterministic() {
    let first = StationReport::from(&run_station());
    let second = StationReport::from(&run_station());
    assert_eq!(first, second);
}

#[test]
fn report_carries_times_and_values() {
    let ctx = run_station();
    let report = StationReport::from(&ctx);
    let ncrt = report.ncrt.expect("ncrt mark");
    assert_eq!(ncrt.time, common::at(ncrt.index));
    assert!(report.speed_at_ncrt.is_some_and(|u| u > 50.0));
    assert!(report.ratio_at_ncrt.is_some_and(|r| r > 0.85));
    assert_eq!(report.ffs.map(|f| f.value), Some(60.0));

    let json = serde_json::to_value(&report).expect("serializable");
    assert_eq!(json["station_id"], "S1");
    assert_eq!(json["ncrt_type"], "station");
}

#[test]
fn search_hint_past_the_recovery_leaves_no_ncrt() {
    let estimator = StationEstimator::new(Arc::new(EstimationConfig::default()));
    let mut input = station("S1", storm_speeds(300, 119));
    input.search_hint = Some(common::at(290));
    let ctx = estimator
        .estimate(input, Arc::new(event()), Some(baseline("S1")))
        .expect("contract holds");
    assert!(ctx.phases().ncrt_index().is_none());
    assert!(ctx.failure().is_some());
    assert!(ctx.is_usable());
}
