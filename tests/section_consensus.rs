//! Section Consensus Tests
//!
//! Runs whole sections through `SectionEstimator`: Type-2 back-propagation
//! to members without their own NCRT, verification of spread-out Type-1
//! NCRTs, and the Type-3 merged-series fallback.

mod common;

use std::sync::Arc;

use common::{at, event, station, storm_speeds, t0};
use ncrtes::pipeline::StationInput;
use ncrtes::section::Section;
use ncrtes::{
    BaselineModel, EstimationConfig, EstimationError, EstimationFailure, InMemoryBaselines, NcrtType,
    SectionEstimator, SectionInput, SnowEvent,
};

fn estimator(ids: &[&str]) -> SectionEstimator {
    let baselines: InMemoryBaselines = ids
        .iter()
        .map(|id| BaselineModel::with_ffs(*id, 60.0, 500))
        .collect();
    SectionEstimator::new(EstimationConfig::default(), Arc::new(baselines))
}

fn member<'a>(section: &'a Section, id: &str) -> &'a ncrtes::EstimationContext {
    section
        .members
        .iter()
        .find(|m| m.station_id() == id)
        .expect("member present")
}

fn late_hint(mut input: StationInput) -> StationInput {
    input.search_hint = Some(at(290));
    input
}

// ============================================================================
// Type-2
// ============================================================================

#[test]
fn tight_section_assigns_the_mean_to_stuck_members() {
    let stations = vec![
        station("A", storm_speeds(300, 119)),
        station("B", storm_speeds(300, 119)),
        // Never regains speed inside the data
        station("C", storm_speeds(300, 400)),
    ];
    let section = estimator(&["A", "B", "C"])
        .estimate("I-90-W", event(), stations)
        .expect("section runs");

    let (a, b, c) = (member(&section, "A"), member(&section, "B"), member(&section, "C"));
    let na = a.type1_ncrt().expect("A recovers");
    let nb = b.type1_ncrt().expect("B recovers");
    assert_eq!(na, nb);
    assert!(c.type1_ncrt().is_none());

    let summary = section.consensus.as_ref().expect("consensus");
    assert_eq!(summary.type1, vec![na, nb]);
    assert_eq!(summary.consensus, na);
    assert!(!summary.verified, "a tight set is not verified");
    assert!(section.merged.is_none());

    assert_eq!(c.phases().ncrt_type(), Some(NcrtType::SectionConsensus));
    let nc = c.phases().ncrt_index().expect("assigned");
    assert!(nc <= summary.consensus, "aligned back to the plateau start, got {nc}");
    assert!(c.phases().is_ordered());
    assert!(!matches!(c.failure(), Some(EstimationFailure::NoRecoveryPoint)));
}

#[test]
fn spread_section_verifies_against_later_members() {
    let stations = vec![
        station("A", storm_speeds(600, 119)),
        // Stays slow 75 minutes longer
        station("B", storm_speeds(600, 269)),
    ];
    let section = estimator(&["A", "B"])
        .estimate("I-90-W", event(), stations)
        .expect("section runs");

    let na = member(&section, "A").type1_ncrt().expect("A recovers");
    let nb = member(&section, "B").type1_ncrt().expect("B recovers");
    assert!(nb >= na + 120, "fixture needs a spread of an hour: {na} vs {nb}");

    let summary = section.consensus.as_ref().expect("consensus");
    assert!(summary.excluded.is_empty());
    // B is still in its trough at A's NCRT, so only B's own NCRT survives
    assert!(summary.verified);
    assert_eq!(summary.consensus, nb);

    // Members with their own NCRT keep it
    assert_eq!(member(&section, "A").phases().ncrt_index(), Some(na));
    assert_eq!(member(&section, "A").phases().ncrt_type(), Some(NcrtType::Station));
}

/// One-minute storm: 58 mph to sample 29, down to 18 by 49, a trough until
/// `trough_end`, back to 58 over the next 20 samples.
fn minute_storm(n: usize, trough_end: usize) -> Vec<f64> {
    (0..n)
        .map(|i| match i {
            0..=29 => 58.0,
            30..=49 => 58.0 - 2.0 * (i - 29) as f64,
            _ if i <= trough_end => 18.0,
            _ if i <= trough_end + 20 => 18.0 + 2.0 * (i - trough_end) as f64,
            _ => 58.0,
        })
        .collect()
}

#[test]
fn outlier_ncrt_is_left_out_of_the_section_mean() {
    // At 60 s the outlier cut is 120 samples and the verification spread 60
    let event = SnowEvent::from_indices(t0(), 30, 70, 60).expect("valid event");
    let stations = vec![
        station("A", minute_storm(600, 65)),
        station("B", minute_storm(600, 67)),
        station("C", minute_storm(600, 70)),
        // Stays in the trough for another two and a half hours
        station("D", minute_storm(600, 225)),
        station("E", minute_storm(600, 68)),
        station("F", minute_storm(600, 900)),
    ];
    let section = estimator(&["A", "B", "C", "D", "E", "F"])
        .estimate("I-90-W", event, stations)
        .expect("section runs");

    let summary = section.consensus.as_ref().expect("consensus");
    assert_eq!(summary.type1, vec![100, 102, 105, 260, 103]);
    assert!((summary.raw_mean - 134.0).abs() < 1e-9);
    assert_eq!(summary.excluded, vec![260]);
    assert!((summary.filtered_mean - 102.5).abs() < 1e-9);
    // D is still in its trough at every kept candidate, so verification fails
    // and the filtered mean is used
    assert!(!summary.verified);
    assert_eq!(summary.consensus, 103);

    // The outlier keeps its own NCRT
    let d = member(&section, "D");
    assert_eq!(d.phases().ncrt_index(), Some(260));
    assert_eq!(d.phases().ncrt_type(), Some(NcrtType::Station));

    let f = member(&section, "F");
    assert_eq!(f.phases().ncrt_type(), Some(NcrtType::SectionConsensus));
    assert!(f.phases().ncrt_index().is_some_and(|n| n <= 103));
}

// ============================================================================
// Type-3
// ============================================================================

#[test]
fn no_type1_falls_back_to_the_merged_series() {
    let stations = vec![
        late_hint(station("A", storm_speeds(300, 119))),
        late_hint(station("B", storm_speeds(300, 119))),
    ];
    let section = estimator(&["A", "B"])
        .estimate("I-90-W", event(), stations)
        .expect("section runs");

    assert!(section.consensus.is_none());
    let merged = section.merged.as_ref().expect("merged context");
    assert_eq!(merged.station_id(), "I-90-W:merged");
    let fallback = merged.type1_ncrt().expect("merged series recovers");

    for m in &section.members {
        assert_eq!(m.phases().ncrt_type(), Some(NcrtType::SectionFallback), "{}", m.station_id());
        let n = m.phases().ncrt_index().expect("assigned");
        assert!(n <= fallback);
        assert!(m.phases().is_ordered());
    }
}

#[test]
fn merged_series_without_recovery_marks_members_inconsistent() {
    let stations = vec![station("A", storm_speeds(300, 400)), station("B", storm_speeds(300, 400))];
    let section = estimator(&["A", "B"])
        .estimate("I-90-W", event(), stations)
        .expect("section runs");

    assert!(section.consensus.is_none());
    assert!(section.merged.as_ref().is_some_and(|m| m.type1_ncrt().is_none()));
    for m in &section.members {
        assert!(m.phases().ncrt_index().is_none());
        assert_eq!(m.failure(), Some(EstimationFailure::SectionInconsistent));
    }
}

// ============================================================================
// Input and Report
// ============================================================================

#[test]
fn empty_section_is_an_error() {
    let result = estimator(&[]).estimate("I-90-W", event(), Vec::new());
    assert!(matches!(result, Err(EstimationError::EmptySection(id)) if id == "I-90-W"));
}

#[test]
fn json_input_uses_embedded_baselines() {
    let u = storm_speeds(300, 119);
    let k = common::density_for(&u);
    let input = serde_json::json!({
        "section_id": "I-90-W",
        "event": {
            "data_start": "2024-01-12T06:00:00",
            "snow_start": "2024-01-12T06:20:00",
            "snow_end": "2024-01-12T07:05:00",
            "interval_secs": 30
        },
        "stations": [
            { "station_id": "A", "speed_limit": 55.0, "series": { "u": u, "k": k } }
        ],
        "baselines": [
            { "station_id": "A", "ffs": 60.0, "sample_count": 500 }
        ]
    });
    let input: SectionInput = serde_json::from_value(input).expect("valid input");
    assert_eq!(input.event, event());

    // The provider knows nothing; the embedded model must be used
    let report = SectionEstimator::new(EstimationConfig::default(), Arc::new(InMemoryBaselines::new()))
        .estimate_input(input)
        .expect("section runs");
    assert_eq!(report.stations.len(), 1);
    let a = &report.stations[0];
    assert_eq!(a.ffs.map(|f| f.value), Some(60.0));
    assert!(a.ncrt.is_some());
    assert_eq!(report.consensus.as_ref().map(|c| c.type1.len()), Some(1));
    assert_eq!(report.interval_secs, 30);
}

#[test]
fn mismatched_series_is_rejected_at_parse() {
    let input = serde_json::json!({
        "section_id": "I-90-W",
        "event": {
            "data_start": "2024-01-12T06:00:00",
            "snow_start": "2024-01-12T06:20:00",
            "snow_end": "2024-01-12T07:05:00",
            "interval_secs": 30
        },
        "stations": [
            { "station_id": "A", "speed_limit": 55.0, "series": { "u": [58.0, 57.0], "k": [20.0] } }
        ]
    });
    assert!(serde_json::from_value::<SectionInput>(input).is_err());
}

#[test]
fn event_past_the_data_fails_the_section() {
    let stations = vec![station("A", storm_speeds(100, 119))];
    let result = estimator(&["A"]).estimate("I-90-W", event(), stations);
    assert!(matches!(result, Err(EstimationError::EventOutOfRange { .. })));
}
