//! Synthetic storm fixtures shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use ncrtes::pipeline::StationInput;
use ncrtes::{BaselineModel, SnowEvent, TimeSeries};

pub const INTERVAL_SECS: u32 = 30;
pub const SNOW_START: usize = 40;
pub const SNOW_END: usize = 130;

pub fn t0() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 12)
        .and_then(|d| d.and_hms_opt(6, 0, 0))
        .expect("valid timestamp")
}

pub fn at(idx: usize) -> NaiveDateTime {
    t0() + Duration::seconds(idx as i64 * i64::from(INTERVAL_SECS))
}

pub fn event() -> SnowEvent {
    SnowEvent::from_indices(t0(), SNOW_START, SNOW_END, INTERVAL_SECS).expect("valid event")
}

/// 58 mph, a linear drop to 18 over 20 samples, a trough until
/// `trough_end`, a linear rise back to 58 over 20 samples.
pub fn storm_speeds(n: usize, trough_end: usize) -> Vec<f64> {
    (0..n)
        .map(|i| match i {
            0..=49 => 58.0,
            50..=69 => 58.0 - 2.0 * (i - 49) as f64,
            _ if i <= trough_end => 18.0,
            _ if i <= trough_end + 20 => 18.0 + 2.0 * (i - trough_end) as f64,
            _ => 58.0,
        })
        .collect()
}

/// Density rising linearly as speed falls: 20 veh/mi at 58 mph.
pub fn density_for(u: &[f64]) -> Vec<f64> {
    u.iter()
        .map(|&u| if u < 0.0 { u } else { 20.0 + (58.0 - u) * 25.0 / 40.0 })
        .collect()
}

pub fn series(u: Vec<f64>) -> TimeSeries {
    let k = density_for(&u);
    TimeSeries::from_speed_density(u, k).expect("valid series")
}

pub fn station(id: &str, u: Vec<f64>) -> StationInput {
    StationInput {
        station_id: id.to_string(),
        speed_limit: 55.0,
        series: series(u),
        search_hint: None,
        reported_regain: None,
    }
}

pub fn baseline(id: &str) -> Arc<BaselineModel> {
    Arc::new(BaselineModel::with_ffs(id, 60.0, 500))
}
