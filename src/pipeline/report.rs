//! Serializable per-station and per-section results

use chrono::NaiveDateTime;
use serde::Serialize;

use super::EstimationContext;
use crate::baseline::FfsEstimate;
use crate::section::{ConsensusSummary, Section};
use crate::types::{is_valid, EstimationFailure, NcrtType, Phase, SnowEvent};

/// A phase index with its timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseMark {
    pub index: usize,
    pub time: NaiveDateTime,
}

impl PhaseMark {
    fn at(event: &SnowEvent, index: Option<usize>) -> Option<Self> {
        index.map(|index| Self {
            index,
            time: event.time_at(index),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationReport {
    pub station_id: String,
    pub ncrt: Option<PhaseMark>,
    pub ncrt_type: Option<NcrtType>,
    pub srst: Option<PhaseMark>,
    pub lst: Option<PhaseMark>,
    pub sist: Option<PhaseMark>,
    pub pst: Option<PhaseMark>,
    pub speed_at_ncrt: Option<f64>,
    pub ratio_at_ncrt: Option<f64>,
    pub density_at_ncrt: Option<f64>,
    pub ffs: Option<FfsEstimate>,
    pub uth: Option<f64>,
    pub rth: Option<f64>,
    pub recovery_index: Option<usize>,
    pub partial_recovery_restarts: usize,
    pub failure: Option<EstimationFailure>,
    /// Phases left unset by the ordering checks
    pub violations: Vec<Phase>,
    /// Lane-regain time reported by operations, for annotation only
    pub reported_regain: Option<NaiveDateTime>,
    /// NCRT minus the reported regain, in minutes
    pub regain_offset_min: Option<i64>,
}

impl From<&EstimationContext> for StationReport {
    fn from(ctx: &EstimationContext) -> Self {
        let event = ctx.event();
        let phases = ctx.phases();
        let ncrt = phases.ncrt_index();
        let view = ctx.view();
        let sample = |series: Option<&[f64]>| -> Option<f64> {
            let v = *series?.get(ncrt?)?;
            is_valid(v).then_some(v)
        };
        let threshold = ctx.scratch().threshold;
        let ncrt_mark = PhaseMark::at(event, ncrt);

        Self {
            station_id: ctx.station_id().to_string(),
            ncrt: ncrt_mark,
            ncrt_type: phases.ncrt_type(),
            srst: PhaseMark::at(event, phases.srst()),
            lst: PhaseMark::at(event, phases.lst()),
            sist: PhaseMark::at(event, phases.sist()),
            pst: PhaseMark::at(event, phases.pst()),
            speed_at_ncrt: sample(view.map(|v| v.sus())),
            ratio_at_ncrt: sample(view.map(|v| v.ratios.normal.as_slice())),
            density_at_ncrt: sample(view.map(|v| v.sks())),
            ffs: ctx.ffs(),
            uth: threshold.map(|t| t.uth),
            rth: threshold.map(|t| t.rth),
            recovery_index: ctx.scratch().recovery.map(|r| r.index),
            partial_recovery_restarts: ctx.scratch().restarts,
            failure: ctx.failure(),
            violations: ctx.violations().iter().map(|v| v.phase).collect(),
            reported_regain: ctx.reported_regain(),
            regain_offset_min: ncrt_mark
                .zip(ctx.reported_regain())
                .map(|(m, r)| (m.time - r).num_minutes()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionReport {
    pub section_id: String,
    pub snow_start: NaiveDateTime,
    pub snow_end: NaiveDateTime,
    pub interval_secs: u32,
    pub consensus: Option<ConsensusSummary>,
    /// Result on the merged series when the section fell back to it
    pub merged: Option<StationReport>,
    pub stations: Vec<StationReport>,
}

impl From<&Section> for SectionReport {
    fn from(section: &Section) -> Self {
        Self {
            section_id: section.section_id.clone(),
            snow_start: section.event.snow_start(),
            snow_end: section.event.snow_end(),
            interval_secs: section.event.interval_secs(),
            consensus: section.consensus.clone(),
            merged: section.merged.as_ref().map(StationReport::from),
            stations: section.members.iter().map(StationReport::from).collect(),
        }
    }
}
