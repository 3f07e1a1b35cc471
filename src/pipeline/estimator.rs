//! Station and section entry points

use std::sync::Arc;

use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::Deserialize;
use tracing::info;

use super::{EstimationContext, SectionReport};
use crate::baseline::{BaselineModel, BaselineProvider, InMemoryBaselines};
use crate::config::EstimationConfig;
use crate::section::Section;
use crate::types::{EstimationError, SnowEvent, TimeSeries};

/// One station's samples for one event.
#[derive(Debug, Clone, Deserialize)]
pub struct StationInput {
    pub station_id: String,
    pub speed_limit: f64,
    pub series: TimeSeries,
    /// Earliest time the recovery search may start
    #[serde(default)]
    pub search_hint: Option<NaiveDateTime>,
    /// Lane-regain time reported by operations, echoed in the report
    #[serde(default)]
    pub reported_regain: Option<NaiveDateTime>,
}

/// Stations of one route section, in route order, for one event.
#[derive(Debug, Clone, Deserialize)]
pub struct SectionInput {
    pub section_id: String,
    pub event: SnowEvent,
    pub stations: Vec<StationInput>,
    #[serde(default)]
    pub baselines: Vec<BaselineModel>,
}

/// Runs the Type-1 pass of a single station.
#[derive(Debug, Clone)]
pub struct StationEstimator {
    config: Arc<EstimationConfig>,
}

impl StationEstimator {
    pub fn new(config: Arc<EstimationConfig>) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Arc<EstimationConfig> {
        &self.config
    }

    /// Build the context of `input` without running any stage.
    pub fn context(
        &self,
        input: StationInput,
        event: Arc<SnowEvent>,
        baseline: Option<Arc<BaselineModel>>,
    ) -> Result<EstimationContext, EstimationError> {
        let hint = input.search_hint.and_then(|t| event.index_of(t));
        Ok(EstimationContext::new(
            input.station_id,
            input.speed_limit,
            input.series,
            event,
            baseline,
            Arc::clone(&self.config),
        )?
        .with_search_hint(hint)
        .with_reported_regain(input.reported_regain))
    }

    /// Build the context of `input` and run its Type-1 pass.
    pub fn estimate(
        &self,
        input: StationInput,
        event: Arc<SnowEvent>,
        baseline: Option<Arc<BaselineModel>>,
    ) -> Result<EstimationContext, EstimationError> {
        let mut ctx = self.context(input, event, baseline)?;
        ctx.run()?;
        Ok(ctx)
    }
}

/// Runs every station of a section, then the section consensus.
pub struct SectionEstimator {
    stations: StationEstimator,
    baselines: Arc<dyn BaselineProvider>,
}

impl SectionEstimator {
    pub fn new(config: EstimationConfig, baselines: Arc<dyn BaselineProvider>) -> Self {
        Self {
            stations: StationEstimator::new(Arc::new(config)),
            baselines,
        }
    }

    /// Estimate a section read from input, using its embedded baselines
    /// ahead of the configured provider.
    pub fn estimate_input(&self, input: SectionInput) -> Result<SectionReport, EstimationError> {
        let SectionInput {
            section_id,
            event,
            stations,
            baselines,
        } = input;
        if baselines.is_empty() {
            let section = self.estimate(&section_id, event, stations)?;
            return Ok(SectionReport::from(&section));
        }
        let embedded: InMemoryBaselines = baselines.into_iter().collect();
        let layered = Layered {
            first: &embedded,
            second: self.baselines.as_ref(),
        };
        let section = self.run(&section_id, event, stations, &layered)?;
        Ok(SectionReport::from(&section))
    }

    /// Type-1 pass of every station in parallel, then the consensus pass.
    pub fn estimate(
        &self,
        section_id: &str,
        event: SnowEvent,
        stations: Vec<StationInput>,
    ) -> Result<Section, EstimationError> {
        self.run(section_id, event, stations, self.baselines.as_ref())
    }

    fn run(
        &self,
        section_id: &str,
        event: SnowEvent,
        stations: Vec<StationInput>,
        baselines: &dyn BaselineProvider,
    ) -> Result<Section, EstimationError> {
        if stations.is_empty() {
            return Err(EstimationError::EmptySection(section_id.to_string()));
        }
        let event = Arc::new(event);
        info!(
            section = section_id,
            stations = stations.len(),
            snow_start = %event.snow_start(),
            snow_end = %event.snow_end(),
            "Estimating section"
        );

        let members = stations
            .into_par_iter()
            .map(|input| {
                let baseline = baselines.baseline(&input.station_id);
                self.stations.estimate(input, Arc::clone(&event), baseline)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut section = Section::new(section_id, event, members);
        section.resolve(self.stations.config())?;

        let resolved = section.members.iter().filter(|m| m.phases().ncrt_index().is_some()).count();
        info!(
            section = section_id,
            resolved,
            total = section.members.len(),
            consensus = ?section.consensus.as_ref().map(|c| c.consensus),
            fallback = section.merged.is_some(),
            "Section complete"
        );
        Ok(section)
    }
}

/// Looks in `first`, then in `second`.
struct Layered<'a> {
    first: &'a dyn BaselineProvider,
    second: &'a dyn BaselineProvider,
}

impl BaselineProvider for Layered<'_> {
    fn baseline(&self, station_id: &str) -> Option<Arc<BaselineModel>> {
        self.first
            .baseline(station_id)
            .or_else(|| self.second.baseline(station_id))
    }
}
