//! Section Consensus Engine
//!
//! Combines the per-station results of one route section after every
//! Type-1 pass has finished:
//!
//! ```text
//! Type-1 NCRTs ─► outlier filter ─► verified candidate ─► consensus
//!                                                             │
//!            members without Type-1 ◄── plateau alignment ◄───┘   (Type-2)
//!
//! no Type-1 at all ─► merged series ─► Type-1 pass ─► every usable member (Type-3)
//! ```
//!
//! Members that receive an NCRT here run their phase detection again.

pub mod consensus;
pub mod fallback;

pub use consensus::{align_to_plateau_start, filter_outliers, ConsensusEngine, ConsensusSummary, OutlierFilter};

use std::sync::Arc;

use tracing::{info, warn};

use crate::baseline::BaselineModel;
use crate::config::EstimationConfig;
use crate::pipeline::EstimationContext;
use crate::types::{EstimationError, EstimationFailure, NcrtType, SnowEvent};

/// Members of one route section and the section-level results.
#[derive(Debug, Clone)]
pub struct Section {
    pub section_id: String,
    pub event: Arc<SnowEvent>,
    pub members: Vec<EstimationContext>,
    pub consensus: Option<ConsensusSummary>,
    /// Context run on the merged series when no member had a Type-1 NCRT
    pub merged: Option<EstimationContext>,
}

impl Section {
    pub fn new(section_id: impl Into<String>, event: Arc<SnowEvent>, members: Vec<EstimationContext>) -> Self {
        Self {
            section_id: section_id.into(),
            event,
            members,
            consensus: None,
            merged: None,
        }
    }

    /// Propagate Type-2 or Type-3 NCRTs to the members that need one.
    pub fn resolve(&mut self, config: &Arc<EstimationConfig>) -> Result<(), EstimationError> {
        if self.members.is_empty() {
            return Err(EstimationError::EmptySection(self.section_id.clone()));
        }
        // Members carry the config adjusted to the event's interval
        match ConsensusEngine::decide(&self.members, self.members[0].config()) {
            Some(summary) => {
                let consensus = summary.consensus;
                self.consensus = Some(summary);
                self.assign(consensus, NcrtType::SectionConsensus)
            }
            None => self.fall_back(config),
        }
    }

    fn fall_back(&mut self, config: &Arc<EstimationConfig>) -> Result<(), EstimationError> {
        let series = fallback::merge_series(&self.members)?;
        let limit = fallback::merged_speed_limit(&self.members);
        let baseline: Option<Arc<BaselineModel>> = None;
        let mut merged = EstimationContext::new(
            format!("{}:merged", self.section_id),
            limit,
            series,
            Arc::clone(&self.event),
            baseline,
            Arc::clone(config),
        )?;
        merged.run()?;

        let ncrt = merged.type1_ncrt();
        self.merged = Some(merged);
        match ncrt {
            Some(ncrt) => {
                info!(section = %self.section_id, ncrt, "Section fallback NCRT");
                self.assign(ncrt, NcrtType::SectionFallback)
            }
            None => {
                warn!(section = %self.section_id, "Merged series has no NCRT either");
                for m in self.members.iter_mut().filter(|m| m.phases().ncrt_index().is_none()) {
                    m.mark_failed(EstimationFailure::SectionInconsistent);
                }
                Ok(())
            }
        }
    }

    /// Give `ncrt` to every usable member without its own, aligned to the
    /// start of that member's speed plateau, then redo its phases.
    fn assign(&mut self, ncrt: usize, kind: NcrtType) -> Result<(), EstimationError> {
        for m in &mut self.members {
            if m.type1_ncrt().is_some() || !m.is_usable() {
                continue;
            }
            let Some(aligned) = m.smoothed().map(|s| align_to_plateau_start(&s.aligned_u, ncrt)) else {
                continue;
            };
            m.assign_ncrt(aligned, kind)?;
            m.detect_phases()?;
        }
        Ok(())
    }
}
