//! Section consensus over Type-1 NCRTs

use std::ops::RangeInclusive;

use serde::Serialize;
use tracing::{debug, info};

use crate::config::EstimationConfig;
use crate::pipeline::EstimationContext;
use crate::types::is_valid;

/// Raw and outlier-filtered mean of a set of NCRT indices.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierFilter {
    pub raw_mean: f64,
    pub filtered_mean: f64,
    pub kept: Vec<usize>,
    pub excluded: Vec<usize>,
}

/// Drop values farther than `max_deviation` samples from the raw mean.
///
/// The filtered mean falls back to the raw mean when every value is
/// dropped. `None` for an empty input.
pub fn filter_outliers(ncrts: &[usize], max_deviation: usize) -> Option<OutlierFilter> {
    if ncrts.is_empty() {
        return None;
    }
    let mean = |v: &[usize]| v.iter().map(|&x| x as f64).sum::<f64>() / v.len() as f64;
    let raw_mean = mean(ncrts);
    let (kept, excluded): (Vec<usize>, Vec<usize>) = ncrts
        .iter()
        .partition(|&&x| (x as f64 - raw_mean).abs() <= max_deviation as f64);
    let filtered_mean = if kept.is_empty() { raw_mean } else { mean(&kept) };
    Some(OutlierFilter {
        raw_mean,
        filtered_mean,
        kept,
        excluded,
    })
}

/// Outcome of the consensus step of one section.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsensusSummary {
    /// Type-1 NCRTs in member order
    pub type1: Vec<usize>,
    pub raw_mean: f64,
    pub filtered_mean: f64,
    pub excluded: Vec<usize>,
    pub consensus: usize,
    /// True when a candidate passed verification against later members
    pub verified: bool,
}

pub struct ConsensusEngine;

impl ConsensusEngine {
    /// Consensus NCRT of `members`, `None` when no member has a Type-1 NCRT.
    ///
    /// A tight set (spread under `min_spread_min`) or a single NCRT yields
    /// the filtered mean directly. Otherwise the non-outlier NCRTs are tried
    /// in ascending order and the first one every later member accepts wins.
    pub fn decide(members: &[EstimationContext], config: &EstimationConfig) -> Option<ConsensusSummary> {
        let s = &config.section;
        let type1: Vec<usize> = members.iter().filter_map(EstimationContext::type1_ncrt).collect();
        let filter = filter_outliers(&type1, config.intervals(s.outlier_deviation_min))?;
        let fallback = filter.filtered_mean.round() as usize;

        let spread = type1.iter().max().zip(type1.iter().min()).map_or(0, |(hi, lo)| hi - lo);
        let (consensus, verified) = if type1.len() < 2 || spread < config.intervals(s.min_spread_min) {
            (fallback, false)
        } else {
            let mut candidates = filter.kept.clone();
            candidates.sort_unstable();
            candidates.dedup();
            candidates
                .into_iter()
                .find(|&c| {
                    members
                        .iter()
                        .filter(|m| m.type1_ncrt().is_some_and(|n| n > c))
                        .all(|m| Self::accepts(m, c))
                })
                .map_or((fallback, false), |c| (c, true))
        };

        info!(
            type1 = ?type1,
            raw_mean = filter.raw_mean,
            filtered_mean = filter.filtered_mean,
            excluded = ?filter.excluded,
            consensus,
            verified,
            "Section consensus"
        );
        Some(ConsensusSummary {
            type1,
            raw_mean: filter.raw_mean,
            filtered_mean: filter.filtered_mean,
            excluded: filter.excluded,
            consensus,
            verified,
        })
    }

    /// Whether `member`, whose own NCRT is later, agrees that traffic had
    /// recovered by `candidate`.
    fn accepts(member: &EstimationContext, candidate: usize) -> bool {
        let (Some(view), Some(ncrt)) = (member.view(), member.type1_ncrt()) else {
            return false;
        };
        let s = &view.config.section;
        let ratios = &view.ratios.normal;
        if candidate >= view.len() || !is_valid(ratios[candidate]) || ratios[candidate] < s.plausible_ratio {
            return false;
        }
        let scratch = member.scratch();
        let too_early = scratch.search_start.is_some_and(|st| candidate < st)
            || scratch.change_points.iter().any(|&p| candidate < p);
        if too_early {
            return false;
        }

        let (sus, sks) = (view.sus(), view.sks());
        let congested = view.config.threshold.congested_speed;
        let low = low_ratio_span(candidate, ncrt, view.len())
            .filter(|&i| {
                is_valid(sus[i])
                    && is_valid(sks[i])
                    && is_valid(ratios[i])
                    && sus[i] > congested
                    && sks[i] > s.low_ratio_min_k
                    && ratios[i] < s.plausible_ratio
            })
            .count();
        let accepted = low <= view.iv(s.max_low_ratio_min);
        debug!(station = member.station_id(), candidate, low, accepted, "Consensus candidate");
        accepted
    }
}

/// Samples checked for low ratios: the candidate through the member's own
/// NCRT, both inclusive, clipped to the data.
fn low_ratio_span(candidate: usize, ncrt: usize, len: usize) -> RangeInclusive<usize> {
    candidate..=ncrt.min(len.saturating_sub(1))
}

/// Walk back from `idx` while the stepped speed stays on the same plateau.
pub fn align_to_plateau_start(aligned: &[f64], idx: usize) -> usize {
    let idx = idx.min(aligned.len().saturating_sub(1));
    if aligned.get(idx).map_or(true, |v| !is_valid(*v)) {
        return idx;
    }
    (0..idx)
        .rev()
        .take_while(|&i| aligned[i] == aligned[idx])
        .last()
        .unwrap_or(idx)
}
