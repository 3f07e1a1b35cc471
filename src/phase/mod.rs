//! Phase Detector
//!
//! Locates the storm-impact markers around an NCRT:
//!
//! ```text
//! speed
//!   │ ─────╮SRST                               PST ╭──────────
//!   │       ╲                                     ╱│
//!   │        ╲                             NCRT  ╱ │
//!   │         ╲_______________  SIST  ╱─────────╯  │
//!   │                  LST    ╲______╱             │
//!   └──────────────────────────────────────────────────► time
//! ```
//!
//! SRST depends only on the storm itself. LST, SIST and PST depend on the
//! NCRT and are recomputed whenever it changes. Writes go through
//! [`PhaseIndices`], so a marker that would break `LST ≤ SIST < NCRT` or
//! `SIST ≤ PST` ends unset and is reported as a violation.

use tracing::{debug, warn};

use crate::pipeline::StationView;
use crate::processing::stats::{valid_argmax, valid_argmin, valid_max, valid_mean, valid_min, window};
use crate::types::{is_valid, OrderViolation, PhaseIndices};

/// Maximum valley-skipping passes of the SRST plateau walk.
const SRST_VALLEY_PASSES: usize = 10;

pub struct PhaseDetector;

impl PhaseDetector {
    /// Fill every marker of `phases` for the NCRT already set on it.
    ///
    /// SRST is written even without an NCRT. Returns the writes rejected by
    /// the ordering checks.
    pub fn detect(view: &StationView<'_>, worst: Option<usize>, phases: &mut PhaseIndices) -> Vec<OrderViolation> {
        phases.set_srst(worst.and_then(|w| Self::srst(view, w)));
        let Some(ncrt) = phases.ncrt_index() else {
            return Vec::new();
        };
        phases.clear_recovery_phases();

        let mut violations = Vec::new();
        if let Some(lst) = Self::lst(view, ncrt) {
            if let Err(v) = phases.set_lst(lst) {
                violations.push(v);
            }
        }
        if let Some(sist) = Self::sist(view, phases.lst(), ncrt) {
            if let Err(v) = phases.set_sist(sist) {
                violations.push(v);
            }
        }
        if let Some(pst) = Self::pst(view, phases.sist(), phases.lst()) {
            if let Err(v) = phases.set_pst(pst) {
                violations.push(v);
            }
        }

        for v in &violations {
            warn!(phase = %v.phase, index = v.index, ncrt, "Phase ordering violated, left unset");
        }
        debug!(
            srst = ?phases.srst(),
            lst = ?phases.lst(),
            sist = ?phases.sist(),
            pst = ?phases.pst(),
            ncrt,
            "Phases"
        );
        violations
    }

    // ========================================================================
    // SRST
    // ========================================================================

    /// Speed-reduction start before the worst point `widx`.
    ///
    /// The first sustained reduction below the pre-storm ratio marks where
    /// the storm took hold; SRST is the top of the last speed plateau before
    /// it, moved forward while speed still holds. Unset when the reduction
    /// is shallower than `srst_min_drop`.
    pub fn srst(view: &StationView<'_>, widx: usize) -> Option<usize> {
        let cfg = &view.config.phase;
        let (sus, qus) = (view.sus(), &view.smoothed.stepped_u);
        let ratios = &view.ratios.normal;
        let n = view.len();
        if widx == 0 || widx >= n || !is_valid(ratios[widx]) {
            return None;
        }

        let max_ratio = valid_max(&ratios[..widx])?.min(1.0);
        let rth = (max_ratio - cfg.srst_ratio_drop).max(ratios[widx] + cfg.srst_worst_margin);

        let lead_in = (0..n.saturating_sub(1))
            .take_while(|&i| !(is_valid(qus[i]) && is_valid(qus[i + 1])) || qus[i + 1] - qus[i] >= -cfg.srst_start_drop)
            .count();
        let reduction = Self::reduction_start(view, lead_in, rth)?;

        let srst = Self::plateau_top(view, reduction);
        let srst = Self::hold_forward(view, srst);

        let lost_window = reduction..(reduction + view.iv(60)).min(n - 1) + 1;
        let lost = reduction + valid_argmin(&sus[lost_window])?;
        if !is_valid(sus[srst]) || (sus[srst] - sus[lost]).abs() < cfg.srst_min_drop {
            debug!(srst, lost, "SRST drop too shallow");
            return None;
        }
        Some(srst)
    }

    /// First index from `from` where the reduction is under way.
    ///
    /// At night the nighttime ratio must stay below its threshold for an
    /// hour and fall across it; by day the next 30 min of ratios stay below
    /// `rth` while the analysis speed falls over the same 30 min.
    fn reduction_start(view: &StationView<'_>, from: usize, rth: f64) -> Option<usize> {
        let night_rth = view.config.phase.night_ratio_threshold;
        let (ratios, night) = (&view.ratios.normal, &view.ratios.night);
        let sus = view.sus();
        let n = view.len();
        let (h1, m30) = (view.iv(60), view.iv(30));

        (from..n.saturating_sub(h1)).find(|&idx| match night[idx] {
            Some(now) => {
                let Some(later) = night[idx + h1] else {
                    return false;
                };
                let peak = night[idx..idx + h1].iter().flatten().copied().fold(f64::NEG_INFINITY, f64::max);
                peak < night_rth && now > later
            }
            None => {
                valid_max(&ratios[idx..idx + m30]).is_some_and(|m| m < rth)
                    && is_valid(sus[idx])
                    && is_valid(sus[idx + m30])
                    && sus[idx] > sus[idx + m30]
            }
        })
    }

    /// Highest speed plateau between 30 min before snow start and the
    /// reduction, skipping shallow valleys.
    fn plateau_top(view: &StationView<'_>, reduction: usize) -> usize {
        let min_drop = view.config.phase.srst_min_drop;
        let (sus, qus) = (view.sus(), &view.smoothed.stepped_u);
        let m30 = view.iv(30);
        let mut srst = reduction;
        let mut from = view.snow_start().saturating_sub(m30);

        for _ in 0..SRST_VALLEY_PASSES {
            if from >= reduction {
                break;
            }
            let Some(off) = valid_argmax(&qus[from..reduction]) else {
                break;
            };
            let top = from + off;
            let top_end = (top..reduction)
                .take_while(|&i| qus[i] == qus[top])
                .last()
                .unwrap_or(top);
            let Some(off) = valid_argmax(&sus[top..=top_end]) else {
                break;
            };
            srst = top + off;

            let dip_end = (srst + m30).min(reduction.saturating_sub(1)).max(srst);
            let Some(off) = valid_argmin(&sus[srst..=dip_end]) else {
                break;
            };
            let dip = srst + off;
            if reduction.saturating_sub(dip) <= m30 {
                break;
            }
            let Some(off) = valid_argmax(&sus[dip..reduction]) else {
                break;
            };
            let next_top = dip + off;
            let regains = sus[srst] < sus[next_top] || sus[srst] - sus[next_top] < min_drop;
            let deep = match (valid_min(&sus[dip..=next_top]), valid_max(&sus[dip..=next_top])) {
                (Some(lo), Some(hi)) => hi - lo > min_drop,
                _ => false,
            };
            if !(regains && deep) {
                break;
            }
            from = srst + valid_argmin(&sus[srst..=next_top]).unwrap_or(0);
        }
        srst
    }

    /// Move forward while the raw speed of the next 30 min stays within
    /// `srst_min_drop` of the speed at `srst`.
    fn hold_forward(view: &StationView<'_>, srst: usize) -> usize {
        let min_drop = view.config.phase.srst_min_drop;
        let (sus, us) = (view.sus(), view.series.u());
        if !is_valid(sus[srst]) {
            return srst;
        }
        let m30 = view.iv(30);
        (srst..view.len())
            .take_while(|&idx| valid_mean(&us[window(idx, m30, us.len())]).is_some_and(|m| sus[srst] - m < min_drop))
            .last()
            .unwrap_or(srst)
    }

    // ========================================================================
    // LST, SIST, PST
    // ========================================================================

    /// Slowest analysis-speed sample strictly between snow start and NCRT.
    pub fn lst(view: &StationView<'_>, ncrt: usize) -> Option<usize> {
        let from = view.snow_start() + 1;
        if from >= ncrt.min(view.len()) {
            return None;
        }
        valid_argmin(&view.sus()[from..ncrt.min(view.len())]).map(|i| i + from)
    }

    /// Speed-increase start: the end of the trough plateau before NCRT.
    ///
    /// Unset when the speed at NCRT is still congested. Never earlier than
    /// `lst`, and unset when not before NCRT.
    pub fn sist(view: &StationView<'_>, lst: Option<usize>, ncrt: usize) -> Option<usize> {
        let tol = view.config.phase.sist_step_tolerance;
        let (sus, qus) = (view.sus(), &view.smoothed.stepped_u);
        let n = view.len();
        if ncrt >= n || !is_valid(sus[ncrt]) || sus[ncrt] < view.config.threshold.congested_speed {
            return None;
        }

        let step = |i: usize| -> Option<f64> { (is_valid(qus[i]) && is_valid(qus[i + 1])).then(|| qus[i + 1] - qus[i]) };
        // Back over the recovery ramp and the flat trough
        let mut sist = (1..=ncrt)
            .rev()
            .take_while(|&i| step(i - 1).map_or(true, |d| d >= -tol))
            .last()
            .unwrap_or(ncrt);
        // Forward to where the rise begins
        sist = (sist..ncrt)
            .take_while(|&i| step(i).map_or(true, |d| d < tol))
            .last()
            .unwrap_or(sist);

        let m30 = view.iv(30);
        let around = sist.saturating_sub(m30)..(sist + m30).min(n);
        if let Some(off) = valid_argmin(&sus[around.clone()]) {
            sist = around.start + off;
        }
        if ncrt.saturating_sub(sist) > m30 {
            if let Some(off) = valid_argmin(&sus[sist..ncrt]) {
                sist += off;
            }
        }
        if let Some(l) = lst {
            sist = sist.max(l);
        }
        (sist < ncrt).then_some(sist)
    }

    /// Pavement-stable time: the first index at which speed reaches the
    /// limit and holds it for an hour.
    ///
    /// Starts at SIST when it is below the limit, otherwise at LST. The
    /// hour is clipped at the data end but must span at least 30 min. An
    /// index is skipped while more than an hour of the remaining data still
    /// drops `pst_drop_margin` below the limit.
    pub fn pst(view: &StationView<'_>, sist: Option<usize>, lst: Option<usize>) -> Option<usize> {
        let sus = view.sus();
        let n = view.len();
        let limit = view.speed_limit;
        let low = limit - view.config.phase.pst_drop_margin;
        let (h1, m30) = (view.iv(60), view.iv(30));

        let start = match sist {
            Some(s) if s < n && is_valid(sus[s]) && sus[s] < limit => Some(s),
            _ => lst,
        }?;

        // Samples below `low` in [idx, n), maintained as idx advances
        let mut remaining_low = sus[start..].iter().filter(|u| is_valid(**u) && **u < low).count();
        for idx in start..n {
            let w = window(idx, h1, n);
            if w.len() < m30 {
                break;
            }
            let here_low = is_valid(sus[idx]) && sus[idx] < low;
            if remaining_low <= h1
                && is_valid(sus[idx])
                && sus[idx] >= limit
                && valid_min(&sus[w]).is_some_and(|m| m >= limit)
            {
                return Some(idx);
            }
            if here_low {
                remaining_low -= 1;
            }
        }
        None
    }
}
