//! Recovery-point search and Type-1 NCRT determination
//!
//! All scans run on the analysis-window series of a [`StationView`].
//! Windows that would run past the data end are clipped.

use tracing::debug;

use crate::pipeline::StationView;
use crate::processing::stats::{self, valid_argmin, valid_mean, valid_min, window};
use crate::segment::relation::has_near_ks;
use crate::segment::{HillSegmenter, Relation, Segment, TrajectoryBuilder, Trend};
use crate::types::is_valid;

use super::RecoveryPoint;

// ============================================================================
// Search start
// ============================================================================

/// Worst point of the storm.
///
/// Within the snow window (at most its last 24 h), the minimum ratio to
/// normal among uncongested samples of moderate density; then the slowest
/// sample within 30 min of it.
pub fn worst_ratio_point(view: &StationView<'_>) -> Option<usize> {
    let cfg = &view.config.threshold;
    let (sus, sks, ratios) = (view.sus(), view.sks(), &view.ratios.normal);
    let end = view.snow_end();
    let start = view.snow_start().max(end.saturating_sub(view.iv(24 * 60)));

    let candidates = |band: &dyn Fn(f64) -> bool| -> Vec<usize> {
        (start..end)
            .filter(|&i| is_valid(ratios[i]) && is_valid(sus[i]) && is_valid(sks[i]))
            .filter(|&i| sus[i] > cfg.congested_speed && band(sks[i]))
            .collect()
    };
    let mut idxs = candidates(&|k| k > cfg.worst_min_k && k < view.kt);
    if idxs.is_empty() {
        idxs = candidates(&|k| k > cfg.worst_min_k);
    }
    if idxs.is_empty() {
        idxs = (start..end).filter(|&i| is_valid(ratios[i])).collect();
    }

    let widx = idxs.into_iter().reduce(|best, i| if ratios[i] < ratios[best] { i } else { best })?;
    let half = view.iv(30);
    let lo = widx.saturating_sub(half);
    let hi = (widx + half).min(view.len().saturating_sub(1));
    valid_argmin(&sus[lo..hi.max(lo + 1)]).map(|i| i + lo)
}

/// Ends of speed reductions at near-constant, uncongested density.
///
/// Found on the hills of the analysis series: a falling speed hill,
/// extended over little hills, that drops at least `snow_reduction_drop`
/// while density rises at most `snow_reduction_k_rise`, with both ends
/// below `kt` and ending before snow end + 2 h. Drops that regain
/// `temporary_drop_ratio * FFS` within 30 min are ignored, as are
/// low-density nighttime drops.
pub fn snow_change_points(view: &StationView<'_>) -> Vec<usize> {
    let t = &view.config.threshold;
    let s = &view.config.segment;
    let (sus, sks) = (view.sus(), view.sks());
    let limit = view.snow_end() + view.iv(120);
    let hills = HillSegmenter::segment(sks, sus);

    let mut points = Vec::new();
    let mut h = 0;
    while h < hills.len() {
        if hills[h].trend_u() != Trend::Decrease {
            h += 1;
            continue;
        }
        let (first, last) = HillSegmenter::extend(&hills, h, s.little_hill_k, s.little_hill_u);
        let Some(merged) = HillSegmenter::merge(&hills, first, last) else {
            break;
        };
        h = last.max(h) + 1;
        if merged.eidx >= limit {
            break;
        }

        let (start, end) = merged.endpoints();
        let night = view.ratios.is_night(merged.sidx) && view.ratios.is_night(merged.eidx);
        if night && start.k < view.config.ffs.low_k && end.k < view.config.ffs.low_k {
            continue;
        }
        if start.k > view.kt || end.k > view.kt {
            continue;
        }
        if merged.speed_drop() >= t.snow_reduction_drop
            && merged.density_rise() <= t.snow_reduction_k_rise
            && !is_temporary_drop(view, merged.eidx)
        {
            debug!(sidx = merged.sidx, eidx = merged.eidx, drop = merged.speed_drop(), "Snow reduction");
            points.push(merged.eidx);
        }
    }
    points
}

fn is_temporary_drop(view: &StationView<'_>, idx: usize) -> bool {
    let target = view.config.threshold.temporary_drop_ratio * view.ffs;
    let w = window(idx + 1, view.iv(30), view.len());
    stats::valid_max(&view.sus()[w]).is_some_and(|u| u >= target)
}

/// Latest of the worst point, the snow change points and an external hint.
pub fn search_start(worst: usize, change_points: &[usize], hint: Option<usize>) -> usize {
    change_points
        .iter()
        .copied()
        .chain(hint)
        .fold(worst, usize::max)
}

// ============================================================================
// Recovery point
// ============================================================================

/// First sustained crossing of `uth` at or after `from`.
///
/// Index `i` qualifies when its speed exceeds `uth` and either the next
/// hour never drops below `uth + sustain_margin`, or every sample of the
/// next 2 h at a density no higher than `k[i]` stays above `uth`. The
/// candidate is then refined against the speed at the worst point `widx`.
pub fn find_recovery_point(view: &StationView<'_>, from: usize, uth: f64, widx: usize) -> Option<RecoveryPoint> {
    let cfg = &view.config.threshold;
    let (sus, sks) = (view.sus(), view.sks());
    let n = view.len();
    let (h1, h2, m30) = (view.iv(60), view.iv(120), view.iv(30));

    let mut recovered = None;
    for idx in from..n.saturating_sub(h1) {
        if !is_valid(sus[idx]) || sus[idx] <= uth {
            continue;
        }
        if valid_min(&sus[idx..idx + h1]).is_some_and(|m| m > uth + cfg.sustain_margin) {
            recovered = Some(idx);
            break;
        }
        if is_valid(sks[idx]) {
            let w = window(idx, h2, n);
            let mut at_lower_k = sks[w.clone()]
                .iter()
                .zip(&sus[w])
                .filter(|(k, u)| is_valid(**k) && is_valid(**u) && **k <= sks[idx])
                .map(|(_, u)| *u)
                .peekable();
            if at_lower_k.peek().is_some() && at_lower_k.all(|u| u > uth) {
                recovered = Some(idx);
                break;
            }
        }
    }
    let mut rec = recovered?;

    let worst_window = widx.saturating_sub(m30)..(widx + m30).min(n);
    if let Some(worstu) = valid_min(&sus[worst_window]) {
        if sus[rec] - worstu < cfg.worst_separation {
            rec = refine_against_worst(view, rec, uth, worstu);
        }
    }

    debug!(recovery = rec, speed = sus[rec], uth, "Recovery point");
    Some(RecoveryPoint {
        index: rec,
        k_at_recovery: sks[rec].max(cfg.min_recovery_k),
    })
}

/// Move a recovery that sits too close to the worst speed.
///
/// Forward to the first point whose next 30 min all clear the worst speed
/// by the separation, then back to the knee where speed stopped rising. A
/// renewed drop below the worst speed instead moves the recovery to the
/// first later point above `uth` whose 30-min mean also exceeds `uth`.
fn refine_against_worst(view: &StationView<'_>, rec: usize, uth: f64, worstu: f64) -> usize {
    let cfg = &view.config.threshold;
    let sus = view.sus();
    let n = view.len();
    let m30 = view.iv(30);

    for idx in rec..n.saturating_sub(m30) {
        if valid_min(&sus[idx..idx + m30]).is_some_and(|m| m > worstu + cfg.worst_separation) {
            return (rec + 1..=idx)
                .rev()
                .find(|&t| is_valid(sus[t]) && is_valid(sus[t - 1]) && sus[t] <= sus[t - 1])
                .unwrap_or(rec);
        }
        if is_valid(sus[idx]) && sus[idx] < worstu - cfg.worst_undershoot {
            return (idx..n.saturating_sub(m30))
                .find(|&t| sus[t] > uth && valid_mean(&sus[t..t + m30]).is_some_and(|m| m > uth))
                .unwrap_or(rec);
        }
    }
    rec
}

/// Last index the NCRT may take.
pub fn ncrt_search_end(view: &StationView<'_>, recovery: usize) -> usize {
    let n = view.len();
    let last = n.saturating_sub(1);
    let h1 = view.iv(60);
    let mut to = (recovery + view.iv(6 * 60)).min(n.saturating_sub(h1));
    to = to.max(view.snow_end() + view.iv(4 * 60)).min(last);

    let sks = view.sks();
    let ffs_k = view.config.ffs.ffs_k;
    if is_valid(sks[to]) && sks[to] > ffs_k {
        if let Some(off) = sks[to..].iter().position(|k| is_valid(*k) && *k < ffs_k) {
            to = (to + off + h1).min(last);
        }
    }
    to
}

// ============================================================================
// Type-1 NCRT
// ============================================================================

/// First index in `[recovery, end]` whose ratio to normal reaches the
/// recovered ratio and holds it for the following hour, refined to a
/// stable free-flow hour and aligned to the start of its speed plateau.
pub fn determine_ncrt(view: &StationView<'_>, recovery: usize, end: usize) -> Option<usize> {
    let cfg = &view.config.threshold;
    let ratios = &view.ratios.normal;
    let n = view.len();
    let h1 = view.iv(60);

    let mut ncrt = (recovery..=end.min(n.saturating_sub(1))).find(|&i| {
        is_valid(ratios[i])
            && ratios[i] >= cfg.recovered_ratio
            && valid_min(&ratios[window(i, h1, n)]).is_some_and(|m| m >= cfg.recovered_ratio)
    })?;

    let recovered_speed = cfg.recovered_ratio * view.ffs;
    let sks = view.sks();
    if is_valid(sks[ncrt]) && sks[ncrt] < view.config.ffs.ffs_k {
        ncrt = stable_speed_point(view, ncrt, recovered_speed);
    }

    let sus = view.sus();
    if sus[ncrt] > recovered_speed - cfg.stable_speed_span {
        if let Some(moved) = align_to_plateau(view, ncrt) {
            if moved.abs_diff(ncrt) < h1 {
                ncrt = moved;
            }
        }
    }
    debug!(ncrt, speed = sus[ncrt], ratio = ratios[ncrt], "Type-1 NCRT");
    Some(ncrt)
}

/// First index within 2 h whose following hour is neither strictly rising
/// nor strictly falling, spans at most `stable_speed_span` and sits at or
/// above `recovered_speed`. Falls back to the first index at or above
/// `recovered_speed`, then to `ncrt` itself.
fn stable_speed_point(view: &StationView<'_>, ncrt: usize, recovered_speed: f64) -> usize {
    let span = view.config.threshold.stable_speed_span;
    let sus = view.sus();
    let n = view.len();
    let (h1, h2) = (view.iv(60), view.iv(120));
    let range = ncrt..(ncrt + h2).min(n);

    let stable = range.clone().find(|&idx| {
        let to = (idx + h1).min(n - 1);
        let w: Vec<f64> = sus[idx..=to].iter().copied().filter(|v| is_valid(*v)).collect();
        if w.len() < 2 || !is_valid(sus[idx]) {
            return false;
        }
        let rising = w.windows(2).all(|p| p[1] > p[0]);
        let falling = w.windows(2).all(|p| p[1] < p[0]);
        if rising || falling {
            return false;
        }
        let (minu, maxu) = w.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(a, b), &v| (a.min(v), b.max(v)));
        let avgu = w.iter().sum::<f64>() / w.len() as f64;
        maxu - minu <= span && sus[idx] >= recovered_speed && avgu >= recovered_speed
    });

    stable
        .or_else(|| range.clone().find(|&i| is_valid(sus[i]) && sus[i] >= recovered_speed))
        .unwrap_or(ncrt)
}

/// Walk back over the step-2 plateau holding `idx`, then forward from its
/// first sample to the first one whose speed reaches the plateau level.
///
/// Never moves past `idx`. `None` when the plateau runs back to the start
/// of the data.
fn align_to_plateau(view: &StationView<'_>, idx: usize) -> Option<usize> {
    let aligned = &view.smoothed.aligned_u;
    let sus = view.sus();
    let step = view.config.smoothing.align_speed_step;
    let qu = aligned[idx];
    if !is_valid(qu) {
        return None;
    }
    let stick = (1..=idx)
        .rev()
        .find(|&i| is_valid(aligned[i]) && (qu - aligned[i]).abs() >= step)?
        + 1;
    (stick..=idx).find(|&t| t == idx || (is_valid(sus[t]) && sus[t] >= qu))
}

// ============================================================================
// Partial recovery
// ============================================================================

/// Index to restart the recovery search from when the recovery at
/// `recovery` was only partial, `None` when it stands.
///
/// The trajectory over `[from, end]` is grouped; the recovery group holding
/// `recovery` is compared with every later group. A later reduction under
/// it, a later recovery over it, or a steep drop after it marks it partial.
pub fn partial_recovery_restart(view: &StationView<'_>, from: usize, recovery: usize, end: usize) -> Option<usize> {
    let cfg = &view.config.segment;
    let trajectory = TrajectoryBuilder::build(
        view.sks(),
        view.sus(),
        from..end.saturating_add(1),
        |i| view.ratios.is_night(i),
        cfg,
    );
    let g = trajectory.group_at(recovery)?;
    let host = &trajectory.groups[g];
    if !host.is_recovery() {
        return None;
    }

    trajectory.groups[g + 1..].iter().find_map(|later| {
        let under = Relation::UnderRecovery.holds(host, later, cfg);
        let over = later.is_recovery()
            && Relation::Over.holds(later, host, cfg)
            && !has_near_ks(host, later, cfg.same_k_limit);
        let drop = Relation::VerticalDown.holds(host, later, cfg);
        (under || over || drop).then(|| {
            debug!(group = later.idx, under, over, drop, "Partial recovery");
            later.eidx() + 1
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::baseline::RatioSeries;
    use crate::config::EstimationConfig;
    use crate::processing::{SignalPreprocessor, SmoothedSeries};
    use crate::types::{SnowEvent, TimeSeries};
    use chrono::NaiveDate;

    struct Fixture {
        series: TimeSeries,
        smoothed: SmoothedSeries,
        ratios: RatioSeries,
        event: SnowEvent,
        config: EstimationConfig,
    }

    impl Fixture {
        /// Density rises 25 veh/mi for every 40 mph lost below 58.
        fn new(u: Vec<f64>) -> Self {
            let k: Vec<f64> = u.iter().map(|&v| 20.0 + (58.0 - v) * 25.0 / 40.0).collect();
            let series = TimeSeries::from_speed_density(u, k).expect("valid series");
            let config = EstimationConfig::default();
            let smoothed = SignalPreprocessor::run(&series, &config).expect("smoothed");
            let t0 = NaiveDate::from_ymd_opt(2024, 1, 12)
                .and_then(|d| d.and_hms_opt(6, 0, 0))
                .expect("valid timestamp");
            let event = SnowEvent::from_indices(t0, 40, 130, 30).expect("valid event");
            let ratios = RatioSeries::build(smoothed.analysis(), smoothed.long(), None, 60.0, &event);
            Self { series, smoothed, ratios, event, config }
        }

        fn view(&self) -> StationView<'_> {
            StationView {
                series: &self.series,
                smoothed: &self.smoothed,
                ratios: &self.ratios,
                event: &self.event,
                ffs: 60.0,
                kt: 25.0,
                speed_limit: 55.0,
                config: &self.config,
            }
        }
    }

    /// 58 mph, down to 18 over 50-69, trough until `trough_end`, back up
    /// over the next 20 samples.
    fn storm(trough_end: usize) -> Vec<f64> {
        (0..300usize)
            .map(|i| match i {
                0..=49 => 58.0,
                50..=69 => 58.0 - 2.0 * (i - 49) as f64,
                _ if i <= trough_end => 18.0,
                _ if i <= trough_end + 20 => 18.0 + 2.0 * (i - trough_end) as f64,
                _ => 58.0,
            })
            .collect()
    }

    #[test]
    fn test_search_start_takes_the_latest() {
        assert_eq!(search_start(78, &[], None), 78);
        assert_eq!(search_start(78, &[60, 90], None), 90);
        assert_eq!(search_start(78, &[90], Some(120)), 120);
        assert_eq!(search_start(78, &[], Some(10)), 78);
    }

    #[test]
    fn test_worst_point_sits_in_the_storm() {
        let f = Fixture::new(storm(119));
        let view = f.view();
        let worst = worst_ratio_point(&view).expect("worst point");
        assert!((40..=130).contains(&worst), "worst at {worst}");
        assert!(view.sus()[worst] < 40.0);
    }

    #[test]
    fn test_ramp_with_rising_density_is_no_snow_reduction() {
        let f = Fixture::new(storm(119));
        assert!(snow_change_points(&f.view()).is_empty());
    }

    #[test]
    fn test_recovery_point_after_the_ramp() {
        let f = Fixture::new(storm(119));
        let view = f.view();
        let rec = find_recovery_point(&view, 78, 42.0, 78).expect("recovers");
        assert!((138..=150).contains(&rec.index), "recovery at {}", rec.index);
        assert!(view.sus()[rec.index] > 42.0);
        assert!(rec.k_at_recovery >= view.config.threshold.min_recovery_k);
    }

    #[test]
    fn test_no_recovery_when_the_trough_never_ends() {
        let f = Fixture::new(storm(400));
        assert!(find_recovery_point(&f.view(), 78, 42.0, 78).is_none());
    }

    #[test]
    fn test_search_end_covers_four_hours_after_snow() {
        let f = Fixture::new(storm(119));
        // Snow end + 4 h lies past the data, so the end is the last sample
        assert_eq!(ncrt_search_end(&f.view(), 142), 299);
    }

    #[test]
    fn test_ncrt_lands_on_the_recovered_plateau() {
        let f = Fixture::new(storm(119));
        let view = f.view();
        let ncrt = determine_ncrt(&view, 142, 299).expect("ncrt");
        assert!((165..=185).contains(&ncrt), "ncrt at {ncrt}");
        assert!(view.sus()[ncrt] > 50.0);
    }

    #[test]
    fn test_plateau_alignment_never_moves_forward() {
        let f = Fixture::new(storm(119));
        let view = f.view();
        for idx in 130..200 {
            if let Some(moved) = align_to_plateau(&view, idx) {
                assert!(moved <= idx, "{idx} moved to {moved}");
            }
        }
        // The smoothed speed only reaches the last plateau's level after 192
        assert_eq!(align_to_plateau(&view, 192), Some(192));
    }

    #[test]
    fn test_ncrt_needs_the_recovered_ratio() {
        // Back only to 48 mph, a ratio of 0.8
        let u: Vec<f64> = storm(119).into_iter().map(|v| v.min(48.0)).collect();
        let f = Fixture::new(u);
        assert_eq!(determine_ncrt(&f.view(), 142, 299), None);
    }

    #[test]
    fn test_clean_recovery_is_not_partial() {
        let f = Fixture::new(storm(119));
        assert_eq!(partial_recovery_restart(&f.view(), 78, 142, 299), None);
    }
}
