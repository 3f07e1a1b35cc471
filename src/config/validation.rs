//! Config validation: unknown-key detection with Levenshtein suggestions
//! and range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for `EstimationConfig`.
///
/// Maintained by hand to match the struct hierarchy in estimation_config.rs.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [data]
        "data",
        "data.interval_secs",
        // [smoothing]
        "smoothing",
        "smoothing.analysis_window_min",
        "smoothing.trend_window_min",
        "smoothing.min_valid_fraction",
        "smoothing.speed_step",
        "smoothing.density_step",
        "smoothing.align_speed_step",
        // [ffs]
        "ffs",
        "ffs.ffs_k",
        "ffs.low_k",
        "ffs.percentile",
        "ffs.min_baseline_samples",
        "ffs.default_kt",
        // [threshold]
        "threshold",
        "threshold.rth_start",
        "threshold.rth_step",
        "threshold.rth_max",
        "threshold.sustain_margin",
        "threshold.worst_separation",
        "threshold.worst_undershoot",
        "threshold.min_recovery_k",
        "threshold.congested_speed",
        "threshold.worst_min_k",
        "threshold.recovered_ratio",
        "threshold.stable_speed_span",
        "threshold.snow_reduction_drop",
        "threshold.snow_reduction_k_rise",
        "threshold.temporary_drop_ratio",
        "threshold.max_partial_recovery_restarts",
        // [phase]
        "phase",
        "phase.srst_ratio_drop",
        "phase.night_ratio_threshold",
        "phase.srst_min_drop",
        "phase.pst_drop_margin",
        "phase.srst_worst_margin",
        "phase.srst_start_drop",
        "phase.sist_step_tolerance",
        // [segment]
        "segment",
        "segment.tracking_distance",
        "segment.vertical_slope",
        "segment.vertical_min_du",
        "segment.same_k_limit",
        "segment.parallel_degree",
        "segment.little_hill_k",
        "segment.little_hill_u",
        // [section]
        "section",
        "section.min_spread_min",
        "section.outlier_deviation_min",
        "section.plausible_ratio",
        "section.max_low_ratio_min",
        "section.low_ratio_min_k",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for &k in known {
        let dist = levenshtein(unknown, k);
        if dist > 3 {
            continue;
        }
        // Ties resolve alphabetically so suggestions do not depend on hash order
        let better = match best {
            None => true,
            Some((bk, bd)) => dist < bd || (dist == bd && k < bk),
        };
        if better {
            best = Some((k, dist));
        }
    }
    best.map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// Unknown keys never fail a load.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are reported by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Range Validation
// ============================================================================

/// Validate value ranges on a parsed `EstimationConfig`.
///
/// Returns (errors, warnings). Errors are values the estimator cannot run
/// with; warnings are legal but far from the calibrated values.
pub fn validate_ranges(config: &super::EstimationConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if config.data.interval_secs == 0 {
        errors.push("data.interval_secs must be > 0".to_string());
    } else if 3600 % config.data.interval_secs != 0 {
        warnings.push(ValidationWarning {
            field: "data.interval_secs".to_string(),
            message: format!(
                "data.interval_secs = {} does not divide an hour; window lengths are truncated",
                config.data.interval_secs
            ),
            suggestion: None,
        });
    }

    let s = &config.smoothing;
    if s.analysis_window_min == 0 || s.trend_window_min == 0 {
        errors.push("smoothing windows must be > 0 minutes".to_string());
    }
    if !(s.min_valid_fraction > 0.0 && s.min_valid_fraction <= 1.0) {
        errors.push(format!(
            "smoothing.min_valid_fraction = {} must be in (0, 1]",
            s.min_valid_fraction
        ));
    }
    for (name, step) in [
        ("smoothing.speed_step", s.speed_step),
        ("smoothing.density_step", s.density_step),
        ("smoothing.align_speed_step", s.align_speed_step),
    ] {
        if !(step.is_finite() && step > 0.0) {
            errors.push(format!("{name} = {step} must be > 0"));
        }
    }

    if config.ffs.percentile == 0 || config.ffs.percentile > 100 {
        errors.push(format!(
            "ffs.percentile = {} must be in 1..=100",
            config.ffs.percentile
        ));
    }

    for (name, ratio) in [
        ("threshold.rth_start", config.threshold.rth_start),
        ("threshold.rth_max", config.threshold.rth_max),
        ("threshold.recovered_ratio", config.threshold.recovered_ratio),
        ("threshold.temporary_drop_ratio", config.threshold.temporary_drop_ratio),
        ("phase.night_ratio_threshold", config.phase.night_ratio_threshold),
        ("section.plausible_ratio", config.section.plausible_ratio),
    ] {
        if !(ratio > 0.0 && ratio <= 1.0) {
            errors.push(format!("{name} = {ratio} must be in (0, 1]"));
        }
    }

    if config.ffs.ffs_k > 60.0 {
        warnings.push(ValidationWarning {
            field: "ffs.ffs_k".to_string(),
            message: format!(
                "ffs.ffs_k = {:.1} is above typical free-flow densities (20-30)",
                config.ffs.ffs_k
            ),
            suggestion: None,
        });
    }
    if config.section.outlier_deviation_min < config.section.min_spread_min {
        warnings.push(ValidationWarning {
            field: "section.outlier_deviation_min".to_string(),
            message: "section.outlier_deviation_min is below section.min_spread_min; most spreads will reject members".to_string(),
            suggestion: None,
        });
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("window", "window"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("percentil", "percentile"), 1);
    }

    #[test]
    fn test_levenshtein_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [threshold]
            rth_start = 0.7
        "#
        .parse()
        .expect("valid toml");
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"threshold".to_string()));
        assert!(keys.contains(&"threshold.rth_start".to_string()));
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let warnings = validate_unknown_keys("[ffs]\npercentil = 80\n");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].suggestion.as_deref(), Some("ffs.percentile"));
    }

    #[test]
    fn test_all_valid_keys_produce_zero_warnings() {
        let warnings = validate_unknown_keys(
            r#"
[data]
interval_secs = 30

[section]
outlier_deviation_min = 120
"#,
        );
        assert!(warnings.is_empty(), "unexpected warnings: {warnings:?}");
    }

    #[test]
    fn test_suggest_correction_no_match_for_garbage() {
        let known = known_config_keys();
        assert!(suggest_correction("completely_unrelated_garbage_key", &known).is_none());
    }

    #[test]
    fn test_ranges_defaults_clean() {
        let (errors, warnings) = validate_ranges(&crate::config::EstimationConfig::default());
        assert!(errors.is_empty(), "{errors:?}");
        assert!(warnings.is_empty(), "{warnings:?}");
    }

    #[test]
    fn test_zero_interval_is_error() {
        let mut config = crate::config::EstimationConfig::default();
        config.data.interval_secs = 0;
        let (errors, _) = validate_ranges(&config);
        assert!(errors.iter().any(|e| e.contains("interval_secs")));
    }

    #[test]
    fn test_odd_interval_warns() {
        let mut config = crate::config::EstimationConfig::default();
        config.data.interval_secs = 7;
        let (errors, warnings) = validate_ranges(&config);
        assert!(errors.is_empty());
        assert!(warnings.iter().any(|w| w.field == "data.interval_secs"));
    }
}
