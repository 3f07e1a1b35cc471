//! Estimation Configuration - every tuned margin as an operator-tunable TOML value
//!
//! Each struct implements `Default` with the constants in [`super::defaults`],
//! so a missing file or a missing key yields the calibrated behavior.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "NCRT_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "ncrt_config.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration of the estimator.
///
/// Load with `EstimationConfig::load()` which searches:
/// 1. `$NCRT_CONFIG` env var
/// 2. `./ncrt_config.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EstimationConfig {
    /// Sampling layout of the input series
    #[serde(default)]
    pub data: DataConfig,

    /// Smoothing windows and plateau steps
    #[serde(default)]
    pub smoothing: SmoothingConfig,

    /// Free-flow speed determination
    #[serde(default)]
    pub ffs: FfsConfig,

    /// Speed threshold and recovery-point search
    #[serde(default)]
    pub threshold: ThresholdConfig,

    /// Phase detector margins
    #[serde(default)]
    pub phase: PhaseConfig,

    /// U-K trajectory segmentation
    #[serde(default)]
    pub segment: SegmentConfig,

    /// Section consensus
    #[serde(default)]
    pub section: SectionConfig,
}

impl EstimationConfig {
    /// Load configuration using the standard search order:
    /// 1. `$NCRT_CONFIG` environment variable
    /// 2. `./ncrt_config.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), interval_secs = config.data.interval_secs, "Loaded estimation config from NCRT_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from NCRT_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "NCRT_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(interval_secs = config.data.interval_secs, "Loaded estimation config from ./ncrt_config.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./ncrt_config.toml, using defaults");
                }
            }
        }

        info!("No ncrt_config.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    ///
    /// Unknown keys only produce warnings; range errors and inconsistent
    /// values fail the load.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, err) => ConfigError::Parse(path.to_path_buf(), err),
            other => other,
        })
    }

    /// Parse and validate configuration held in memory.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<memory>"), e))?;
        config.validate()?;
        for w in super::validation::validate_ranges(&config).1 {
            warn!("{}", w);
        }
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Save config to a file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Estimation config saved");
        Ok(())
    }

    /// Validate all values for internal consistency.
    ///
    /// Rules:
    /// - The data interval and every window must be positive
    /// - The rth ladder must climb (`start < max`, `step > 0`)
    /// - `LOW_K` must sit below `FFS_K`
    /// - Ratios and fractions must lie in (0, 1]
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (mut errors, _) = super::validation::validate_ranges(self);

        let t = &self.threshold;
        if t.rth_step <= 0.0 || !t.rth_step.is_finite() {
            errors.push(format!("threshold.rth_step = {} must be > 0", t.rth_step));
        }
        if t.rth_start >= t.rth_max {
            errors.push(format!(
                "threshold.rth_start ({:.2}) must be < threshold.rth_max ({:.2})",
                t.rth_start, t.rth_max
            ));
        }
        if self.ffs.low_k >= self.ffs.ffs_k {
            errors.push(format!(
                "ffs.low_k ({:.1}) must be < ffs.ffs_k ({:.1})",
                self.ffs.low_k, self.ffs.ffs_k
            ));
        }
        if self.smoothing.trend_window_min < self.smoothing.analysis_window_min {
            errors.push(format!(
                "smoothing.trend_window_min ({}) must be >= smoothing.analysis_window_min ({})",
                self.smoothing.trend_window_min, self.smoothing.analysis_window_min
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Number of samples covering `minutes` at the configured interval.
    ///
    /// Never returns zero so that look-ahead windows always hold a sample.
    pub fn intervals(&self, minutes: u32) -> usize {
        let secs = u64::from(minutes) * 60;
        let interval = u64::from(self.data.interval_secs.max(1));
        usize::try_from(secs / interval).unwrap_or(usize::MAX).max(1)
    }

    /// Odd window length for a centered moving average spanning `minutes`.
    pub fn window_len(&self, minutes: u32) -> usize {
        let n = self.intervals(minutes);
        n / 2 * 2 + 1
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Data
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Seconds between consecutive samples
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u32,
}

fn default_interval_secs() -> u32 { defaults::DATA_INTERVAL_SECS }

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
        }
    }
}

// ============================================================================
// Smoothing
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothingConfig {
    /// Window of the series all searches run on (minutes)
    #[serde(default = "default_analysis_window")]
    pub analysis_window_min: u32,
    /// Window of the long trend series (minutes)
    #[serde(default = "default_trend_window")]
    pub trend_window_min: u32,
    /// Minimum valid share of a smoothing window
    #[serde(default = "default_min_valid_fraction")]
    pub min_valid_fraction: f64,
    /// Plateau step of the stepped speed series
    #[serde(default = "default_speed_step")]
    pub speed_step: f64,
    /// Plateau step of the stepped density series
    #[serde(default = "default_density_step")]
    pub density_step: f64,
    /// Plateau step used for NCRT alignment
    #[serde(default = "default_align_speed_step")]
    pub align_speed_step: f64,
}

fn default_analysis_window() -> u32 { defaults::ANALYSIS_WINDOW_MIN }
fn default_trend_window() -> u32 { defaults::TREND_WINDOW_MIN }
fn default_min_valid_fraction() -> f64 { defaults::MIN_VALID_FRACTION }
fn default_speed_step() -> f64 { defaults::SPEED_STEP }
fn default_density_step() -> f64 { defaults::DENSITY_STEP }
fn default_align_speed_step() -> f64 { defaults::ALIGN_SPEED_STEP }

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            analysis_window_min: default_analysis_window(),
            trend_window_min: default_trend_window(),
            min_valid_fraction: default_min_valid_fraction(),
            speed_step: default_speed_step(),
            density_step: default_density_step(),
            align_speed_step: default_align_speed_step(),
        }
    }
}

// ============================================================================
// Free-flow speed
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FfsConfig {
    /// Upper density bound of free-flow samples
    #[serde(default = "default_ffs_k")]
    pub ffs_k: f64,
    /// Lower density bound of free-flow samples
    #[serde(default = "default_low_k")]
    pub low_k: f64,
    /// Percentile of qualifying speeds used as in-situ FFS
    #[serde(default = "default_ffs_percentile")]
    pub percentile: usize,
    /// Supporting samples a baseline FFS needs
    #[serde(default = "default_min_baseline_samples")]
    pub min_baseline_samples: usize,
    /// Uncongested density bound when the baseline has none
    #[serde(default = "default_kt")]
    pub default_kt: f64,
}

fn default_ffs_k() -> f64 { defaults::FFS_K }
fn default_low_k() -> f64 { defaults::LOW_K }
fn default_ffs_percentile() -> usize { defaults::FFS_PERCENTILE }
fn default_min_baseline_samples() -> usize { defaults::MIN_BASELINE_SAMPLES }
fn default_kt() -> f64 { defaults::DEFAULT_KT }

impl Default for FfsConfig {
    fn default() -> Self {
        Self {
            ffs_k: default_ffs_k(),
            low_k: default_low_k(),
            percentile: default_ffs_percentile(),
            min_baseline_samples: default_min_baseline_samples(),
            default_kt: default_kt(),
        }
    }
}

// ============================================================================
// Threshold & recovery search
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default = "default_rth_start")]
    pub rth_start: f64,
    #[serde(default = "default_rth_step")]
    pub rth_step: f64,
    #[serde(default = "default_rth_max")]
    pub rth_max: f64,
    /// Margin above uth the following hour must hold
    #[serde(default = "default_sustain_margin")]
    pub sustain_margin: f64,
    /// Separation a recovery needs from the worst speed
    #[serde(default = "default_worst_separation")]
    pub worst_separation: f64,
    /// Undershoot below the worst speed that restarts the refinement
    #[serde(default = "default_worst_undershoot")]
    pub worst_undershoot: f64,
    /// Floor of the density reported with a recovery point
    #[serde(default = "default_min_recovery_k")]
    pub min_recovery_k: f64,
    /// Speed below which a sample is congested
    #[serde(default = "default_congested_speed")]
    pub congested_speed: f64,
    /// Density floor of worst-ratio candidates
    #[serde(default = "default_worst_min_k")]
    pub worst_min_k: f64,
    /// Ratio to normal counted as recovered
    #[serde(default = "default_recovered_ratio")]
    pub recovered_ratio: f64,
    /// Span of a stable free-flow hour
    #[serde(default = "default_stable_speed_span")]
    pub stable_speed_span: f64,
    /// Speed drop of a snow reduction
    #[serde(default = "default_snow_reduction_drop")]
    pub snow_reduction_drop: f64,
    /// Density rise tolerated in a snow reduction
    #[serde(default = "default_snow_reduction_k_rise")]
    pub snow_reduction_k_rise: f64,
    /// Ratio to FFS that marks a reduction as temporary
    #[serde(default = "default_temporary_drop_ratio")]
    pub temporary_drop_ratio: f64,
    /// Restarts after a rejected partial recovery
    #[serde(default = "default_max_partial_restarts")]
    pub max_partial_recovery_restarts: usize,
}

fn default_rth_start() -> f64 { defaults::RTH_START }
fn default_rth_step() -> f64 { defaults::RTH_STEP }
fn default_rth_max() -> f64 { defaults::RTH_MAX }
fn default_sustain_margin() -> f64 { defaults::SUSTAIN_MARGIN }
fn default_worst_separation() -> f64 { defaults::WORST_SEPARATION }
fn default_worst_undershoot() -> f64 { defaults::WORST_UNDERSHOOT }
fn default_min_recovery_k() -> f64 { defaults::MIN_RECOVERY_K }
fn default_congested_speed() -> f64 { defaults::CONGESTED_SPEED }
fn default_worst_min_k() -> f64 { defaults::WORST_MIN_K }
fn default_recovered_ratio() -> f64 { defaults::RECOVERED_RATIO }
fn default_stable_speed_span() -> f64 { defaults::STABLE_SPEED_SPAN }
fn default_snow_reduction_drop() -> f64 { defaults::SNOW_REDUCTION_DROP }
fn default_snow_reduction_k_rise() -> f64 { defaults::SNOW_REDUCTION_K_RISE }
fn default_temporary_drop_ratio() -> f64 { defaults::TEMPORARY_DROP_RATIO }
fn default_max_partial_restarts() -> usize { defaults::MAX_PARTIAL_RECOVERY_RESTARTS }

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            rth_start: default_rth_start(),
            rth_step: default_rth_step(),
            rth_max: default_rth_max(),
            sustain_margin: default_sustain_margin(),
            worst_separation: default_worst_separation(),
            worst_undershoot: default_worst_undershoot(),
            min_recovery_k: default_min_recovery_k(),
            congested_speed: default_congested_speed(),
            worst_min_k: default_worst_min_k(),
            recovered_ratio: default_recovered_ratio(),
            stable_speed_span: default_stable_speed_span(),
            snow_reduction_drop: default_snow_reduction_drop(),
            snow_reduction_k_rise: default_snow_reduction_k_rise(),
            temporary_drop_ratio: default_temporary_drop_ratio(),
            max_partial_recovery_restarts: default_max_partial_restarts(),
        }
    }
}

// ============================================================================
// Phase detector
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    /// Ratio drop below the pre-storm maximum that marks a reduction
    #[serde(default = "default_srst_ratio_drop")]
    pub srst_ratio_drop: f64,
    /// Night ratio below which a nighttime reduction fires
    #[serde(default = "default_night_ratio_threshold")]
    pub night_ratio_threshold: f64,
    /// Minimum SRST-to-trough drop
    #[serde(default = "default_srst_min_drop")]
    pub srst_min_drop: f64,
    /// Renewed drop below the speed limit tolerated after PST
    #[serde(default = "default_pst_drop_margin")]
    pub pst_drop_margin: f64,
    /// Added to the worst ratio to floor the reduction threshold
    #[serde(default = "default_srst_worst_margin")]
    pub srst_worst_margin: f64,
    /// Stepped-speed drop that ends the quiet lead-in before SRST
    #[serde(default = "default_srst_start_drop")]
    pub srst_start_drop: f64,
    /// Stepped-speed change tolerated while walking to the SIST trough
    #[serde(default = "default_sist_step_tolerance")]
    pub sist_step_tolerance: f64,
}

fn default_srst_ratio_drop() -> f64 { defaults::SRST_RATIO_DROP }
fn default_night_ratio_threshold() -> f64 { defaults::NIGHT_RATIO_THRESHOLD }
fn default_srst_min_drop() -> f64 { defaults::SRST_MIN_DROP }
fn default_pst_drop_margin() -> f64 { defaults::PST_DROP_MARGIN }
fn default_srst_worst_margin() -> f64 { defaults::SRST_WORST_MARGIN }
fn default_srst_start_drop() -> f64 { defaults::SRST_START_DROP }
fn default_sist_step_tolerance() -> f64 { defaults::SIST_STEP_TOLERANCE }

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            srst_ratio_drop: default_srst_ratio_drop(),
            night_ratio_threshold: default_night_ratio_threshold(),
            srst_min_drop: default_srst_min_drop(),
            pst_drop_margin: default_pst_drop_margin(),
            srst_worst_margin: default_srst_worst_margin(),
            srst_start_drop: default_srst_start_drop(),
            sist_step_tolerance: default_sist_step_tolerance(),
        }
    }
}

// ============================================================================
// Segmenter
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentConfig {
    #[serde(default = "default_tracking_distance")]
    pub tracking_distance: f64,
    #[serde(default = "default_vertical_slope")]
    pub vertical_slope: f64,
    #[serde(default = "default_vertical_min_du")]
    pub vertical_min_du: f64,
    #[serde(default = "default_same_k_limit")]
    pub same_k_limit: f64,
    #[serde(default = "default_parallel_degree")]
    pub parallel_degree: f64,
    #[serde(default = "default_little_hill_k")]
    pub little_hill_k: f64,
    #[serde(default = "default_little_hill_u")]
    pub little_hill_u: f64,
}

fn default_tracking_distance() -> f64 { defaults::TRACKING_DISTANCE }
fn default_vertical_slope() -> f64 { defaults::VERTICAL_SLOPE }
fn default_vertical_min_du() -> f64 { defaults::VERTICAL_MIN_DU }
fn default_same_k_limit() -> f64 { defaults::SAME_K_LIMIT }
fn default_parallel_degree() -> f64 { defaults::PARALLEL_DEGREE }
fn default_little_hill_k() -> f64 { defaults::LITTLE_HILL_K }
fn default_little_hill_u() -> f64 { defaults::LITTLE_HILL_U }

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            tracking_distance: default_tracking_distance(),
            vertical_slope: default_vertical_slope(),
            vertical_min_du: default_vertical_min_du(),
            same_k_limit: default_same_k_limit(),
            parallel_degree: default_parallel_degree(),
            little_hill_k: default_little_hill_k(),
            little_hill_u: default_little_hill_u(),
        }
    }
}

// ============================================================================
// Section consensus
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionConfig {
    /// Spread below which Type-1 NCRTs are left alone (minutes)
    #[serde(default = "default_min_spread")]
    pub min_spread_min: u32,
    /// Deviation from the raw mean that marks an outlier (minutes)
    #[serde(default = "default_outlier_deviation")]
    pub outlier_deviation_min: u32,
    /// Ratio a later member must show at a candidate
    #[serde(default = "default_plausible_ratio")]
    pub plausible_ratio: f64,
    /// Time a later member may spend below the ratio (minutes)
    #[serde(default = "default_max_low_ratio")]
    pub max_low_ratio_min: u32,
    /// Density above which a low-ratio sample counts
    #[serde(default = "default_low_ratio_min_k")]
    pub low_ratio_min_k: f64,
}

fn default_min_spread() -> u32 { defaults::MIN_SPREAD_MIN }
fn default_outlier_deviation() -> u32 { defaults::OUTLIER_DEVIATION_MIN }
fn default_plausible_ratio() -> f64 { defaults::PLAUSIBLE_RATIO }
fn default_max_low_ratio() -> u32 { defaults::MAX_LOW_RATIO_MIN }
fn default_low_ratio_min_k() -> f64 { defaults::LOW_RATIO_MIN_K }

impl Default for SectionConfig {
    fn default() -> Self {
        Self {
            min_spread_min: default_min_spread(),
            outlier_deviation_min: default_outlier_deviation(),
            plausible_ratio: default_plausible_ratio(),
            max_low_ratio_min: default_max_low_ratio(),
            low_ratio_min_k: default_low_ratio_min_k(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(EstimationConfig::default().validate().is_ok());
    }

    #[test]
    fn test_intervals_follow_data_interval() {
        let mut config = EstimationConfig::default();
        assert_eq!(config.intervals(60), 120);
        assert_eq!(config.intervals(30), 60);
        config.data.interval_secs = 300;
        assert_eq!(config.intervals(60), 12);
        assert_eq!(config.intervals(1), 1);
    }

    #[test]
    fn test_window_len_is_odd() {
        let config = EstimationConfig::default();
        assert_eq!(config.window_len(60), 121);
        assert_eq!(config.window_len(30), 61);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EstimationConfig::from_toml_str(
            r#"
[data]
interval_secs = 60

[ffs]
percentile = 85
"#,
        )
        .expect("partial config should parse");
        assert_eq!(config.data.interval_secs, 60);
        assert_eq!(config.ffs.percentile, 85);
        assert!((config.ffs.ffs_k - defaults::FFS_K).abs() < f64::EPSILON);
        assert!((config.threshold.rth_start - defaults::RTH_START).abs() < f64::EPSILON);
    }

    #[test]
    fn test_inverted_rth_ladder_rejected() {
        let mut config = EstimationConfig::default();
        config.threshold.rth_start = 1.0;
        config.threshold.rth_max = 0.7;
        let err = config.validate().expect_err("inverted ladder must fail");
        assert!(err.to_string().contains("rth_start"));
    }

    #[test]
    fn test_toml_roundtrip_preserves_values() {
        let mut config = EstimationConfig::default();
        config.section.outlier_deviation_min = 90;
        let text = config.to_toml().expect("serialize");
        let back = EstimationConfig::from_toml_str(&text).expect("parse");
        assert_eq!(back, config);
    }
}
