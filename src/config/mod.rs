//! Estimation Configuration Module
//!
//! Provides the tuned margins of the NCRT estimator loaded from TOML files.
//!
//! ## Loading Order
//!
//! 1. `NCRT_CONFIG` environment variable (path to TOML file)
//! 2. `ncrt_config.toml` in the current working directory
//! 3. Built-in defaults (the calibrated constants in [`defaults`])
//!
//! ## Usage
//!
//! Library entry points take an explicit `&EstimationConfig`. Binaries that
//! want a process-wide value call `config::init()` once and `config::get()`
//! afterwards:
//!
//! ```ignore
//! config::init(EstimationConfig::load());
//! let estimator = SectionEstimator::new(config::get().clone(), Arc::new(InMemoryBaselines::new()));
//! ```

mod estimation_config;
pub mod defaults;
pub mod validation;

pub use estimation_config::*;

use std::sync::OnceLock;

/// Global estimation configuration, initialized once at startup.
static ESTIMATION_CONFIG: OnceLock<EstimationConfig> = OnceLock::new();

/// Initialize the global estimation configuration.
///
/// A second call is ignored with a warning.
pub fn init(config: EstimationConfig) {
    if ESTIMATION_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get the global estimation configuration.
///
/// Falls back to the built-in defaults when `init()` was never called.
pub fn get() -> &'static EstimationConfig {
    ESTIMATION_CONFIG.get_or_init(EstimationConfig::default)
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    ESTIMATION_CONFIG.get().is_some()
}
