//! Pipeline Configuration Module
//!
//! Operator-tunable settings for training, explanation and forecasting,
//! loaded from TOML.
//!
//! ## Loading Order
//!
//! 1. `CML_CONFIG` environment variable (path to TOML file)
//! 2. `cml_config.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! // In main():
//! config::init(PipelineConfig::load());
//!
//! // Anywhere in the binary:
//! let threshold = config::get().model.default_threshold;
//! ```

mod pipeline_config;
pub mod defaults;

pub use pipeline_config::*;

use std::sync::OnceLock;

/// Global pipeline configuration, initialized once at startup.
static PIPELINE_CONFIG: OnceLock<PipelineConfig> = OnceLock::new();

/// Initialize the global pipeline configuration.
///
/// Later calls are ignored with a warning.
pub fn init(config: PipelineConfig) {
    if PIPELINE_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get the global pipeline configuration.
///
/// Falls back to built-in defaults if `init()` has not been called.
pub fn get() -> &'static PipelineConfig {
    PIPELINE_CONFIG.get_or_init(PipelineConfig::default)
}
