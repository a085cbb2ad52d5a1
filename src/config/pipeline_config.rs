//! Pipeline configuration loaded from TOML.
//!
//! Every field carries a serde default, so an empty or partial file yields a
//! complete configuration. Values are checked by [`PipelineConfig::validate`]
//! after parsing.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use super::defaults;
use crate::forecast::ForecastMethod;
use crate::ml_engine::gbdt::BoostingParams;

/// Environment variable naming a config file.
pub const CONFIG_ENV_VAR: &str = "CML_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "cml_config.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub model: ModelConfig,

    #[serde(default)]
    pub boosting: BoostingConfig,

    #[serde(default)]
    pub explain: ExplainConfig,

    #[serde(default)]
    pub forecast: ForecastConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl PipelineConfig {
    /// Load configuration using the standard search order:
    ///
    /// 1. `$CML_CONFIG`
    /// 2. `./cml_config.toml`
    /// 3. Built-in defaults
    ///
    /// A file that fails to load is logged and the search continues.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded pipeline config from CML_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from CML_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "CML_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded pipeline config from ./cml_config.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./cml_config.toml, using defaults");
                }
            }
        }

        info!("No cml_config.toml found, using built-in defaults");
        Self::default()
    }

    /// Load and validate a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check value ranges, collecting every violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        let m = &self.model;
        if !(m.test_fraction > 0.0 && m.test_fraction < 1.0) {
            errors.push(format!(
                "model.test_fraction ({}) must be in (0, 1)",
                m.test_fraction
            ));
        }
        if !(0.0..=1.0).contains(&m.default_threshold) {
            errors.push(format!(
                "model.default_threshold ({}) must be in [0, 1]",
                m.default_threshold
            ));
        }

        let b = &self.boosting;
        if b.n_trees == 0 {
            errors.push("boosting.n_trees must be > 0".to_string());
        }
        if b.max_depth == 0 {
            errors.push("boosting.max_depth must be > 0".to_string());
        }
        Self::check_positive(b.learning_rate, "boosting.learning_rate", &mut errors);
        Self::check_non_negative(b.lambda, "boosting.lambda", &mut errors);
        Self::check_non_negative(b.min_child_weight, "boosting.min_child_weight", &mut errors);

        if self.explain.top_k == 0 {
            errors.push("explain.top_k must be > 0".to_string());
        }
        if self.explain.background_size == 0 {
            errors.push("explain.background_size must be > 0".to_string());
        }

        let f = &self.forecast;
        if f.horizon_months == 0 {
            errors.push("forecast.horizon_months must be > 0".to_string());
        }
        if !(f.interval_width > 0.0 && f.interval_width < 1.0) {
            errors.push(format!(
                "forecast.interval_width ({}) must be in (0, 1)",
                f.interval_width
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    fn check_positive(value: f64, name: &str, errors: &mut Vec<String>) {
        if !value.is_finite() || value <= 0.0 {
            errors.push(format!("{name} ({value}) must be finite and > 0"));
        }
    }

    fn check_non_negative(value: f64, name: &str, errors: &mut Vec<String>) {
        if !value.is_finite() || value < 0.0 {
            errors.push(format!("{name} ({value}) must be finite and >= 0"));
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, std::io::Error),

    #[error("config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, toml::de::Error),

    #[error("config serialization error: {0}")]
    Serialize(toml::ser::Error),

    #[error("config validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),
}

// ============================================================================
// Sections
// ============================================================================

/// `[model]`: classifier artifact and training split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_artifact_path")]
    pub artifact_path: PathBuf,

    #[serde(default = "default_seed")]
    pub seed: u64,

    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,

    /// Threshold used when a prediction call does not give one
    #[serde(default = "default_threshold")]
    pub default_threshold: f64,
}

fn default_artifact_path() -> PathBuf {
    PathBuf::from(defaults::MODEL_ARTIFACT_PATH)
}
fn default_seed() -> u64 {
    defaults::RANDOM_SEED
}
fn default_test_fraction() -> f64 {
    defaults::TEST_FRACTION
}
fn default_threshold() -> f64 {
    defaults::ELIMINATION_THRESHOLD
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            artifact_path: default_artifact_path(),
            seed: default_seed(),
            test_fraction: default_test_fraction(),
            default_threshold: default_threshold(),
        }
    }
}

/// `[boosting]`: ensemble hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingConfig {
    #[serde(default = "default_n_trees")]
    pub n_trees: usize,

    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    #[serde(default = "default_lambda")]
    pub lambda: f64,

    #[serde(default = "default_min_child_weight")]
    pub min_child_weight: f64,
}

fn default_n_trees() -> usize {
    defaults::N_TREES
}
fn default_max_depth() -> usize {
    defaults::MAX_DEPTH
}
fn default_learning_rate() -> f64 {
    defaults::LEARNING_RATE
}
fn default_lambda() -> f64 {
    defaults::LAMBDA
}
fn default_min_child_weight() -> f64 {
    defaults::MIN_CHILD_WEIGHT
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_trees: default_n_trees(),
            max_depth: default_max_depth(),
            learning_rate: default_learning_rate(),
            lambda: default_lambda(),
            min_child_weight: default_min_child_weight(),
        }
    }
}

impl BoostingConfig {
    pub fn to_params(&self) -> BoostingParams {
        BoostingParams {
            n_trees: self.n_trees,
            max_depth: self.max_depth,
            learning_rate: self.learning_rate,
            lambda: self.lambda,
            min_child_weight: self.min_child_weight,
            ..Default::default()
        }
    }
}

/// `[explain]`: attribution output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplainConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_background_size")]
    pub background_size: usize,
}

fn default_top_k() -> usize {
    defaults::TOP_K
}
fn default_background_size() -> usize {
    defaults::BACKGROUND_SIZE
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            background_size: default_background_size(),
        }
    }
}

/// `[forecast]`: thickness projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    #[serde(default = "default_horizon_months")]
    pub horizon_months: usize,

    #[serde(default = "default_interval_width")]
    pub interval_width: f64,

    /// Leading strategy; the linear fallback always follows
    #[serde(default)]
    pub method: ForecastMethod,
}

fn default_horizon_months() -> usize {
    defaults::HORIZON_MONTHS
}
fn default_interval_width() -> f64 {
    defaults::INTERVAL_WIDTH
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon_months: default_horizon_months(),
            interval_width: default_interval_width(),
            method: ForecastMethod::default(),
        }
    }
}

/// `[storage]`: training run registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_runs_db_path")]
    pub runs_db_path: PathBuf,
}

fn default_runs_db_path() -> PathBuf {
    PathBuf::from(defaults::RUNS_DB_PATH)
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            runs_db_path: default_runs_db_path(),
        }
    }
}
