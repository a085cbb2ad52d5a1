//! Built-in default values.
//!
//! Grouped by config section. Every `PipelineConfig` serde default resolves
//! to one of these.

// ============================================================================
// Model
// ============================================================================

/// Persisted classifier artifact.
pub const MODEL_ARTIFACT_PATH: &str = "models/cml_elimination_model.json";

/// Seed for the stratified train/test split.
pub const RANDOM_SEED: u64 = 42;

/// Held-out share of labeled records.
pub const TEST_FRACTION: f64 = 0.2;

/// Probability at or above which a CML is recommended for elimination.
pub const ELIMINATION_THRESHOLD: f64 = 0.7;

// ============================================================================
// Boosting
// ============================================================================

pub const N_TREES: usize = 100;
pub const MAX_DEPTH: usize = 6;
pub const LEARNING_RATE: f64 = 0.1;

/// L2 regularisation on leaf weights.
pub const LAMBDA: f64 = 1.0;

/// Minimum hessian sum per child.
pub const MIN_CHILD_WEIGHT: f64 = 1.0;

// ============================================================================
// Explainability
// ============================================================================

/// Contributions listed per explanation.
pub const TOP_K: usize = 5;

/// Background rows kept for attribution.
pub const BACKGROUND_SIZE: usize = 100;

// ============================================================================
// Forecasting
// ============================================================================

/// Forecast horizon in monthly periods.
pub const HORIZON_MONTHS: usize = 24;

/// Central coverage of seasonal forecast intervals.
pub const INTERVAL_WIDTH: f64 = 0.95;

// ============================================================================
// Storage
// ============================================================================

/// Training run database directory.
pub const RUNS_DB_PATH: &str = "data/training_runs";
