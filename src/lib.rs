//! CML Optimizer: Inspection Point Elimination Modeling
//!
//! Predictive pipeline for deciding which Condition Monitoring Locations can
//! be retired from future inspection programs.
//!
//! ## Architecture
//!
//! - **Feature Engineering Stage**: frozen encoders, scaler and derived features
//! - **Elimination Classifier**: gradient-boosted trees with threshold decisioning
//! - **Explainability Engine**: exact TreeSHAP attributions per prediction
//! - **Forecast Engine**: tiered wall-thickness projection (seasonal, then linear)
//! - **Training Run Registry**: Sled-backed history of training invocations

pub mod config;
pub mod types;
pub mod ml_engine;
pub mod forecast;
pub mod synthetic;

// Re-export pipeline configuration
pub use config::PipelineConfig;

// Re-export commonly used types
pub use types::{
    CmlRecord, Explanation, ExplanationBatch, FeatureImpact, ForecastPoint, PredictionResult,
    Recommendation, RiskLevel, ThicknessObservation, TrainingMetrics,
};

// Re-export ML Engine components
pub use ml_engine::{
    EliminationModel, FeatureEngineer, FittedFeatures, ModelError, ModelExplainer,
    ModelTrainingRun, TrainedArtifact, TrainingRunStore,
};

// Re-export forecasting
pub use forecast::{ForecastEngine, ForecastError, ForecastMethod, ForecastStrategy};
