//! Shared data types for the CML pipeline.

mod cml;
mod results;

pub use cml::{CmlRecord, RiskLevel, ThicknessObservation};
pub use results::{
    Explanation, ExplanationBatch, FeatureImpact, ForecastPoint, PredictionResult,
    Recommendation, TrainingMetrics,
};
