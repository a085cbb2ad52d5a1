//! Pipeline output types: predictions, explanations, forecasts, metrics.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Elimination Predictions
// ============================================================================

/// Binary recommendation derived by thresholding the elimination probability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recommendation {
    Eliminate,
    Keep,
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eliminate => write!(f, "eliminate"),
            Self::Keep => write!(f, "keep"),
        }
    }
}

/// Per-CML classifier output.
///
/// Only meaningful relative to `threshold_used`, which is recorded so results
/// can be audited after the operator changes sensitivity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Probability that the CML is safe to eliminate (0-1)
    pub probability: f64,
    /// max(p, 1 - p)
    pub confidence: f64,
    pub recommendation: Recommendation,
    pub threshold_used: f64,
}

impl PredictionResult {
    /// Build a result from a class-1 probability and a decision threshold.
    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        let recommendation = if probability >= threshold {
            Recommendation::Eliminate
        } else {
            Recommendation::Keep
        };
        Self {
            probability,
            confidence: probability.max(1.0 - probability),
            recommendation,
            threshold_used: threshold,
        }
    }
}

// ============================================================================
// Training Metrics
// ============================================================================

/// Held-out evaluation metrics recorded with every trained artifact.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Undefined when the test split contains a single class
    pub auc_roc: Option<f64>,
    pub train_samples: usize,
    pub test_samples: usize,
}

// ============================================================================
// Explanations
// ============================================================================

/// A single feature's signed contribution to one prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImpact {
    pub feature: String,
    pub impact: f64,
}

/// Additive attribution for one explained row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    /// Contribution of every feature (log-odds space)
    pub shap_values: BTreeMap<String, f64>,
    /// Largest contributions by magnitude, descending
    pub top_features: Vec<FeatureImpact>,
    /// Human-readable summary of the top contributions
    pub explanation: String,
    /// Expected model output over the background distribution
    pub base_value: f64,
}

/// Explanations for a batch plus the batch-level importance ranking.
///
/// An empty batch is the degraded result when the explainer is unavailable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExplanationBatch {
    pub explanations: Vec<Explanation>,
    /// Mean absolute contribution per feature
    pub feature_importance: BTreeMap<String, f64>,
}

impl ExplanationBatch {
    pub fn is_empty(&self) -> bool {
        self.explanations.is_empty()
    }
}

// ============================================================================
// Forecasts
// ============================================================================

/// One future point of a thickness forecast.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub ds: NaiveDate,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}
