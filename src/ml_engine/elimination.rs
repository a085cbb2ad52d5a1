//! Elimination Classifier
//!
//! Owns the lifecycle of the trained classifier artifact: training on labeled
//! CML records, thresholded prediction, gain importance and persistence.
//!
//! ## Concurrency
//!
//! The published artifact sits behind an `ArcSwapOption`. Readers
//! (`predict`, `feature_importance`, `explainer`) take a snapshot and never
//! observe a half-replaced model. `train` and `load` are serialized by an
//! internal mutex and only publish after the new artifact is complete.

use arc_swap::ArcSwapOption;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::ml_engine::artifact::{self, ArtifactError, TrainedArtifact};
use crate::ml_engine::explainer::{AdditiveModel, ModelExplainer};
use crate::ml_engine::gbdt::{BoostingError, BoostingParams, GradientBoostedTrees};
use crate::ml_engine::metrics;
use crate::ml_engine::preprocess::{FeatureEngineer, FeatureError};
use crate::ml_engine::split::stratified_split;
use crate::types::{CmlRecord, PredictionResult, TrainingMetrics};

/// Seed for the stratified train/test split.
pub const DEFAULT_SEED: u64 = 42;

/// Held-out share of the labeled records.
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;

/// Fewest labeled records that still leave one row on each side of the split.
const MIN_TRAINING_RECORDS: usize = 2;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no trained elimination model is available")]
    ModelUnavailable,

    #[error("threshold {0} is outside [0, 1]")]
    InvalidThreshold(f64),

    #[error("test fraction {0} is outside (0, 1)")]
    InvalidTestFraction(f64),

    #[error("record {0} has no elimination_candidate label")]
    MissingLabel(String),

    #[error("need at least {required} labeled records, got {found}")]
    InsufficientData { required: usize, found: usize },

    #[error("cml_id {0} appears more than once in the batch")]
    DuplicateCmlId(String),

    #[error("feature columns do not match the trained model: {0}")]
    ColumnMismatch(String),

    #[error("model training is already in a failed state")]
    Poisoned,

    #[error(transparent)]
    Features(#[from] FeatureError),

    #[error(transparent)]
    Boosting(#[from] BoostingError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// The elimination classifier.
pub struct EliminationModel {
    model_path: PathBuf,
    params: BoostingParams,
    seed: u64,
    current: ArcSwapOption<TrainedArtifact>,
    /// Serializes `train` and `load`.
    write_guard: Mutex<()>,
}

impl EliminationModel {
    /// Create a classifier persisting to `model_path`.
    ///
    /// If an artifact already exists there it is loaded; a load failure is
    /// logged and the classifier starts untrained.
    pub fn new(model_path: impl Into<PathBuf>, params: BoostingParams, seed: u64) -> Self {
        let model = Self {
            model_path: model_path.into(),
            params,
            seed,
            current: ArcSwapOption::empty(),
            write_guard: Mutex::new(()),
        };

        if model.model_path.exists() {
            if let Err(e) = model.load() {
                warn!(
                    path = %model.model_path.display(),
                    error = %e,
                    "Failed to load elimination model"
                );
            }
        }

        model
    }

    /// Build from the `[model]` and `[boosting]` configuration sections.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.model.artifact_path.clone(),
            config.boosting.to_params(),
            config.model.seed,
        )
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn is_trained(&self) -> bool {
        self.current.load().is_some()
    }

    /// Snapshot of the currently published artifact.
    pub fn artifact(&self) -> Option<Arc<TrainedArtifact>> {
        self.current.load_full()
    }

    /// Metrics of the currently published artifact.
    pub fn metrics(&self) -> Option<TrainingMetrics> {
        self.artifact().map(|a| a.metrics.clone())
    }

    /// Train on labeled `records`, persist the artifact, then publish it.
    pub fn train(
        &self,
        records: &[CmlRecord],
        test_fraction: f64,
    ) -> Result<TrainingMetrics, ModelError> {
        if !(test_fraction > 0.0 && test_fraction < 1.0) {
            return Err(ModelError::InvalidTestFraction(test_fraction));
        }
        if records.len() < MIN_TRAINING_RECORDS {
            return Err(ModelError::InsufficientData {
                required: MIN_TRAINING_RECORDS,
                found: records.len(),
            });
        }
        let labels = records
            .iter()
            .map(|r| {
                r.elimination_candidate
                    .ok_or_else(|| ModelError::MissingLabel(r.cml_id.clone()))
            })
            .collect::<Result<Vec<bool>, _>>()?;

        let _guard = self.write_guard.lock().map_err(|_| ModelError::Poisoned)?;

        info!(records = records.len(), "Training elimination model");

        let (features, table) = FeatureEngineer::fit_transform(records)?;
        let split = stratified_split(&labels, test_fraction, self.seed);

        let pick = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<bool>) {
            idx.iter()
                .map(|&i| (table.rows()[i].clone(), labels[i]))
                .unzip()
        };
        let (x_train, y_train) = pick(&split.train);
        let (x_test, y_test) = pick(&split.test);

        let model = GradientBoostedTrees::fit(&self.params, &x_train, &y_train)?;

        let probabilities: Vec<f64> = x_test.iter().map(|r| model.predict_proba(r)).collect();
        let metrics = metrics::evaluate(&y_test, &probabilities, x_train.len());

        let artifact = TrainedArtifact::new(
            model,
            features,
            table.columns().to_vec(),
            metrics.clone(),
        );
        artifact::save_to_disk(&artifact, &self.model_path)?;
        self.current.store(Some(Arc::new(artifact)));

        info!(
            accuracy = metrics.accuracy,
            f1 = metrics.f1,
            auc_roc = ?metrics.auc_roc,
            train_samples = metrics.train_samples,
            test_samples = metrics.test_samples,
            "Elimination model trained"
        );

        Ok(metrics)
    }

    /// Predict elimination for each record at `threshold`.
    pub fn predict(
        &self,
        records: &[CmlRecord],
        threshold: f64,
    ) -> Result<BTreeMap<String, PredictionResult>, ModelError> {
        let artifact = self.artifact().ok_or(ModelError::ModelUnavailable)?;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ModelError::InvalidThreshold(threshold));
        }

        ensure_unique_ids(records)?;

        let rows = Self::feature_rows(&artifact, records)?;
        let results: BTreeMap<String, PredictionResult> = records
            .iter()
            .zip(&rows)
            .map(|(record, row)| {
                let p = artifact.model.predict_proba(row);
                (
                    record.cml_id.clone(),
                    PredictionResult::from_probability(p, threshold),
                )
            })
            .collect();

        debug!(records = records.len(), threshold, "Predicted elimination");
        Ok(results)
    }

    /// Transform `records` and align them to the artifact's frozen columns.
    pub fn feature_rows(
        artifact: &TrainedArtifact,
        records: &[CmlRecord],
    ) -> Result<Vec<Vec<f64>>, ModelError> {
        let table = artifact.features.transform(records);
        table
            .select(&artifact.feature_columns)
            .map_err(|e| ModelError::ColumnMismatch(e.to_string()))
    }

    /// Gain importance keyed by feature column; empty when untrained.
    pub fn feature_importance(&self) -> BTreeMap<String, f64> {
        let Some(artifact) = self.artifact() else {
            return BTreeMap::new();
        };
        artifact
            .feature_columns
            .iter()
            .cloned()
            .zip(artifact.model.feature_importance())
            .collect()
    }

    /// Load the artifact from the configured path and publish it.
    ///
    /// On failure the published artifact is left as it was.
    pub fn load(&self) -> Result<(), ModelError> {
        let _guard = self.write_guard.lock().map_err(|_| ModelError::Poisoned)?;
        let artifact = artifact::load_from_disk(&self.model_path)?;
        info!(
            path = %self.model_path.display(),
            trees = artifact.model.trees().len(),
            "Loaded elimination model"
        );
        self.current.store(Some(Arc::new(artifact)));
        Ok(())
    }

    /// Persist the published artifact to the configured path.
    pub fn save(&self) -> Result<(), ModelError> {
        let artifact = self.artifact().ok_or(ModelError::ModelUnavailable)?;
        artifact::save_to_disk(&artifact, &self.model_path)?;
        Ok(())
    }

    /// Explainer over the published artifact, not yet calibrated.
    pub fn explainer(&self) -> Option<ModelExplainer> {
        let artifact: Arc<dyn AdditiveModel> = self.artifact()?;
        Some(ModelExplainer::new(artifact))
    }
}

/// Reject batches where a `cml_id` repeats; per-CML outputs are keyed by id.
pub fn ensure_unique_ids(records: &[CmlRecord]) -> Result<(), ModelError> {
    let mut seen = HashSet::with_capacity(records.len());
    match records.iter().find(|r| !seen.insert(r.cml_id.as_str())) {
        Some(dup) => Err(ModelError::DuplicateCmlId(dup.cml_id.clone())),
        None => Ok(()),
    }
}
