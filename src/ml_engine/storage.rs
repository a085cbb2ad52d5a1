//! Training Run Registry
//!
//! Model Training Run records in a Sled embedded database.
//! Key format: `{model_type}/{created_at_millis}/{sequence}`
//!
//! Enables:
//! - Latest-run lookup per model type
//! - Newest-first training history
//!
//! Runs are written once per training invocation and never updated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::ml_engine::gbdt::BoostingParams;
use crate::types::TrainingMetrics;

/// Model type recorded for elimination classifier runs.
pub const ELIMINATION_MODEL_TYPE: &str = "elimination";

#[derive(Debug, Error)]
pub enum RunStoreError {
    #[error("database error: {0}")]
    Database(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
}

/// Metadata of one training invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelTrainingRun {
    /// Storage key, assigned by [`TrainingRunStore::record`]
    pub id: String,
    pub model_type: String,
    pub training_samples: usize,
    pub test_samples: usize,
    pub hyperparameters: BoostingParams,
    pub metrics: Option<TrainingMetrics>,
    pub status: RunStatus,
    pub error: Option<String>,
    pub model_path: String,
    pub created_at: DateTime<Utc>,
}

impl ModelTrainingRun {
    pub fn succeeded(
        model_type: &str,
        hyperparameters: BoostingParams,
        metrics: TrainingMetrics,
        model_path: &Path,
    ) -> Self {
        Self {
            id: String::new(),
            model_type: model_type.to_string(),
            training_samples: metrics.train_samples,
            test_samples: metrics.test_samples,
            hyperparameters,
            metrics: Some(metrics),
            status: RunStatus::Success,
            error: None,
            model_path: model_path.display().to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn failed(
        model_type: &str,
        hyperparameters: BoostingParams,
        error: impl ToString,
        model_path: &Path,
    ) -> Self {
        Self {
            id: String::new(),
            model_type: model_type.to_string(),
            training_samples: 0,
            test_samples: 0,
            hyperparameters,
            metrics: None,
            status: RunStatus::Failed,
            error: Some(error.to_string()),
            model_path: model_path.display().to_string(),
            created_at: Utc::now(),
        }
    }
}

/// Storage key. Zero-padded millisecond timestamps sort keys chronologically
/// within a model type; the database sequence keeps same-millisecond runs
/// apart.
fn build_key(model_type: &str, created_at: &DateTime<Utc>, sequence: u64) -> String {
    format!(
        "{}/{:016}/{:020}",
        model_type,
        created_at.timestamp_millis(),
        sequence
    )
}

/// Training run persistent storage
pub struct TrainingRunStore {
    db: Db,
}

impl TrainingRunStore {
    /// Open or create the training run database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, RunStoreError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_temp() -> Result<Self, RunStoreError> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Ok(Self { db })
    }

    /// Store a training run under a fresh key, written into `run.id`
    pub fn record(&self, run: &mut ModelTrainingRun) -> Result<(), RunStoreError> {
        run.id = build_key(&run.model_type, &run.created_at, self.db.generate_id()?);
        let value = serde_json::to_vec(run)?;
        self.db.insert(run.id.as_bytes(), value)?;
        self.db.flush()?;

        debug!(key = %run.id, status = ?run.status, "Stored training run");
        Ok(())
    }

    /// Most recent run of `model_type`
    pub fn latest(&self, model_type: &str) -> Result<Option<ModelTrainingRun>, RunStoreError> {
        let prefix = format!("{model_type}/");
        match self.db.scan_prefix(prefix.as_bytes()).next_back() {
            Some(entry) => {
                let (_, value) = entry?;
                Ok(Some(serde_json::from_slice(&value)?))
            }
            None => Ok(None),
        }
    }

    /// Runs of `model_type`, newest first
    pub fn history(
        &self,
        model_type: &str,
        limit: usize,
    ) -> Result<Vec<ModelTrainingRun>, RunStoreError> {
        let prefix = format!("{model_type}/");
        let mut runs = Vec::new();

        for entry in self.db.scan_prefix(prefix.as_bytes()).rev().take(limit) {
            let (_, value) = entry?;
            runs.push(serde_json::from_slice(&value)?);
        }

        Ok(runs)
    }

    /// Number of stored runs across all model types
    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }
}
