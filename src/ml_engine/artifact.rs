//! Trained classifier artifact: the unit of persistence.
//!
//! Bundles the four parts that must always travel together:
//! - the fitted gradient-boosted ensemble
//! - the fitted feature stage (encoders, scaler, imputation fills)
//! - the ordered feature-column list the ensemble was trained on
//! - the held-out evaluation metrics
//!
//! Saved as one JSON document with an embedded format version, written to a
//! temp file and renamed into place so readers never see a partial bundle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::ml_engine::gbdt::GradientBoostedTrees;
use crate::ml_engine::preprocess::FittedFeatures;
use crate::types::TrainingMetrics;

/// Current artifact format version.
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("artifact serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("artifact format version mismatch: file has v{found}, expected v{expected}")]
    VersionMismatch { found: u32, expected: u32 },

    #[error("artifact integrity check failed: {0}")]
    Integrity(String),
}

/// The complete trained classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedArtifact {
    /// Format version, checked before the rest of the bundle is trusted.
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub model: GradientBoostedTrees,
    pub features: FittedFeatures,
    pub feature_columns: Vec<String>,
    pub metrics: TrainingMetrics,
}

/// Just enough of the document to read the version before full parsing.
#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

impl TrainedArtifact {
    pub fn new(
        model: GradientBoostedTrees,
        features: FittedFeatures,
        feature_columns: Vec<String>,
        metrics: TrainingMetrics,
    ) -> Self {
        Self {
            version: ARTIFACT_FORMAT_VERSION,
            created_at: Utc::now(),
            model,
            features,
            feature_columns,
            metrics,
        }
    }

    /// Check that the parts of the bundle belong together.
    pub fn validate(&self) -> Result<(), ArtifactError> {
        if self.version != ARTIFACT_FORMAT_VERSION {
            return Err(ArtifactError::VersionMismatch {
                found: self.version,
                expected: ARTIFACT_FORMAT_VERSION,
            });
        }
        if self.feature_columns.as_slice() != self.features.columns() {
            return Err(ArtifactError::Integrity(format!(
                "feature columns {:?} do not match the feature stage output {:?}",
                self.feature_columns,
                self.features.columns(),
            )));
        }
        if self.model.num_features() != self.feature_columns.len() {
            return Err(ArtifactError::Integrity(format!(
                "model expects {} features, column list has {}",
                self.model.num_features(),
                self.feature_columns.len(),
            )));
        }
        Ok(())
    }
}

/// Save an artifact to disk atomically (write temp file, then rename).
pub fn save_to_disk(artifact: &TrainedArtifact, path: &Path) -> Result<(), ArtifactError> {
    artifact.validate()?;
    let json = serde_json::to_vec(artifact)?;

    let tmp_path = path.with_extension("json.tmp");
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&tmp_path, &json)?;
    std::fs::rename(&tmp_path, path)?;

    info!(path = %path.display(), bytes = json.len(), "Saved classifier artifact");
    Ok(())
}

/// Load and validate an artifact from disk.
pub fn load_from_disk(path: &Path) -> Result<TrainedArtifact, ArtifactError> {
    let data = std::fs::read(path)?;

    let probe: VersionProbe = serde_json::from_slice(&data)?;
    if probe.version != ARTIFACT_FORMAT_VERSION {
        return Err(ArtifactError::VersionMismatch {
            found: probe.version,
            expected: ARTIFACT_FORMAT_VERSION,
        });
    }

    let artifact: TrainedArtifact = serde_json::from_slice(&data)?;
    artifact.validate()?;
    Ok(artifact)
}
