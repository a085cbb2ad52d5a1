//! ML Engine for CML Elimination Modeling
//!
//! Turns raw CML inspection records into elimination predictions with
//! per-prediction explanations.
//!
//! ## Key Features
//! - Frozen feature stage (label encoders, standard scaler, median/mode fills)
//! - Gradient-boosted tree classifier with seeded, stratified evaluation
//! - Confidence-threshold decisioning (eliminate iff `p >= threshold`)
//! - **Exact interventional TreeSHAP** attributions in log-odds space
//! - Versioned, atomically written model artifact
//! - Training run history in an embedded Sled database
//!
//! ## Architecture
//! - `preprocess`: Feature Engineering Stage (`fit_transform` / `transform`)
//! - `gbdt`: Second-order boosted regression trees, binary log-loss
//! - `split`: Seeded stratified train/test split
//! - `metrics`: Accuracy, precision, recall, F1, AUC-ROC
//! - `artifact`: Trained classifier bundle and its persistence
//! - `elimination`: Classifier lifecycle (train, predict, load, save)
//! - `explainer`: Explainability Engine over the published artifact
//! - `storage`: Training Run Registry (`{model_type}/{created_at_millis}`)

pub mod preprocess;
pub mod gbdt;
pub mod split;
pub mod metrics;
pub mod artifact;
pub mod elimination;
pub mod explainer;
pub mod storage;

pub use artifact::{ArtifactError, TrainedArtifact, ARTIFACT_FORMAT_VERSION};
pub use elimination::{
    ensure_unique_ids, EliminationModel, ModelError, DEFAULT_SEED, DEFAULT_TEST_FRACTION,
};
pub use explainer::{AdditiveModel, ExplainError, ModelAttributions, ModelExplainer};
pub use gbdt::{BoostingError, BoostingParams, GradientBoostedTrees};
pub use preprocess::{FeatureEngineer, FeatureError, FeatureTable, FittedFeatures};
pub use storage::{
    ModelTrainingRun, RunStatus, RunStoreError, TrainingRunStore, ELIMINATION_MODEL_TYPE,
};
