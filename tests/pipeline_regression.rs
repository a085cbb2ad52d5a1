//! Pipeline Regression Tests
//!
//! Exercises the elimination pipeline end to end on synthetic CML records:
//! training, thresholded prediction, explanation, persistence and the
//! training run registry. Asserts on determinism, column stability and
//! attribution completeness.

use cml_optimizer::ml_engine::{
    BoostingParams, EliminationModel, FeatureEngineer, ModelError, ModelTrainingRun, RunStatus,
    TrainingRunStore, ELIMINATION_MODEL_TYPE,
};
use cml_optimizer::synthetic::{SyntheticConfig, SyntheticGenerator};
use cml_optimizer::types::{CmlRecord, Recommendation};

fn synthetic_records(count: usize, seed: u64) -> Vec<CmlRecord> {
    SyntheticGenerator::new(SyntheticConfig {
        count,
        seed,
        ..Default::default()
    })
    .records()
}

fn quick_params() -> BoostingParams {
    BoostingParams {
        n_trees: 40,
        max_depth: 4,
        ..Default::default()
    }
}

fn trained_model(dir: &tempfile::TempDir) -> EliminationModel {
    let model = EliminationModel::new(dir.path().join("model.json"), quick_params(), 42);
    model
        .train(&synthetic_records(160, 42), 0.2)
        .expect("training on synthetic records");
    model
}

#[test]
fn synthetic_training_learns_the_labeling_rule() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let model = EliminationModel::new(dir.path().join("model.json"), quick_params(), 42);
    let metrics = model.train(&synthetic_records(200, 1), 0.2).expect("train");

    assert_eq!(metrics.train_samples + metrics.test_samples, 200);
    assert!(metrics.accuracy >= 0.75, "accuracy {}", metrics.accuracy);
    if let Some(auc) = metrics.auc_roc {
        assert!((0.0..=1.0).contains(&auc));
    }
}

#[test]
fn training_twice_gives_identical_metrics() {
    let records = synthetic_records(120, 9);
    let a = tempfile::tempdir().expect("tmpdir");
    let b = tempfile::tempdir().expect("tmpdir");
    let m1 = EliminationModel::new(a.path().join("m.json"), quick_params(), 42)
        .train(&records, 0.2)
        .expect("train");
    let m2 = EliminationModel::new(b.path().join("m.json"), quick_params(), 42)
        .train(&records, 0.2)
        .expect("train");
    assert_eq!(m1, m2);
}

#[test]
fn predict_before_training_is_a_precondition_error() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let model = EliminationModel::new(dir.path().join("missing.json"), quick_params(), 42);
    assert!(matches!(
        model.predict(&synthetic_records(3, 0), 0.7),
        Err(ModelError::ModelUnavailable)
    ));
}

#[test]
fn repeated_cml_id_is_rejected_not_collapsed() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let model = trained_model(&dir);
    let mut candidates = synthetic_records(5, 12);
    candidates[4].cml_id = candidates[1].cml_id.clone();

    let err = model.predict(&candidates, 0.7).expect_err("duplicate id");
    assert!(matches!(err, ModelError::DuplicateCmlId(ref id) if *id == candidates[1].cml_id));
    assert!(err.to_string().contains(&candidates[1].cml_id));
}

#[test]
fn higher_threshold_never_eliminates_more() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let model = trained_model(&dir);
    let candidates = synthetic_records(60, 77);

    let counts: Vec<usize> = [0.1, 0.3, 0.5, 0.7, 0.9]
        .iter()
        .map(|&t| {
            model
                .predict(&candidates, t)
                .expect("predict")
                .values()
                .filter(|p| p.recommendation == Recommendation::Eliminate)
                .count()
        })
        .collect();
    assert!(counts.windows(2).all(|w| w[0] >= w[1]), "{counts:?}");
}

#[test]
fn transform_keeps_training_columns() {
    let records = synthetic_records(50, 5);
    let (fitted, table) = FeatureEngineer::fit_transform(&records).expect("fit");

    let mut unseen = records[0].clone();
    unseen.commodity = Some("Liquid Hydrogen".to_string());
    unseen.current_thickness_mm = None;
    let single = fitted.transform(&[unseen]);

    assert_eq!(single.columns(), table.columns());
    assert_eq!(single.rows()[0].len(), table.columns().len());
    assert_eq!(single.column("commodity_encoded"), Some(vec![-1.0]));
    assert!(single.rows()[0].iter().all(|v| v.is_finite()));
}

#[test]
fn explanations_add_up_to_model_margin() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let model = trained_model(&dir);
    let artifact = model.artifact().expect("published");

    let background = synthetic_records(40, 123);
    let targets = synthetic_records(8, 321);
    let background_rows = EliminationModel::feature_rows(&artifact, &background).expect("rows");
    let rows = EliminationModel::feature_rows(&artifact, &targets).expect("rows");

    let mut explainer = model.explainer().expect("explainer");
    assert!(explainer.initialize(&background_rows));
    let batch = explainer.explain(&rows, &artifact.feature_columns);

    assert_eq!(batch.explanations.len(), targets.len());
    assert_eq!(batch.feature_importance.len(), artifact.feature_columns.len());
    for (row, e) in rows.iter().zip(&batch.explanations) {
        let reconstructed = e.base_value + e.shap_values.values().sum::<f64>();
        let margin = artifact.model.predict_margin(row);
        assert!((reconstructed - margin).abs() < 1e-6, "{reconstructed} vs {margin}");
        assert!(e.top_features.len() <= 5);
        assert!(!e.explanation.is_empty());
    }
}

#[test]
fn explanation_with_wrong_names_is_empty() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let model = trained_model(&dir);
    let artifact = model.artifact().expect("published");
    let rows = EliminationModel::feature_rows(&artifact, &synthetic_records(4, 2)).expect("rows");

    let mut explainer = model.explainer().expect("explainer");
    explainer.initialize(&rows);
    let names = vec!["only_one".to_string()];
    assert!(explainer.explain(&rows, &names).is_empty());
}

#[test]
fn reopened_model_predicts_identically() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let original = trained_model(&dir);
    let reopened = EliminationModel::new(original.model_path(), quick_params(), 42);

    let candidates = synthetic_records(20, 8);
    assert_eq!(
        original.predict(&candidates, 0.7).expect("predict"),
        reopened.predict(&candidates, 0.7).expect("predict")
    );
    assert_eq!(original.feature_importance(), reopened.feature_importance());
    let restored = reopened.artifact().expect("loaded on open");
    assert_eq!(restored.model.params(), &quick_params());
}

#[test]
fn corrupt_artifact_leaves_model_untrained() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let path = dir.path().join("model.json");
    std::fs::write(&path, b"not json").expect("write");

    let model = EliminationModel::new(&path, quick_params(), 42);
    assert!(!model.is_trained());
    assert!(model.load().is_err());
}

#[test]
fn training_runs_are_recorded_newest_first() {
    let dir = tempfile::tempdir().expect("tmpdir");
    let store = TrainingRunStore::open(dir.path().join("runs")).expect("open");
    let model = EliminationModel::new(dir.path().join("model.json"), quick_params(), 42);

    let metrics = model.train(&synthetic_records(60, 4), 0.2).expect("train");
    store
        .record(&mut ModelTrainingRun::succeeded(
            ELIMINATION_MODEL_TYPE,
            quick_params(),
            metrics,
            model.model_path(),
        ))
        .expect("record");

    std::thread::sleep(std::time::Duration::from_millis(5));
    let mut unlabeled = synthetic_records(10, 4);
    unlabeled[0].elimination_candidate = None;
    let err = model.train(&unlabeled, 0.2).expect_err("missing label");
    store
        .record(&mut ModelTrainingRun::failed(
            ELIMINATION_MODEL_TYPE,
            quick_params(),
            &err,
            model.model_path(),
        ))
        .expect("record");

    let history = store.history(ELIMINATION_MODEL_TYPE, 10).expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].status, RunStatus::Failed);
    assert_eq!(history[1].status, RunStatus::Success);
    assert_eq!(history[1].training_samples + history[1].test_samples, 60);
}
