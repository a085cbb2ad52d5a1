//! Explainability Engine (interventional TreeSHAP)
//!
//! Attributes each elimination prediction to its input features with exact
//! Shapley values of the tree ensemble's raw log-odds output, computed against
//! a background sample of feature rows.
//!
//! ## Algorithm
//! For a foreground row `x` and one background row `z`, every tree is walked
//! once. At a split where `x` and `z` go different ways, the split feature is
//! assigned to either the foreground or the background side (a feature keeps
//! its assignment for the rest of the path). A leaf reached with `a` foreground
//! and `b` background features adds `v · (a-1)! b! / (a+b)!` to each foreground
//! feature and subtracts `v · a! (b-1)! / (a+b)!` from each background feature.
//! Averaging over the background gives attributions that satisfy
//! `base_value + Σ φ = margin(x)` exactly, where `base_value` is the mean
//! background margin.
//!
//! ## Degradation
//! Explainability is secondary to prediction: a failed initialization or
//! explanation is logged and yields an empty `ExplanationBatch`.

use rayon::prelude::*;
use statrs::function::factorial::factorial;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::ml_engine::artifact::TrainedArtifact;
use crate::ml_engine::gbdt::{GradientBoostedTrees, Node, RegressionTree};
use crate::types::{Explanation, ExplanationBatch, FeatureImpact};

/// Class index of "eliminate" in per-class attribution sets.
pub const POSITIVE_CLASS: usize = 1;

/// Default number of contributions listed per explanation.
pub const DEFAULT_TOP_K: usize = 5;

/// Default cap on background rows used for calibration.
pub const DEFAULT_BACKGROUND_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum ExplainError {
    #[error("explainer has not been initialized with background data")]
    NotInitialized,

    #[error("background sample is empty")]
    EmptyBackground,

    #[error("row {row} has {found} features, model expects {expected}")]
    RowWidth {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("{names} feature names supplied for {width} model features")]
    FeatureNames { names: usize, width: usize },

    #[error("model attributions have no positive class set")]
    MissingPositiveClass,
}

// ============================================================================
// Model Attribution Interface
// ============================================================================

/// Raw attributions as a model emits them.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelAttributions {
    /// One set for the positive class (margin output of a binary model)
    Single {
        base_value: f64,
        values: Vec<Vec<f64>>,
    },
    /// One set per class, indexed by class
    PerClass {
        base_values: Vec<f64>,
        values: Vec<Vec<Vec<f64>>>,
    },
}

impl ModelAttributions {
    /// Select the positive-class base value and per-row attributions.
    pub fn into_positive_class(self) -> Result<(f64, Vec<Vec<f64>>), ExplainError> {
        match self {
            Self::Single { base_value, values } => Ok((base_value, values)),
            Self::PerClass {
                mut base_values,
                mut values,
            } => {
                if base_values.len() <= POSITIVE_CLASS || values.len() <= POSITIVE_CLASS {
                    return Err(ExplainError::MissingPositiveClass);
                }
                Ok((
                    base_values.swap_remove(POSITIVE_CLASS),
                    values.swap_remove(POSITIVE_CLASS),
                ))
            }
        }
    }
}

/// A model whose output can be decomposed additively against a background.
pub trait AdditiveModel: Send + Sync {
    /// Input width.
    fn num_features(&self) -> usize;

    /// Raw (margin) output for one row.
    fn raw_output(&self, row: &[f64]) -> f64;

    /// Attributions of `rows` relative to `background`.
    fn attributions(&self, rows: &[Vec<f64>], background: &[Vec<f64>]) -> ModelAttributions;
}

impl AdditiveModel for GradientBoostedTrees {
    fn num_features(&self) -> usize {
        GradientBoostedTrees::num_features(self)
    }

    fn raw_output(&self, row: &[f64]) -> f64 {
        self.predict_margin(row)
    }

    fn attributions(&self, rows: &[Vec<f64>], background: &[Vec<f64>]) -> ModelAttributions {
        let base_value = background.iter().map(|z| self.predict_margin(z)).sum::<f64>()
            / background.len() as f64;

        let values = rows
            .par_iter()
            .map(|x| {
                let mut phi = vec![0.0; self.num_features()];
                for z in background {
                    for tree in self.trees() {
                        interventional_tree_shap(tree, x, z, &mut phi);
                    }
                }
                let n = background.len() as f64;
                phi.iter_mut().for_each(|v| *v /= n);
                phi
            })
            .collect();

        ModelAttributions::Single { base_value, values }
    }
}

impl AdditiveModel for TrainedArtifact {
    fn num_features(&self) -> usize {
        self.model.num_features()
    }

    fn raw_output(&self, row: &[f64]) -> f64 {
        self.model.predict_margin(row)
    }

    fn attributions(&self, rows: &[Vec<f64>], background: &[Vec<f64>]) -> ModelAttributions {
        self.model.attributions(rows, background)
    }
}

// ============================================================================
// Interventional TreeSHAP
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Foreground,
    Background,
}

/// Accumulate the Shapley values of `tree(x) - tree(z)` into `phi`.
fn interventional_tree_shap(tree: &RegressionTree, x: &[f64], z: &[f64], phi: &mut [f64]) {
    let mut origin: Vec<Option<Origin>> = vec![None; phi.len()];
    walk(tree.nodes(), 0, x, z, &mut origin, 0, 0, phi);
}

#[allow(clippy::too_many_arguments)]
fn walk(
    nodes: &[Node],
    idx: usize,
    x: &[f64],
    z: &[f64],
    origin: &mut [Option<Origin>],
    n_fg: u64,
    n_bg: u64,
    phi: &mut [f64],
) {
    match &nodes[idx] {
        Node::Leaf { value } => {
            if n_fg + n_bg == 0 {
                return;
            }
            let total = factorial(n_fg + n_bg);
            let w_fg = if n_fg > 0 {
                factorial(n_fg - 1) * factorial(n_bg) / total
            } else {
                0.0
            };
            let w_bg = if n_bg > 0 {
                factorial(n_fg) * factorial(n_bg - 1) / total
            } else {
                0.0
            };
            for (f, o) in origin.iter().enumerate() {
                match o {
                    Some(Origin::Foreground) => phi[f] += value * w_fg,
                    Some(Origin::Background) => phi[f] -= value * w_bg,
                    None => {}
                }
            }
        }
        Node::Split {
            feature,
            threshold,
            left,
            right,
            ..
        } => {
            let f = *feature;
            let x_next = if x[f] < *threshold { *left } else { *right };
            let z_next = if z[f] < *threshold { *left } else { *right };

            if x_next == z_next {
                walk(nodes, x_next, x, z, origin, n_fg, n_bg, phi);
                return;
            }

            match origin[f] {
                Some(Origin::Foreground) => walk(nodes, x_next, x, z, origin, n_fg, n_bg, phi),
                Some(Origin::Background) => walk(nodes, z_next, x, z, origin, n_fg, n_bg, phi),
                None => {
                    origin[f] = Some(Origin::Foreground);
                    walk(nodes, x_next, x, z, origin, n_fg + 1, n_bg, phi);
                    origin[f] = Some(Origin::Background);
                    walk(nodes, z_next, x, z, origin, n_fg, n_bg + 1, phi);
                    origin[f] = None;
                }
            }
        }
    }
}

// ============================================================================
// Explainer
// ============================================================================

/// Read-only explanation layer over a trained model.
pub struct ModelExplainer {
    model: Arc<dyn AdditiveModel>,
    background: Option<Vec<Vec<f64>>>,
    background_size: usize,
    top_k: usize,
}

impl ModelExplainer {
    pub fn new(model: Arc<dyn AdditiveModel>) -> Self {
        Self {
            model,
            background: None,
            background_size: DEFAULT_BACKGROUND_SIZE,
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_background_size(mut self, size: usize) -> Self {
        self.background_size = size.max(1);
        self
    }

    pub fn is_initialized(&self) -> bool {
        self.background.is_some()
    }

    /// Calibrate against a background distribution of feature rows.
    ///
    /// Rows beyond the configured background size are thinned by even
    /// striding. Returns whether the explainer is usable; failures are logged
    /// and leave it uninitialized.
    pub fn initialize(&mut self, background: &[Vec<f64>]) -> bool {
        match self.prepare_background(background) {
            Ok(sample) => {
                info!(rows = sample.len(), "Explainer initialized");
                self.background = Some(sample);
                true
            }
            Err(e) => {
                error!(error = %e, "Failed to initialize explainer");
                self.background = None;
                false
            }
        }
    }

    fn prepare_background(&self, background: &[Vec<f64>]) -> Result<Vec<Vec<f64>>, ExplainError> {
        if background.is_empty() {
            return Err(ExplainError::EmptyBackground);
        }
        check_widths(background, self.model.num_features())?;

        let stride = background.len().div_ceil(self.background_size);
        Ok(background
            .iter()
            .step_by(stride)
            .take(self.background_size)
            .cloned()
            .collect())
    }

    /// Explain `rows`, whose columns are named by `feature_names`.
    ///
    /// Returns an empty batch if the explainer is unusable or the inputs do
    /// not match the model.
    pub fn explain(&self, rows: &[Vec<f64>], feature_names: &[String]) -> ExplanationBatch {
        match self.try_explain(rows, feature_names) {
            Ok(batch) => batch,
            Err(ExplainError::NotInitialized) => {
                warn!("Explainer not initialized");
                ExplanationBatch::default()
            }
            Err(e) => {
                error!(error = %e, "Explanation failed");
                ExplanationBatch::default()
            }
        }
    }

    fn try_explain(
        &self,
        rows: &[Vec<f64>],
        feature_names: &[String],
    ) -> Result<ExplanationBatch, ExplainError> {
        let background = self.background.as_ref().ok_or(ExplainError::NotInitialized)?;
        let width = self.model.num_features();
        if feature_names.len() != width {
            return Err(ExplainError::FeatureNames {
                names: feature_names.len(),
                width,
            });
        }
        check_widths(rows, width)?;

        let (base_value, values) = self
            .model
            .attributions(rows, background)
            .into_positive_class()?;

        let explanations: Vec<Explanation> = values
            .iter()
            .map(|phi| self.explain_row(phi, feature_names, base_value))
            .collect();

        debug!(rows = rows.len(), base_value, "Explained batch");

        Ok(ExplanationBatch {
            explanations,
            feature_importance: global_importance(&values, feature_names),
        })
    }

    fn explain_row(&self, phi: &[f64], feature_names: &[String], base_value: f64) -> Explanation {
        let mut ranked: Vec<(&String, f64)> = feature_names.iter().zip(phi.iter().copied()).collect();
        ranked.sort_by(|a, b| b.1.abs().total_cmp(&a.1.abs()));
        ranked.truncate(self.top_k);

        let top_features: Vec<FeatureImpact> = ranked
            .iter()
            .map(|(f, v)| FeatureImpact {
                feature: (*f).clone(),
                impact: *v,
            })
            .collect();

        Explanation {
            shap_values: feature_names
                .iter()
                .cloned()
                .zip(phi.iter().copied())
                .collect(),
            explanation: summarize(&top_features),
            top_features,
            base_value,
        }
    }
}

fn check_widths(rows: &[Vec<f64>], expected: usize) -> Result<(), ExplainError> {
    match rows.iter().enumerate().find(|(_, r)| r.len() != expected) {
        Some((row, r)) => Err(ExplainError::RowWidth {
            row,
            expected,
            found: r.len(),
        }),
        None => Ok(()),
    }
}

/// Human-readable split of top contributions into those raising and those
/// lowering the elimination probability.
pub fn summarize(top_features: &[FeatureImpact]) -> String {
    let positive: Vec<&str> = top_features
        .iter()
        .filter(|f| f.impact > 0.0)
        .map(|f| f.feature.as_str())
        .collect();
    let negative: Vec<&str> = top_features
        .iter()
        .filter(|f| f.impact < 0.0)
        .map(|f| f.feature.as_str())
        .collect();

    let mut parts = Vec::new();
    if !positive.is_empty() {
        parts.push(format!(
            "Factors increasing elimination probability: {}",
            positive.join(", ")
        ));
    }
    if !negative.is_empty() {
        parts.push(format!(
            "Factors decreasing elimination probability: {}",
            negative.join(", ")
        ));
    }

    if parts.is_empty() {
        "No significant factors identified".to_string()
    } else {
        parts.join(". ")
    }
}

/// Mean absolute attribution per feature.
fn global_importance(values: &[Vec<f64>], feature_names: &[String]) -> BTreeMap<String, f64> {
    let n = values.len().max(1) as f64;
    feature_names
        .iter()
        .enumerate()
        .map(|(f, name)| {
            let mean_abs = values.iter().map(|row| row[f].abs()).sum::<f64>() / n;
            (name.clone(), mean_abs)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml_engine::gbdt::BoostingParams;

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{i}")).collect()
    }

    fn trained() -> (Arc<GradientBoostedTrees>, Vec<Vec<f64>>) {
        let rows: Vec<Vec<f64>> = (0..60)
            .map(|i| {
                let a = f64::from(i % 10);
                let b = f64::from((i * 7) % 13);
                let c = f64::from(i % 3);
                vec![a, b, c]
            })
            .collect();
        let labels: Vec<bool> = rows.iter().map(|r| r[0] + 0.5 * r[1] > 8.0).collect();
        let params = BoostingParams {
            n_trees: 30,
            max_depth: 4,
            ..Default::default()
        };
        let model = GradientBoostedTrees::fit(&params, &rows, &labels).expect("fit");
        (Arc::new(model), rows)
    }

    #[test]
    fn test_stump_attribution() {
        let tree = RegressionTree::from_nodes(vec![
            Node::Split {
                feature: 0,
                threshold: 0.5,
                left: 1,
                right: 2,
                gain: 1.0,
            },
            Node::Leaf { value: -1.0 },
            Node::Leaf { value: 1.0 },
        ]);
        let mut phi = vec![0.0; 2];
        interventional_tree_shap(&tree, &[1.0, 0.0], &[0.0, 5.0], &mut phi);
        assert!((phi[0] - 2.0).abs() < 1e-12);
        assert_eq!(phi[1], 0.0);
    }

    #[test]
    fn test_interaction_split_evenly() {
        // f(x) = 1 only when both features are high
        let tree = RegressionTree::from_nodes(vec![
            Node::Split {
                feature: 0,
                threshold: 0.5,
                left: 1,
                right: 2,
                gain: 1.0,
            },
            Node::Leaf { value: 0.0 },
            Node::Split {
                feature: 1,
                threshold: 0.5,
                left: 3,
                right: 4,
                gain: 1.0,
            },
            Node::Leaf { value: 0.0 },
            Node::Leaf { value: 1.0 },
        ]);
        let mut phi = vec![0.0; 2];
        interventional_tree_shap(&tree, &[1.0, 1.0], &[0.0, 0.0], &mut phi);
        assert!((phi[0] - 0.5).abs() < 1e-12);
        assert!((phi[1] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_attributions_sum_to_margin() {
        let (model, rows) = trained();
        let mut explainer = ModelExplainer::new(model.clone());
        assert!(explainer.initialize(&rows));

        let batch = explainer.explain(&rows[..10], &names(3));
        assert_eq!(batch.explanations.len(), 10);

        for (row, explanation) in rows[..10].iter().zip(&batch.explanations) {
            let total: f64 =
                explanation.base_value + explanation.shap_values.values().sum::<f64>();
            let margin = model.predict_margin(row);
            assert!(
                (total - margin).abs() < 1e-9,
                "base + Σφ = {total}, margin = {margin}"
            );
        }
    }

    #[test]
    fn test_base_value_is_mean_background_margin() {
        let (model, rows) = trained();
        let mut explainer = ModelExplainer::new(model.clone());
        explainer.initialize(&rows);
        let batch = explainer.explain(&rows[..1], &names(3));

        let expected =
            rows.iter().map(|r| model.predict_margin(r)).sum::<f64>() / rows.len() as f64;
        assert!((batch.explanations[0].base_value - expected).abs() < 1e-9);
    }

    #[test]
    fn test_top_features_sorted_and_capped() {
        let (model, rows) = trained();
        let mut explainer = ModelExplainer::new(model).with_top_k(2);
        explainer.initialize(&rows);
        let batch = explainer.explain(&rows[..5], &names(3));

        for e in &batch.explanations {
            assert!(e.top_features.len() <= 2);
            for pair in e.top_features.windows(2) {
                assert!(pair[0].impact.abs() >= pair[1].impact.abs());
            }
        }
        assert_eq!(batch.feature_importance.len(), 3);
        assert!(batch.feature_importance.values().all(|v| *v >= 0.0));
    }

    #[test]
    fn test_uninitialized_returns_empty() {
        let (model, rows) = trained();
        let explainer = ModelExplainer::new(model);
        assert!(explainer.explain(&rows, &names(3)).is_empty());
    }

    #[test]
    fn test_failed_initialization_degrades() {
        let (model, _) = trained();
        let mut explainer = ModelExplainer::new(model);
        assert!(!explainer.initialize(&[]));
        assert!(!explainer.initialize(&[vec![1.0, 2.0]]));
        assert!(!explainer.is_initialized());
        assert!(explainer.explain(&[vec![0.0; 3]], &names(3)).is_empty());
    }

    #[test]
    fn test_mismatched_names_return_empty() {
        let (model, rows) = trained();
        let mut explainer = ModelExplainer::new(model);
        explainer.initialize(&rows);
        assert!(explainer.explain(&rows[..2], &names(2)).is_empty());
    }

    #[test]
    fn test_background_is_thinned() {
        let (model, rows) = trained();
        let mut explainer = ModelExplainer::new(model).with_background_size(7);
        explainer.initialize(&rows);
        assert_eq!(explainer.background.as_ref().map(Vec::len), Some(7));
    }

    #[test]
    fn test_positive_class_selected_from_per_class_sets() {
        let attributions = ModelAttributions::PerClass {
            base_values: vec![0.3, 0.7],
            values: vec![vec![vec![-1.0, 2.0]], vec![vec![1.0, -2.0]]],
        };
        let (base, values) = attributions.into_positive_class().expect("class 1");
        assert_eq!(base, 0.7);
        assert_eq!(values, vec![vec![1.0, -2.0]]);

        let single_class = ModelAttributions::PerClass {
            base_values: vec![0.3],
            values: vec![vec![vec![1.0]]],
        };
        assert!(matches!(
            single_class.into_positive_class(),
            Err(ExplainError::MissingPositiveClass)
        ));
    }

    #[test]
    fn test_summary_text() {
        let impacts = vec![
            FeatureImpact { feature: "thickness_ratio".into(), impact: 0.8 },
            FeatureImpact { feature: "risk_score".into(), impact: -0.4 },
            FeatureImpact { feature: "years_in_service".into(), impact: 0.1 },
            FeatureImpact { feature: "commodity_encoded".into(), impact: 0.0 },
        ];
        assert_eq!(
            summarize(&impacts),
            "Factors increasing elimination probability: thickness_ratio, years_in_service. \
             Factors decreasing elimination probability: risk_score"
        );
        assert_eq!(summarize(&[]), "No significant factors identified");
    }
}
