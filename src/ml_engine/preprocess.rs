//! Feature Engineering Stage
//!
//! Converts raw CML records into the numeric feature table consumed by the
//! elimination classifier.
//!
//! ## Fit / Transform
//! - `FeatureEngineer::fit_transform` builds the label encoders, the standard
//!   scaler and the imputation fills from one batch, and returns them frozen
//!   as a `FittedFeatures` value together with the transformed table.
//! - `FittedFeatures::transform` applies the frozen state to new records. It
//!   never refits, so the column set and order are identical for every call.
//!
//! ## Column Order
//! 1. Scaled numeric features (`NUMERICAL_FEATURES`)
//! 2. Encoded categorical features (`<name>_encoded`)
//! 3. Engineered features (`ENGINEERED_FEATURES`)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::debug;

use crate::types::CmlRecord;

/// Categorical attributes, each label-encoded into `<name>_encoded`.
pub const CATEGORICAL_FEATURES: [&str; 4] =
    ["commodity", "material_type", "feature_type", "risk_level"];

/// Numeric attributes, standard-scaled in place.
pub const NUMERICAL_FEATURES: [&str; 7] = [
    "design_thickness_mm",
    "current_thickness_mm",
    "average_corrosion_rate",
    "remaining_life_years",
    "years_in_service",
    "number_of_inspections",
    "data_quality_score",
];

/// Derived features appended after the encoded columns.
pub const ENGINEERED_FEATURES: [&str; 4] = [
    "total_corrosion_loss",
    "thickness_ratio",
    "inspection_frequency",
    "risk_score",
];

/// Encoded value for a category never seen during fitting.
pub const UNSEEN_CATEGORY: f64 = -1.0;

/// Fill for a categorical column with no observed values.
pub const UNKNOWN_CATEGORY: &str = "Unknown";

/// Guards `thickness_ratio` against a zero design thickness.
const THICKNESS_EPSILON: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("cannot fit the feature stage on an empty record batch")]
    EmptyBatch,

    #[error("column not found in feature table: {0}")]
    MissingColumn(String),
}

// ============================================================================
// Feature Table
// ============================================================================

/// Row-per-CML numeric matrix with named columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureTable {
    cml_ids: Vec<String>,
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureTable {
    pub fn new(cml_ids: Vec<String>, columns: Vec<String>, rows: Vec<Vec<f64>>) -> Self {
        Self {
            cml_ids,
            columns,
            rows,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn cml_ids(&self) -> &[String] {
        &self.cml_ids
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of one named column, in row order.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|r| r[idx]).collect())
    }

    /// Project the table onto `columns`, in that order.
    ///
    /// Fails if any requested column is absent; callers rely on this to
    /// detect a feature-stage / model mismatch instead of predicting on
    /// misaligned inputs.
    pub fn select(&self, columns: &[String]) -> Result<Vec<Vec<f64>>, FeatureError> {
        let indices = columns
            .iter()
            .map(|name| {
                self.columns
                    .iter()
                    .position(|c| c == name)
                    .ok_or_else(|| FeatureError::MissingColumn(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i]).collect())
            .collect())
    }
}

// ============================================================================
// Fitted State
// ============================================================================

/// Frozen label encoder for one categorical attribute.
///
/// Classes are sorted, so codes are stable regardless of record order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CategoricalColumn {
    name: String,
    classes: Vec<String>,
    /// Imputation value (training mode or `UNKNOWN_CATEGORY`)
    fill: String,
}

impl CategoricalColumn {
    fn encode(&self, value: &str) -> f64 {
        match self.classes.binary_search_by(|c| c.as_str().cmp(value)) {
            Ok(idx) => idx as f64,
            Err(_) => UNSEEN_CATEGORY,
        }
    }
}

/// Frozen imputation and scaling parameters for one numeric attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct NumericColumn {
    name: String,
    /// Imputation value (training median)
    fill: f64,
    mean: f64,
    /// Population standard deviation, 1.0 for a constant column
    scale: f64,
}

/// The fitted feature stage. Produced once by
/// [`FeatureEngineer::fit_transform`] and shared read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedFeatures {
    numeric: Vec<NumericColumn>,
    categorical: Vec<CategoricalColumn>,
    columns: Vec<String>,
}

impl FittedFeatures {
    /// Output column names, in table order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Trained classes of a categorical attribute.
    pub fn classes(&self, attribute: &str) -> Option<&[String]> {
        self.categorical
            .iter()
            .find(|c| c.name == attribute)
            .map(|c| c.classes.as_slice())
    }

    /// Apply the frozen encoders, scaler and fills to `records`.
    pub fn transform(&self, records: &[CmlRecord]) -> FeatureTable {
        let rows = records.iter().map(|r| self.transform_record(r)).collect();
        let cml_ids = records.iter().map(|r| r.cml_id.clone()).collect();
        FeatureTable::new(cml_ids, self.columns.clone(), rows)
    }

    fn transform_record(&self, record: &CmlRecord) -> Vec<f64> {
        let raw: HashMap<&str, f64> = self
            .numeric
            .iter()
            .map(|col| {
                let value = record.numeric(&col.name).unwrap_or(col.fill);
                (col.name.as_str(), value)
            })
            .collect();

        let mut row = Vec::with_capacity(self.columns.len());

        for col in &self.numeric {
            row.push((raw[col.name.as_str()] - col.mean) / col.scale);
        }

        for col in &self.categorical {
            let value = record
                .categorical(&col.name)
                .unwrap_or_else(|| col.fill.clone());
            row.push(col.encode(&value));
        }

        let get = |name: &str| raw.get(name).copied().unwrap_or(0.0);
        row.extend(engineer_features(
            get("average_corrosion_rate"),
            get("years_in_service"),
            get("current_thickness_mm"),
            get("design_thickness_mm"),
            get("number_of_inspections"),
            get("remaining_life_years"),
        ));

        row
    }
}

/// Derived features from imputed, unscaled inputs.
///
/// Order matches `ENGINEERED_FEATURES`. A division by exactly zero yields 0.0
/// rather than a non-finite value.
fn engineer_features(
    corrosion_rate: f64,
    years_in_service: f64,
    current_thickness: f64,
    design_thickness: f64,
    inspections: f64,
    remaining_life: f64,
) -> [f64; 4] {
    let finite = |v: f64| if v.is_finite() { v } else { 0.0 };
    [
        finite(corrosion_rate * years_in_service),
        finite(current_thickness / (design_thickness + THICKNESS_EPSILON)),
        finite(inspections / (years_in_service + 1.0)),
        finite(1.0 / (remaining_life + 1.0)),
    ]
}

// ============================================================================
// Fitting
// ============================================================================

/// Entry point for fitting the feature stage.
pub struct FeatureEngineer;

impl FeatureEngineer {
    /// Fit encoders, scaler and imputation fills on `records` and transform
    /// the same batch.
    pub fn fit_transform(
        records: &[CmlRecord],
    ) -> Result<(FittedFeatures, FeatureTable), FeatureError> {
        if records.is_empty() {
            return Err(FeatureError::EmptyBatch);
        }

        let numeric: Vec<NumericColumn> = NUMERICAL_FEATURES
            .iter()
            .map(|&name| fit_numeric(name, records))
            .collect();

        let categorical: Vec<CategoricalColumn> = CATEGORICAL_FEATURES
            .iter()
            .map(|&name| fit_categorical(name, records))
            .collect();

        let columns = NUMERICAL_FEATURES
            .iter()
            .map(|s| (*s).to_string())
            .chain(CATEGORICAL_FEATURES.iter().map(|s| format!("{s}_encoded")))
            .chain(ENGINEERED_FEATURES.iter().map(|s| (*s).to_string()))
            .collect();

        let fitted = FittedFeatures {
            numeric,
            categorical,
            columns,
        };

        debug!(
            records = records.len(),
            columns = fitted.columns.len(),
            "Fitted feature stage"
        );

        let table = fitted.transform(records);
        Ok((fitted, table))
    }
}

fn fit_numeric(name: &str, records: &[CmlRecord]) -> NumericColumn {
    let observed: Vec<f64> = records.iter().filter_map(|r| r.numeric(name)).collect();
    let fill = median(&observed).unwrap_or(0.0);

    // Scaler statistics are taken after imputation, matching what transform sees
    let n = records.len() as f64;
    let imputed = records.iter().map(|r| r.numeric(name).unwrap_or(fill));
    let mean = imputed.clone().sum::<f64>() / n;
    let variance = imputed.map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    let scale = if std > 1e-12 { std } else { 1.0 };

    NumericColumn {
        name: name.to_string(),
        fill,
        mean,
        scale,
    }
}

fn fit_categorical(name: &str, records: &[CmlRecord]) -> CategoricalColumn {
    let observed: Vec<String> = records.iter().filter_map(|r| r.categorical(name)).collect();
    let fill = mode(&observed).unwrap_or_else(|| UNKNOWN_CATEGORY.to_string());

    let mut classes: Vec<String> = observed;
    if classes.len() < records.len() {
        classes.push(fill.clone());
    }
    classes.sort();
    classes.dedup();

    CategoricalColumn {
        name: name.to_string(),
        classes,
        fill,
    }
}

/// Median with the mean of the two middle values for even counts.
fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Most frequent value; ties resolve to the lexicographically smallest.
fn mode(values: &[String]) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for v in values {
        *counts.entry(v.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|(a, ca), (b, cb)| ca.cmp(cb).then_with(|| b.cmp(a)))
        .map(|(v, _)| v.to_string())
}
