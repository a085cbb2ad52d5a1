//! CML input types: inspection records and thickness histories.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Standard risk classifications. Records keep the raw label so that sites
/// with their own scales still parse; unknown labels encode as unseen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
            Self::Critical => "Critical",
        }
    }
}

impl From<RiskLevel> for String {
    fn from(level: RiskLevel) -> Self {
        level.as_str().to_string()
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single Condition Monitoring Location as supplied by the record store.
///
/// Every attribute except the identifier may be missing; the feature stage
/// imputes gaps. `elimination_candidate` is the ground-truth label and is only
/// required for training.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CmlRecord {
    pub cml_id: String,

    // === Categorical attributes ===
    #[serde(default)]
    pub commodity: Option<String>,
    #[serde(default)]
    pub material_type: Option<String>,
    #[serde(default)]
    pub feature_type: Option<String>,
    #[serde(default)]
    pub risk_level: Option<String>,

    // === Numeric attributes ===
    /// Nominal wall thickness at design (mm)
    #[serde(default)]
    pub design_thickness_mm: Option<f64>,
    /// Latest measured wall thickness (mm)
    #[serde(default)]
    pub current_thickness_mm: Option<f64>,
    /// Average corrosion rate (mm/year)
    #[serde(default)]
    pub average_corrosion_rate: Option<f64>,
    /// Estimated years until minimum allowable thickness
    #[serde(default)]
    pub remaining_life_years: Option<f64>,
    #[serde(default)]
    pub years_in_service: Option<f64>,
    #[serde(default)]
    pub number_of_inspections: Option<f64>,
    /// Data quality score (0-1)
    #[serde(default)]
    pub data_quality_score: Option<f64>,

    /// Ground-truth label: safe to eliminate from future inspection
    #[serde(default)]
    pub elimination_candidate: Option<bool>,
}

impl CmlRecord {
    /// Categorical attribute by feature-stage column name.
    pub(crate) fn categorical(&self, column: &str) -> Option<String> {
        match column {
            "commodity" => self.commodity.clone(),
            "material_type" => self.material_type.clone(),
            "feature_type" => self.feature_type.clone(),
            "risk_level" => self.risk_level.clone(),
            _ => None,
        }
    }

    /// Numeric attribute by feature-stage column name. Non-finite values are
    /// treated as missing.
    pub(crate) fn numeric(&self, column: &str) -> Option<f64> {
        let value = match column {
            "design_thickness_mm" => self.design_thickness_mm,
            "current_thickness_mm" => self.current_thickness_mm,
            "average_corrosion_rate" => self.average_corrosion_rate,
            "remaining_life_years" => self.remaining_life_years,
            "years_in_service" => self.years_in_service,
            "number_of_inspections" => self.number_of_inspections,
            "data_quality_score" => self.data_quality_score,
            _ => None,
        };
        value.filter(|v| v.is_finite())
    }
}

/// One wall-thickness measurement in a CML's inspection history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThicknessObservation {
    /// Inspection date
    #[serde(rename = "ds")]
    pub date: NaiveDate,
    /// Measured thickness (mm)
    #[serde(rename = "y")]
    pub thickness: f64,
}

impl ThicknessObservation {
    pub fn new(date: NaiveDate, thickness: f64) -> Self {
        Self { date, thickness }
    }
}
