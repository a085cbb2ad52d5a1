//! Synthetic CML Data
//!
//! Deterministic generator of labeled CML records and matching wall-thickness
//! histories for demos and tests. Records carry realistic corrosion physics:
//! remaining life follows from current thickness, a retirement limit and the
//! corrosion rate, and the elimination label is derived from remaining life,
//! corrosion rate and risk with a small amount of label noise.

use chrono::{Datelike, Duration, NaiveDate};
use rand::prelude::*;
use rand_distr::{Distribution, Normal};
use std::collections::BTreeMap;

use crate::types::{CmlRecord, RiskLevel, ThicknessObservation};

const COMMODITIES: [&str; 4] = ["Crude Oil", "Natural Gas", "Produced Water", "Steam"];
const MATERIALS: [&str; 3] = ["Carbon Steel", "Stainless Steel", "Duplex"];
const FEATURE_TYPES: [&str; 4] = ["Pipe", "Elbow", "Tee", "Reducer"];

/// Wall thickness at which a location is retired (fraction of design).
const RETIREMENT_FRACTION: f64 = 0.5;

/// Chance that a label is flipped.
const LABEL_NOISE: f64 = 0.05;

/// Generator settings.
#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub count: usize,
    pub seed: u64,
    /// Share of numeric fields left empty
    pub missing_rate: f64,
    /// Inspection date of the most recent reading
    pub survey_date: NaiveDate,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            count: 200,
            seed: 42,
            missing_rate: 0.02,
            survey_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default(),
        }
    }
}

/// One generated location: the record plus its measured history.
#[derive(Debug, Clone)]
pub struct SyntheticCml {
    pub record: CmlRecord,
    pub history: Vec<ThicknessObservation>,
}

pub struct SyntheticGenerator {
    config: SyntheticConfig,
    rng: StdRng,
}

impl SyntheticGenerator {
    pub fn new(config: SyntheticConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self { config, rng }
    }

    /// Generate `config.count` locations.
    pub fn generate(&mut self) -> Vec<SyntheticCml> {
        (0..self.config.count).map(|i| self.generate_one(i)).collect()
    }

    pub fn records(&mut self) -> Vec<CmlRecord> {
        self.generate().into_iter().map(|c| c.record).collect()
    }

    fn generate_one(&mut self, index: usize) -> SyntheticCml {
        let rng = &mut self.rng;

        let commodity = COMMODITIES[rng.gen_range(0..COMMODITIES.len())];
        let material = MATERIALS[rng.gen_range(0..MATERIALS.len())];
        let feature_type = FEATURE_TYPES[rng.gen_range(0..FEATURE_TYPES.len())];

        let design: f64 = [6.35, 9.53, 12.7, 15.88][rng.gen_range(0..4)];
        let years: f64 = rng.gen_range(2.0..40.0_f64).round();

        // Aggressive service and geometry corrode faster
        let mut rate_mean: f64 = match commodity {
            "Produced Water" => 0.18,
            "Crude Oil" => 0.10,
            "Steam" => 0.08,
            _ => 0.05,
        };
        if material != "Carbon Steel" {
            rate_mean *= 0.3;
        }
        if feature_type != "Pipe" {
            rate_mean *= 1.4;
        }
        let rate = Normal::new(rate_mean, rate_mean * 0.35)
            .map(|d| d.sample(rng))
            .unwrap_or(rate_mean)
            .max(0.005);

        let min_current = design * 0.3;
        let current = (design - rate * years).max(min_current);
        let retirement = design * RETIREMENT_FRACTION;
        let remaining_life = ((current - retirement) / rate).max(0.0);

        let risk = match remaining_life {
            r if r < 5.0 => RiskLevel::Critical,
            r if r < 10.0 => RiskLevel::High,
            r if r < 20.0 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        };

        let inspections = (years / rng.gen_range(2.0..6.0)).ceil().max(1.0);
        let quality: f64 = rng.gen_range(0.6..1.0);

        let mut eliminate = remaining_life > 15.0
            && rate < 0.12
            && matches!(risk, RiskLevel::Low | RiskLevel::Medium);
        if rng.gen_bool(LABEL_NOISE) {
            eliminate = !eliminate;
        }

        let history = Self::history(rng, current, rate, years, inspections, self.config.survey_date);

        let missing_rate = self.config.missing_rate;
        let mut maybe = |v: f64| (!rng.gen_bool(missing_rate)).then_some(v);

        let record = CmlRecord {
            cml_id: format!("CML-{:05}", index + 1),
            commodity: Some(commodity.to_string()),
            material_type: Some(material.to_string()),
            feature_type: Some(feature_type.to_string()),
            risk_level: Some(risk.into()),
            design_thickness_mm: Some(design),
            current_thickness_mm: maybe(round2(current)),
            average_corrosion_rate: maybe(round3(rate)),
            remaining_life_years: maybe(round2(remaining_life)),
            years_in_service: maybe(years),
            number_of_inspections: maybe(inspections),
            data_quality_score: maybe(round2(quality)),
            elimination_candidate: Some(eliminate),
        };

        SyntheticCml { record, history }
    }

    /// Readings at even spacing ending on the survey date, on the first of
    /// each month, with gauge noise.
    fn history(
        rng: &mut StdRng,
        current: f64,
        rate: f64,
        years: f64,
        inspections: f64,
        survey: NaiveDate,
    ) -> Vec<ThicknessObservation> {
        let readings = (inspections as usize).max(2);
        let span_days = (years * 365.25) as i64;
        let step = span_days / (readings as i64 - 1).max(1);
        let gauge = Normal::new(0.0, 0.05).ok();

        (0..readings)
            .map(|k| {
                let back = step * (readings - 1 - k) as i64;
                let date = survey - Duration::days(back);
                let date = date.with_day(1).unwrap_or(date);
                let elapsed_years = back as f64 / 365.25;
                let noise = gauge.map_or(0.0, |g| g.sample(rng));
                ThicknessObservation::new(date, round2(current + rate * elapsed_years + noise))
            })
            .fold(Vec::new(), |mut acc: Vec<ThicknessObservation>, obs| {
                // Snapping to month start can collide on short spans
                if acc.last().map_or(true, |prev| obs.date > prev.date) {
                    acc.push(obs);
                }
                acc
            })
    }
}

/// Histories keyed by CML id.
pub fn histories_by_cml(cmls: &[SyntheticCml]) -> BTreeMap<String, Vec<ThicknessObservation>> {
    cmls.iter()
        .map(|c| (c.record.cml_id.clone(), c.history.clone()))
        .collect()
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}
