//! Forecast Engine for CML Wall Thickness
//!
//! Projects a CML's measured thickness forward with a tiered strategy list:
//! the first strategy that produces a forecast wins, failures are logged and
//! the next one is tried. Callers see the same point shape whichever strategy
//! answered.
//!
//! ## Strategies
//! - `seasonal`: monthly trend + 12-month seasonal profile (needs 24 months)
//! - `linear`: OLS on elapsed days, 30-day steps (needs 2 points)
//!
//! Every result is filtered to dates strictly after the last observation.

pub mod linear;
pub mod seasonal;

pub use linear::LinearTrendStrategy;
pub use seasonal::SeasonalTrendStrategy;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{ForecastPoint, ThicknessObservation};

/// Default horizon in monthly periods.
pub const DEFAULT_HORIZON: usize = 24;

/// Fewest observations any strategy can fit.
pub const MIN_OBSERVATIONS: usize = 2;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ForecastError {
    #[error("need at least {required} observations, got {found}")]
    InsufficientData { required: usize, found: usize },

    #[error("history spans {found} months, need {required}")]
    InsufficientSpan { required: usize, found: usize },

    #[error("history is not strictly ordered by date at index {index}")]
    UnorderedHistory { index: usize },

    #[error("thickness at index {index} is not finite")]
    NonFiniteObservation { index: usize },

    #[error("forecast horizon must be at least one period")]
    InvalidHorizon,

    #[error("forecast horizon of {horizon} periods runs past the supported date range")]
    HorizonOutOfRange { horizon: usize },

    #[error("numerical instability: {0}")]
    NumericalInstability(String),

    #[error("no forecast strategies configured")]
    NoStrategies,
}

/// Which strategy leads the tier list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecastMethod {
    /// Seasonal/trend first, linear fallback
    #[default]
    Seasonal,
    /// Linear only
    Linear,
}

/// One way of producing a forecast from a validated history.
pub trait ForecastStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Forecast `horizon` periods past the end of `history`.
    ///
    /// `history` has at least [`MIN_OBSERVATIONS`] points, strictly ordered
    /// by date, with finite thickness values.
    fn fit(
        &self,
        history: &[ThicknessObservation],
        horizon: usize,
    ) -> Result<Vec<ForecastPoint>, ForecastError>;
}

/// Ordered strategy list.
pub struct ForecastEngine {
    strategies: Vec<Box<dyn ForecastStrategy>>,
}

impl Default for ForecastEngine {
    fn default() -> Self {
        Self::with_method(ForecastMethod::Seasonal, seasonal::DEFAULT_INTERVAL_WIDTH)
    }
}

impl ForecastEngine {
    pub fn with_strategies(strategies: Vec<Box<dyn ForecastStrategy>>) -> Self {
        Self { strategies }
    }

    /// Tier list for `method`; the linear fallback always comes last.
    pub fn with_method(method: ForecastMethod, interval_width: f64) -> Self {
        let mut strategies: Vec<Box<dyn ForecastStrategy>> = Vec::new();
        if method == ForecastMethod::Seasonal {
            strategies.push(Box::new(SeasonalTrendStrategy::new(interval_width)));
        }
        strategies.push(Box::new(LinearTrendStrategy));
        Self { strategies }
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    /// Forecast one CML's thickness `horizon` periods ahead.
    pub fn forecast(
        &self,
        history: &[ThicknessObservation],
        horizon: usize,
    ) -> Result<Vec<ForecastPoint>, ForecastError> {
        validate_history(history, horizon)?;
        let last_date = history[history.len() - 1].date;

        let mut last_error = ForecastError::NoStrategies;
        for strategy in &self.strategies {
            match strategy.fit(history, horizon) {
                Ok(points) => {
                    let future: Vec<ForecastPoint> =
                        points.into_iter().filter(|p| p.ds > last_date).collect();
                    if future.is_empty() {
                        warn!(strategy = strategy.name(), "Forecast produced no future points");
                        last_error = ForecastError::NumericalInstability(format!(
                            "{} produced no future points",
                            strategy.name()
                        ));
                        continue;
                    }
                    debug!(
                        strategy = strategy.name(),
                        points = future.len(),
                        observations = history.len(),
                        "Forecast complete"
                    );
                    return Ok(future);
                }
                Err(e) => {
                    warn!(strategy = strategy.name(), error = %e, "Forecast strategy failed");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    /// Forecast many CMLs in parallel, one independent result per CML.
    pub fn forecast_many(
        &self,
        series: &BTreeMap<String, Vec<ThicknessObservation>>,
        horizon: usize,
    ) -> BTreeMap<String, Result<Vec<ForecastPoint>, ForecastError>> {
        series
            .par_iter()
            .map(|(cml_id, history)| (cml_id.clone(), self.forecast(history, horizon)))
            .collect()
    }
}

fn validate_history(history: &[ThicknessObservation], horizon: usize) -> Result<(), ForecastError> {
    if horizon == 0 {
        return Err(ForecastError::InvalidHorizon);
    }
    if history.len() < MIN_OBSERVATIONS {
        return Err(ForecastError::InsufficientData {
            required: MIN_OBSERVATIONS,
            found: history.len(),
        });
    }
    if let Some(index) = history.iter().position(|o| !o.thickness.is_finite()) {
        return Err(ForecastError::NonFiniteObservation { index });
    }
    if let Some(index) = history.windows(2).position(|w| w[1].date <= w[0].date) {
        return Err(ForecastError::UnorderedHistory { index: index + 1 });
    }
    Ok(())
}

/// Ordinary least squares `y = intercept + slope · x`.
pub(crate) fn ols(x: &[f64], y: &[f64]) -> Result<(f64, f64), ForecastError> {
    let n = x.len() as f64;
    let mean_x = x.iter().sum::<f64>() / n;
    let mean_y = y.iter().sum::<f64>() / n;

    let sxx: f64 = x.iter().map(|xi| (xi - mean_x).powi(2)).sum();
    let sxy: f64 = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| (xi - mean_x) * (yi - mean_y))
        .sum();

    if sxx <= f64::EPSILON {
        return Err(ForecastError::NumericalInstability(
            "regressor has zero variance".to_string(),
        ));
    }
    let slope = sxy / sxx;
    let intercept = mean_y - slope * mean_x;
    if !(slope.is_finite() && intercept.is_finite()) {
        return Err(ForecastError::NumericalInstability(
            "non-finite regression coefficients".to_string(),
        ));
    }
    Ok((intercept, slope))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn obs(y: i32, m: u32, d: u32, thickness: f64) -> ThicknessObservation {
        ThicknessObservation::new(
            NaiveDate::from_ymd_opt(y, m, d).expect("valid date"),
            thickness,
        )
    }

    fn yearly() -> Vec<ThicknessObservation> {
        vec![obs(2020, 1, 1, 10.0), obs(2021, 1, 1, 9.0), obs(2022, 1, 1, 8.0)]
    }

    struct Failing;

    impl ForecastStrategy for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn fit(&self, _: &[ThicknessObservation], _: usize) -> Result<Vec<ForecastPoint>, ForecastError> {
            Err(ForecastError::NumericalInstability("forced".to_string()))
        }
    }

    #[test]
    fn test_short_yearly_series_falls_back() {
        let engine = ForecastEngine::default();
        let points = engine.forecast(&yearly(), 2).expect("forecast");

        assert_eq!(points.len(), 2);
        assert!(points[0].ds < points[1].ds);
        for p in &points {
            assert!(p.ds > NaiveDate::from_ymd_opt(2022, 1, 1).expect("date"));
            assert!(p.yhat_lower < p.yhat && p.yhat < p.yhat_upper);
        }
    }

    #[test]
    fn test_fallback_matches_direct_linear() {
        let engine = ForecastEngine::with_strategies(vec![
            Box::new(Failing),
            Box::new(LinearTrendStrategy),
        ]);
        let via_fallback = engine.forecast(&yearly(), 6).expect("forecast");
        let direct = LinearTrendStrategy.fit(&yearly(), 6).expect("forecast");
        assert_eq!(via_fallback, direct);
    }

    #[test]
    fn test_insufficient_data() {
        let engine = ForecastEngine::default();
        assert_eq!(
            engine.forecast(&[obs(2020, 1, 1, 10.0)], 12),
            Err(ForecastError::InsufficientData { required: 2, found: 1 })
        );
        assert!(matches!(
            engine.forecast(&[], 12),
            Err(ForecastError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_unordered_history_rejected() {
        let engine = ForecastEngine::default();
        let history = vec![obs(2021, 1, 1, 9.0), obs(2020, 1, 1, 10.0), obs(2022, 1, 1, 8.0)];
        assert_eq!(
            engine.forecast(&history, 3),
            Err(ForecastError::UnorderedHistory { index: 1 })
        );

        let duplicate = vec![obs(2020, 1, 1, 10.0), obs(2020, 1, 1, 9.9)];
        assert!(matches!(
            engine.forecast(&duplicate, 3),
            Err(ForecastError::UnorderedHistory { .. })
        ));
    }

    #[test]
    fn test_zero_horizon_rejected() {
        let engine = ForecastEngine::default();
        assert_eq!(engine.forecast(&yearly(), 0), Err(ForecastError::InvalidHorizon));
    }

    #[test]
    fn test_all_strategies_failing_propagates_last_error() {
        let engine = ForecastEngine::with_strategies(vec![Box::new(Failing)]);
        assert!(matches!(
            engine.forecast(&yearly(), 2),
            Err(ForecastError::NumericalInstability(_))
        ));
        let empty = ForecastEngine::with_strategies(Vec::new());
        assert_eq!(empty.forecast(&yearly(), 2), Err(ForecastError::NoStrategies));
    }

    #[test]
    fn test_forecast_many_independent() {
        let engine = ForecastEngine::default();
        let mut series = BTreeMap::new();
        series.insert("CML-001".to_string(), yearly());
        series.insert("CML-002".to_string(), vec![obs(2020, 1, 1, 10.0)]);

        let results = engine.forecast_many(&series, 4);
        assert_eq!(results.len(), 2);
        assert_eq!(results["CML-001"].as_ref().map(Vec::len), Ok(4));
        assert!(results["CML-002"].is_err());
    }

    #[test]
    fn test_method_tiers() {
        assert_eq!(
            ForecastEngine::with_method(ForecastMethod::Seasonal, 0.95).strategy_names(),
            vec!["seasonal", "linear"]
        );
        assert_eq!(
            ForecastEngine::with_method(ForecastMethod::Linear, 0.95).strategy_names(),
            vec!["linear"]
        );
    }

    #[test]
    fn test_ols_recovers_line() {
        let x = [0.0, 1.0, 2.0, 3.0];
        let y = [1.0, 3.0, 5.0, 7.0];
        let (intercept, slope) = ols(&x, &y).expect("fit");
        assert!((intercept - 1.0).abs() < 1e-12);
        assert!((slope - 2.0).abs() < 1e-12);
        assert!(ols(&[1.0, 1.0], &[2.0, 3.0]).is_err());
    }
}
