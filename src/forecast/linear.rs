//! Linear trend fallback.
//!
//! OLS of thickness on days elapsed since the first observation, projected
//! in 30-day steps past the last observation. The interval is
//! `yhat ± 1.96 · std(residuals)` over the in-sample residuals (population
//! std), a normal approximation rather than a predictive interval.

use chrono::Duration;

use super::{ols, ForecastError, ForecastStrategy};
use crate::types::{ForecastPoint, ThicknessObservation};

/// Days between projected points.
pub const STEP_DAYS: i64 = 30;

/// Two-sided 95% normal quantile.
const Z_95: f64 = 1.96;

#[derive(Debug, Clone, Copy, Default)]
pub struct LinearTrendStrategy;

impl ForecastStrategy for LinearTrendStrategy {
    fn name(&self) -> &'static str {
        "linear"
    }

    fn fit(
        &self,
        history: &[ThicknessObservation],
        horizon: usize,
    ) -> Result<Vec<ForecastPoint>, ForecastError> {
        let first = history[0].date;
        let last = history[history.len() - 1].date;
        let days_since = |d: chrono::NaiveDate| (d - first).num_days() as f64;

        let x: Vec<f64> = history.iter().map(|o| days_since(o.date)).collect();
        let y: Vec<f64> = history.iter().map(|o| o.thickness).collect();
        let (intercept, slope) = ols(&x, &y)?;

        let n = y.len() as f64;
        let residual_var = x
            .iter()
            .zip(&y)
            .map(|(xi, yi)| (yi - (intercept + slope * xi)).powi(2))
            .sum::<f64>()
            / n;
        let margin = Z_95 * residual_var.sqrt();

        let out_of_range = ForecastError::HorizonOutOfRange { horizon };
        let steps = i64::try_from(horizon).map_err(|_| out_of_range.clone())?;
        let points: Vec<ForecastPoint> = (1..=steps)
            .map(|i| -> Result<ForecastPoint, ForecastError> {
                let ds = STEP_DAYS
                    .checked_mul(i)
                    .and_then(Duration::try_days)
                    .and_then(|offset| last.checked_add_signed(offset))
                    .ok_or_else(|| out_of_range.clone())?;
                let yhat = intercept + slope * days_since(ds);
                Ok(ForecastPoint {
                    ds,
                    yhat,
                    yhat_lower: yhat - margin,
                    yhat_upper: yhat + margin,
                })
            })
            .collect::<Result<_, _>>()?;

        if points
            .iter()
            .any(|p| !(p.yhat.is_finite() && p.yhat_lower.is_finite() && p.yhat_upper.is_finite()))
        {
            return Err(ForecastError::NumericalInstability(
                "non-finite linear forecast".to_string(),
            ));
        }
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn test_dates_step_thirty_days() {
        let history = vec![
            ThicknessObservation::new(date(2023, 1, 1), 12.0),
            ThicknessObservation::new(date(2023, 7, 1), 11.8),
            ThicknessObservation::new(date(2024, 1, 1), 11.5),
        ];
        let points = LinearTrendStrategy.fit(&history, 3).expect("fit");
        assert_eq!(
            points.iter().map(|p| p.ds).collect::<Vec<_>>(),
            vec![date(2024, 1, 31), date(2024, 3, 1), date(2024, 3, 31)]
        );
    }

    #[test]
    fn test_exact_line_has_zero_width_interval() {
        let history: Vec<ThicknessObservation> = (0..4)
            .map(|i| {
                ThicknessObservation::new(
                    date(2020, 1, 1) + Duration::days(100 * i),
                    10.0 - 0.01 * (100 * i) as f64,
                )
            })
            .collect();
        let points = LinearTrendStrategy.fit(&history, 2).expect("fit");

        // 300 + 30 days past the first reading
        assert!((points[0].yhat - (10.0 - 0.01 * 330.0)).abs() < 1e-9);
        assert!((points[0].yhat_upper - points[0].yhat_lower).abs() < 1e-9);
    }

    #[test]
    fn test_horizon_past_calendar_range_is_an_error() {
        let history = vec![
            ThicknessObservation::new(date(2020, 1, 1), 10.0),
            ThicknessObservation::new(date(2021, 1, 1), 9.0),
            ThicknessObservation::new(date(2022, 1, 1), 8.0),
        ];
        assert_eq!(
            LinearTrendStrategy.fit(&history, 3_300_000),
            Err(ForecastError::HorizonOutOfRange { horizon: 3_300_000 })
        );
        assert!(LinearTrendStrategy.fit(&history, usize::MAX).is_err());
    }

    #[test]
    fn test_interval_uses_population_residual_std() {
        // Residuals +0.5, -0.5 around a flat mean line over symmetric x
        let history = vec![
            ThicknessObservation::new(date(2020, 1, 1), 10.5),
            ThicknessObservation::new(date(2020, 1, 11), 9.5),
            ThicknessObservation::new(date(2020, 1, 21), 9.5),
            ThicknessObservation::new(date(2020, 1, 31), 10.5),
        ];
        let points = LinearTrendStrategy.fit(&history, 1).expect("fit");
        let half_width = (points[0].yhat_upper - points[0].yhat_lower) / 2.0;
        assert!((half_width - 1.96 * 0.5).abs() < 1e-9);
    }
}
