//! Seasonal/trend decomposition on a monthly grid.
//!
//! 1. Resample the history to calendar months (mean of readings per month,
//!    empty months linearly interpolated).
//! 2. Fit an OLS trend on the month index.
//! 3. Average the detrended values per calendar month into a zero-centred
//!    12-month seasonal profile.
//! 4. Project trend + season to month-end dates after the last reading, with
//!    an interval of `± z · σ_resid · sqrt(1 + h/n)`.

use chrono::{Datelike, NaiveDate};
use statrs::distribution::{ContinuousCDF, Normal};

use super::{ols, ForecastError, ForecastStrategy};
use crate::types::{ForecastPoint, ThicknessObservation};

/// Months in one seasonal cycle.
const SEASON: usize = 12;

/// Two full cycles are needed to separate trend from season.
pub const MIN_MONTHS: usize = 2 * SEASON;

/// Default central coverage of the prediction interval.
pub const DEFAULT_INTERVAL_WIDTH: f64 = 0.95;

#[derive(Debug, Clone, Copy)]
pub struct SeasonalTrendStrategy {
    interval_width: f64,
}

impl Default for SeasonalTrendStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL_WIDTH)
    }
}

impl SeasonalTrendStrategy {
    pub fn new(interval_width: f64) -> Self {
        Self { interval_width }
    }

    fn z_score(&self) -> Result<f64, ForecastError> {
        if !(self.interval_width > 0.0 && self.interval_width < 1.0) {
            return Err(ForecastError::NumericalInstability(format!(
                "interval width {} is outside (0, 1)",
                self.interval_width
            )));
        }
        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| ForecastError::NumericalInstability(e.to_string()))?;
        Ok(normal.inverse_cdf(0.5 + self.interval_width / 2.0))
    }
}

/// Months since year 0, so consecutive calendar months differ by one.
fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

fn month_end(index: i64) -> Option<NaiveDate> {
    let next = index + 1;
    let year = i32::try_from(next.div_euclid(12)).ok()?;
    let month = u32::try_from(next.rem_euclid(12)).ok()? + 1;
    NaiveDate::from_ymd_opt(year, month, 1)?.pred_opt()
}

/// Monthly means over `[first month, last month]`, gaps interpolated.
fn monthly_grid(history: &[ThicknessObservation], first: i64, months: usize) -> Vec<f64> {
    let mut sums = vec![0.0; months];
    let mut counts = vec![0usize; months];
    for o in history {
        let slot = (month_index(o.date) - first) as usize;
        sums[slot] += o.thickness;
        counts[slot] += 1;
    }

    let mut grid: Vec<Option<f64>> = sums
        .iter()
        .zip(&counts)
        .map(|(s, &c)| (c > 0).then(|| s / c as f64))
        .collect();

    // First and last months always hold a reading.
    let mut prev = 0;
    for i in 1..months {
        if grid[i].is_some() {
            if i - prev > 1 {
                let (a, b) = (grid[prev].unwrap_or(0.0), grid[i].unwrap_or(0.0));
                for (k, slot) in grid.iter_mut().enumerate().take(i).skip(prev + 1) {
                    let t = (k - prev) as f64 / (i - prev) as f64;
                    *slot = Some(a + t * (b - a));
                }
            }
            prev = i;
        }
    }

    grid.into_iter().map(|v| v.unwrap_or(0.0)).collect()
}

impl ForecastStrategy for SeasonalTrendStrategy {
    fn name(&self) -> &'static str {
        "seasonal"
    }

    fn fit(
        &self,
        history: &[ThicknessObservation],
        horizon: usize,
    ) -> Result<Vec<ForecastPoint>, ForecastError> {
        if history.len() < MIN_MONTHS {
            return Err(ForecastError::InsufficientData {
                required: MIN_MONTHS,
                found: history.len(),
            });
        }
        let last_date = history[history.len() - 1].date;
        let first = month_index(history[0].date);
        let last = month_index(last_date);
        let months = (last - first + 1) as usize;
        if months < MIN_MONTHS {
            return Err(ForecastError::InsufficientSpan {
                required: MIN_MONTHS,
                found: months,
            });
        }

        let y = monthly_grid(history, first, months);
        let t: Vec<f64> = (0..months).map(|i| i as f64).collect();
        let (intercept, slope) = ols(&t, &y)?;
        let trend = |ti: f64| intercept + slope * ti;
        let calendar = |m: i64| m.rem_euclid(SEASON as i64) as usize;

        let mut season_sum = [0.0; SEASON];
        let mut season_n = [0usize; SEASON];
        for (i, yi) in y.iter().enumerate() {
            let c = calendar(first + i as i64);
            season_sum[c] += yi - trend(t[i]);
            season_n[c] += 1;
        }
        let mut season: [f64; SEASON] =
            std::array::from_fn(|c| season_sum[c] / season_n[c].max(1) as f64);
        let centre = season.iter().sum::<f64>() / SEASON as f64;
        season.iter_mut().for_each(|s| *s -= centre);

        let n = months as f64;
        let sse: f64 = y
            .iter()
            .enumerate()
            .map(|(i, yi)| (yi - trend(t[i]) - season[calendar(first + i as i64)]).powi(2))
            .sum();
        let sigma = (sse / (n - 2.0)).sqrt();
        let z = self.z_score()?;

        let mut points = Vec::new();
        let mut m = last;
        while points.len() < horizon {
            let ds = month_end(m).ok_or(ForecastError::HorizonOutOfRange { horizon })?;
            if ds > last_date {
                let steps = (m - last) as f64;
                let yhat = trend((m - first) as f64) + season[calendar(m)];
                let margin = z * sigma * (1.0 + steps / n).sqrt();
                points.push(ForecastPoint {
                    ds,
                    yhat,
                    yhat_lower: yhat - margin,
                    yhat_upper: yhat + margin,
                });
            }
            m += 1;
        }

        if points
            .iter()
            .any(|p| !(p.yhat.is_finite() && p.yhat_lower.is_finite() && p.yhat_upper.is_finite()))
        {
            return Err(ForecastError::NumericalInstability(
                "non-finite seasonal forecast".to_string(),
            ));
        }
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn monthly_series(months: i64, start_day: u32) -> Vec<ThicknessObservation> {
        (0..months)
            .map(|i| {
                let idx = month_index(NaiveDate::from_ymd_opt(2018, 1, 1).expect("date")) + i;
                let date = NaiveDate::from_ymd_opt(
                    i32::try_from(idx.div_euclid(12)).expect("year"),
                    u32::try_from(idx.rem_euclid(12)).expect("month") + 1,
                    start_day,
                )
                .expect("date");
                let seasonal = 0.2 * (2.0 * PI * (i % 12) as f64 / 12.0).sin();
                let noise = if i % 2 == 0 { 0.01 } else { -0.01 };
                ThicknessObservation::new(date, 12.0 - 0.02 * i as f64 + seasonal + noise)
            })
            .collect()
    }

    #[test]
    fn test_month_end_dates() {
        let idx = month_index(NaiveDate::from_ymd_opt(2024, 2, 10).expect("date"));
        assert_eq!(month_end(idx), NaiveDate::from_ymd_opt(2024, 2, 29));
        let dec = month_index(NaiveDate::from_ymd_opt(2023, 12, 5).expect("date"));
        assert_eq!(month_end(dec), NaiveDate::from_ymd_opt(2023, 12, 31));
    }

    #[test]
    fn test_requires_two_years() {
        let strategy = SeasonalTrendStrategy::default();
        assert!(matches!(
            strategy.fit(&monthly_series(12, 15), 6),
            Err(ForecastError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_requires_span_not_just_count() {
        // 30 readings packed into a few months
        let history: Vec<ThicknessObservation> = (0..30)
            .map(|i| {
                ThicknessObservation::new(
                    NaiveDate::from_ymd_opt(2020, 1, 1).expect("date")
                        + chrono::Duration::days(i * 3),
                    10.0,
                )
            })
            .collect();
        assert!(matches!(
            SeasonalTrendStrategy::default().fit(&history, 6),
            Err(ForecastError::InsufficientSpan { .. })
        ));
    }

    #[test]
    fn test_forecast_follows_trend_and_season() {
        let history = monthly_series(48, 15);
        let points = SeasonalTrendStrategy::default().fit(&history, 12).expect("fit");
        let last = history[history.len() - 1].date;

        assert_eq!(points.len(), 12);
        assert!(points.iter().all(|p| p.ds > last));
        // Last reading mid-month: first point is that month's end
        assert_eq!(points[0].ds, NaiveDate::from_ymd_opt(2021, 12, 31).expect("date"));
        assert!(points.windows(2).all(|w| w[0].ds < w[1].ds));
        for p in &points {
            assert!(p.yhat_lower < p.yhat && p.yhat < p.yhat_upper);
        }
        // Month 48 continues the generating line within the seasonal amplitude
        let expected = 12.0 - 0.02 * 48.0;
        assert!((points[1].yhat - expected).abs() < 0.1);
    }

    #[test]
    fn test_interval_widens_with_horizon() {
        let points = SeasonalTrendStrategy::default()
            .fit(&monthly_series(36, 28), 24)
            .expect("fit");
        let width = |p: &ForecastPoint| p.yhat_upper - p.yhat_lower;
        assert!(width(&points[23]) > width(&points[0]));
    }

    #[test]
    fn test_gaps_are_interpolated() {
        let mut history = monthly_series(36, 15);
        history.retain(|o| o.date.month() != 6);
        let grid = monthly_grid(&history, month_index(history[0].date), 36);
        // June 2018 sits halfway between May and July
        assert!((grid[5] - (grid[4] + grid[6]) / 2.0).abs() < 1e-12);
    }
}
