use crate::domain::errors::ConfigurationError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use ta::Next;
use ta::indicators::SimpleMovingAverage;

/// Ordered list of feature names.
/// This order MUST match between the trainer and the inference service.
/// Any change here is a breaking change for persisted models.
pub const FEATURE_NAMES: &[&str] = &[
    "apy",
    "volatility",
    "tvl",
    "gas_price",
    "eth_price",
    "apy_ma_7",
    "apy_ma_30",
    "volatility_ma_7",
    "apy_momentum",
    "tvl_momentum",
    "apy_std_7",
    "apy_std_30",
];

/// Columns the predictor forecasts: dimension 0 is yield, dimension 1 is volatility.
pub const TARGET_COLUMNS: &[usize] = &[0, 1];

/// Longest lookback used by [`engineer_features`]; the first
/// `LONG_WINDOW - 1` rows of a series never produce a feature row.
pub const LONG_WINDOW: usize = 30;
const SHORT_WINDOW: usize = 7;
const MOMENTUM_PERIOD: usize = 7;

/// One day of strategy metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub date: NaiveDate,
    pub apy: f64,
    pub tvl: f64,
    pub volatility: f64,
    pub gas_price: f64,
    pub eth_price: f64,
}

impl RawObservation {
    /// Raw columns in registry order.
    pub fn raw_vector(&self) -> [f64; 5] {
        [
            self.apy,
            self.volatility,
            self.tvl,
            self.gas_price,
            self.eth_price,
        ]
    }
}

fn pct_change(current: f64, previous: f64) -> f64 {
    (current - previous) / previous
}

fn pipeline_err<E: std::fmt::Debug>(e: E) -> ConfigurationError {
    ConfigurationError::FeaturePipeline {
        reason: format!("{:?}", e),
    }
}

fn sample_std(window: &[f64]) -> f64 {
    window.iter().copied().std_dev()
}

/// Builds the engineered feature rows (columns in [`FEATURE_NAMES`] order)
/// from date-ordered daily observations, split into runs of consecutive days.
///
/// The first `LONG_WINDOW - 1` days only warm up the rolling features. A day
/// whose momentum is not finite (a zero base value) yields no row and ends the
/// current run, so no run ever spans a missing day.
pub fn engineer_feature_runs(
    observations: &[RawObservation],
) -> Result<Vec<Vec<Vec<f64>>>, ConfigurationError> {
    let mut apy_ma_7 = SimpleMovingAverage::new(SHORT_WINDOW).map_err(pipeline_err)?;
    let mut apy_ma_30 = SimpleMovingAverage::new(LONG_WINDOW).map_err(pipeline_err)?;
    let mut vol_ma_7 = SimpleMovingAverage::new(SHORT_WINDOW).map_err(pipeline_err)?;

    let apy: Vec<f64> = observations.iter().map(|o| o.apy).collect();
    let mut runs = Vec::new();
    let mut run: Vec<Vec<f64>> = Vec::new();

    for (i, obs) in observations.iter().enumerate() {
        // Indicators must see every row to keep their internal windows aligned.
        let ma_7 = apy_ma_7.next(obs.apy);
        let ma_30 = apy_ma_30.next(obs.apy);
        let v_ma_7 = vol_ma_7.next(obs.volatility);

        if i + 1 < LONG_WINDOW {
            continue;
        }

        let base = &observations[i - MOMENTUM_PERIOD];
        let apy_momentum = pct_change(obs.apy, base.apy);
        let tvl_momentum = pct_change(obs.tvl, base.tvl);
        if !apy_momentum.is_finite() || !tvl_momentum.is_finite() {
            if !run.is_empty() {
                runs.push(std::mem::take(&mut run));
            }
            continue;
        }

        let [apy_v, volatility, tvl, gas_price, eth_price] = obs.raw_vector();
        run.push(vec![
            apy_v,
            volatility,
            tvl,
            gas_price,
            eth_price,
            ma_7,
            ma_30,
            v_ma_7,
            apy_momentum,
            tvl_momentum,
            sample_std(&apy[i + 1 - SHORT_WINDOW..=i]),
            sample_std(&apy[i + 1 - LONG_WINDOW..=i]),
        ]);
    }
    if !run.is_empty() {
        runs.push(run);
    }

    Ok(runs)
}

/// Feature rows of the most recent unbroken run of days, oldest first.
/// Empty when no day has a full lookback.
pub fn engineer_features(
    observations: &[RawObservation],
) -> Result<Vec<Vec<f64>>, ConfigurationError> {
    Ok(engineer_feature_runs(observations)?.pop().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(days: usize) -> Vec<RawObservation> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..days)
            .map(|d| RawObservation {
                date: start + chrono::Duration::days(d as i64),
                apy: 0.05 + d as f64 * 0.001,
                tvl: 1.0e6 + d as f64 * 1.0e3,
                volatility: 0.1,
                gas_price: 30.0,
                eth_price: 2000.0,
            })
            .collect()
    }

    #[test]
    fn test_feature_row_width_matches_registry() {
        let rows = engineer_features(&series(40)).unwrap();
        assert_eq!(rows.len(), 40 - (LONG_WINDOW - 1));
        assert!(rows.iter().all(|r| r.len() == FEATURE_NAMES.len()));
    }

    #[test]
    fn test_rolling_values() {
        let obs = series(30);
        let rows = engineer_features(&obs).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];

        // apy is 0.05 + 0.001 * d, last row is d = 29
        assert!((row[0] - 0.079).abs() < 1e-12);
        // 7-day mean of d = 23..=29 is d = 26
        assert!((row[5] - 0.076).abs() < 1e-12);
        // 30-day mean of d = 0..=29 is d = 14.5
        assert!((row[6] - 0.0645).abs() < 1e-12);
        // constant volatility
        assert!((row[7] - 0.1).abs() < 1e-12);
        assert!((row[8] - (0.079 - 0.072) / 0.072).abs() < 1e-12);
        assert!(row[10] > 0.0 && row[11] > row[10]);
    }

    #[test]
    fn test_zero_base_rows_are_dropped() {
        let mut obs = series(31);
        // base of the momentum for the row at index 29 is index 22
        obs[22].tvl = 0.0;
        let rows = engineer_features(&obs).unwrap();
        assert_eq!(rows.len(), 1);
        assert!((rows[0][0] - obs[30].apy).abs() < 1e-12);
    }

    #[test]
    fn test_short_series_yields_nothing() {
        assert!(engineer_features(&series(10)).unwrap().is_empty());
        assert!(engineer_feature_runs(&series(29)).unwrap().is_empty());
    }

    #[test]
    fn test_dropped_day_splits_runs() {
        let mut obs = series(50);
        // base of the momentum for the row at index 42
        obs[35].tvl = 0.0;

        let runs = engineer_feature_runs(&obs).unwrap();
        assert_eq!(runs.iter().map(Vec::len).collect::<Vec<_>>(), vec![13, 7]);
        assert!((runs[0][12][0] - obs[41].apy).abs() < 1e-12);
        assert!((runs[1][0][0] - obs[43].apy).abs() < 1e-12);

        // Only the latest run is served, so no window straddles day 42
        let latest = engineer_features(&obs).unwrap();
        assert_eq!(latest, runs[1]);
    }
}
