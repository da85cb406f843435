use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

/// Trading days per year used for annualisation.
const TRADING_DAYS: f64 = 252.0;

/// Regression quality over a set of predictions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
    /// Percent error over rows with a non-zero true value. `None` when every
    /// true value is zero.
    pub mape: Option<f64>,
}

impl RegressionMetrics {
    /// Computes metrics over every element of `[samples, outputs]` matrices.
    /// Returns `None` for empty or mismatched inputs.
    pub fn calculate(
        y_true: ArrayView2<'_, f64>,
        y_pred: ArrayView2<'_, f64>,
    ) -> Option<Self> {
        if y_true.is_empty() || y_true.dim() != y_pred.dim() {
            return None;
        }

        let n = y_true.len() as f64;
        let mut ss_res = 0.0;
        let mut abs_sum = 0.0;
        let mut pct_sum = 0.0;
        let mut pct_count = 0usize;
        for (t, p) in y_true.iter().zip(y_pred.iter()) {
            let err = t - p;
            ss_res += err * err;
            abs_sum += err.abs();
            if *t != 0.0 {
                pct_sum += (err / t).abs();
                pct_count += 1;
            }
        }

        let mean_true = y_true.sum() / n;
        let ss_tot: f64 = y_true.iter().map(|t| (t - mean_true).powi(2)).sum();
        let mse = ss_res / n;

        Some(Self {
            mse,
            rmse: mse.sqrt(),
            mae: abs_sum / n,
            r2: if ss_tot != 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 },
            mape: (pct_count > 0).then(|| pct_sum / pct_count as f64 * 100.0),
        })
    }
}

/// Annualised Sharpe ratio of daily returns against an annual risk-free rate.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64) -> f64 {
    if returns.len() < 2 {
        return 0.0;
    }
    let daily_rf = risk_free_rate / TRADING_DAYS;
    let n = returns.len() as f64;
    let mean = returns.iter().map(|r| r - daily_rf).sum::<f64>() / n;
    let variance = returns
        .iter()
        .map(|r| (r - daily_rf - mean).powi(2))
        .sum::<f64>()
        / n;
    let std_dev = variance.sqrt();

    if std_dev > 1e-12 {
        mean / std_dev * TRADING_DAYS.sqrt()
    } else {
        0.0
    }
}

/// Largest peak-to-trough decline as a positive fraction of the peak.
pub fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &v in values {
        peak = peak.max(v);
        if peak > 0.0 {
            worst = worst.max((peak - v) / peak);
        }
    }
    worst
}
