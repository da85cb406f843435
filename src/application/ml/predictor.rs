use crate::domain::errors::InferenceInputError;
use crate::domain::ml::PredictionResult;
use ndarray::ArrayView2;

/// Interface for yield forecasting models
pub trait YieldPredictor: Send + Sync {
    /// Predict next-step yield and volatility from a raw (unnormalised)
    /// `[days, features]` window, oldest day first.
    fn predict(
        &self,
        strategy: &str,
        window: ArrayView2<'_, f64>,
        horizon_days: u32,
    ) -> Result<PredictionResult, InferenceInputError>;

    /// Number of days the model expects per window
    fn sequence_length(&self) -> usize;

    /// Number of features per day
    fn input_width(&self) -> usize;

    /// Get model name/type
    fn name(&self) -> &str;

    /// Get model version/id
    fn version(&self) -> &str;
}
