use crate::domain::errors::ConfigurationError;
use ndarray::{Array1, Array2, Array3, ArrayView2, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

/// Scale used for columns whose spread is too small to divide by.
const MIN_SCALE: f64 = 1e-10;

/// Per-feature standardisation fitted on training rows only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalizer {
    pub mean: Array1<f64>,
    pub scale: Array1<f64>,
}

impl Normalizer {
    /// Fits mean and population standard deviation per column of `rows`.
    pub fn fit(rows: ArrayView2<'_, f64>) -> Result<Self, ConfigurationError> {
        let mean = rows
            .mean_axis(Axis(0))
            .ok_or_else(|| ConfigurationError::InvalidHyperparameter {
                name: "normalizer",
                reason: "cannot fit on zero rows".to_string(),
            })?;
        let scale = rows
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s.abs() < MIN_SCALE { 1.0 } else { s });

        Ok(Self { mean, scale })
    }

    /// Fits on every time step of every training window.
    pub fn fit_windows(windows: ArrayView3<'_, f64>) -> Result<Self, ConfigurationError> {
        let (pairs, steps, width) = windows.dim();
        let flat = windows
            .as_standard_layout()
            .into_owned()
            .into_shape((pairs * steps, width))
            .map_err(|e| ConfigurationError::InvalidHyperparameter {
                name: "normalizer",
                reason: e.to_string(),
            })?;
        Self::fit(flat.view())
    }

    pub fn width(&self) -> usize {
        self.mean.len()
    }

    fn check_width(&self, actual: usize) -> Result<(), ConfigurationError> {
        if actual != self.width() {
            return Err(ConfigurationError::FeatureWidthMismatch {
                expected: self.width(),
                actual,
            });
        }
        Ok(())
    }

    /// Standardises each row of a `[rows, features]` matrix.
    pub fn transform(&self, rows: ArrayView2<'_, f64>) -> Result<Array2<f64>, ConfigurationError> {
        self.check_width(rows.ncols())?;
        Ok((&rows - &self.mean) / &self.scale)
    }

    /// Standardises a `[pairs, steps, features]` batch of windows.
    pub fn transform_windows(
        &self,
        windows: ArrayView3<'_, f64>,
    ) -> Result<Array3<f64>, ConfigurationError> {
        self.check_width(windows.len_of(Axis(2)))?;
        Ok((&windows - &self.mean) / &self.scale)
    }

    pub fn inverse_transform(
        &self,
        rows: ArrayView2<'_, f64>,
    ) -> Result<Array2<f64>, ConfigurationError> {
        self.check_width(rows.ncols())?;
        Ok(&rows * &self.scale + &self.mean)
    }
}
