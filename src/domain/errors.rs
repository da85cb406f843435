use std::path::PathBuf;
use thiserror::Error;

/// Errors raised before any computation starts: bad hyperparameters or
/// shapes that cannot line up.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("Invalid hyperparameter {name}: {reason}")]
    InvalidHyperparameter { name: &'static str, reason: String },

    #[error("Feature width mismatch: model expects {expected}, got {actual}")]
    FeatureWidthMismatch { expected: usize, actual: usize },

    #[error("Target column {column} out of range for feature width {width}")]
    TargetColumnOutOfRange { column: usize, width: usize },

    #[error("Invalid feature pipeline: {reason}")]
    FeaturePipeline { reason: String },

    #[error("Tensor {tensor} has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        tensor: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },
}

/// Not enough observations to build a single training pair.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DataInsufficiencyError {
    /// `warm_up` counts the leading rows consumed by rolling features before
    /// the first usable row.
    #[error(
        "{observations} observations cannot fill a window of {sequence_length} plus one target (feature warm-up {warm_up} rows)"
    )]
    TooFewObservations {
        observations: usize,
        warm_up: usize,
        sequence_length: usize,
    },

    #[error("Split left the training set empty ({pairs} pairs, train fraction {train_fraction})")]
    EmptyTrainingSplit { pairs: usize, train_fraction: f64 },
}

/// Missing, corrupt or mismatched persisted artifacts.
#[derive(Debug, Error)]
pub enum ArtifactLoadError {
    #[error("Artifact not found: {path:?}")]
    Missing { path: PathBuf },

    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt artifact {path:?}: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Checksum mismatch for {path:?}: manifest {expected}, file {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Normalizer width {normalizer} does not match model input width {model}")]
    WidthMismatch { normalizer: usize, model: usize },
}

/// Problems with a single inference request. Never affects other requests.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InferenceInputError {
    #[error("No strategies provided")]
    EmptyStrategyList,

    #[error("Model is not loaded")]
    ModelNotReady,

    #[error("Window for {strategy} has {actual} rows, expected {expected}")]
    WindowLength {
        strategy: String,
        expected: usize,
        actual: usize,
    },

    #[error("Window for {strategy} has feature width {actual}, expected {expected}")]
    FeatureWidth {
        strategy: String,
        expected: usize,
        actual: usize,
    },

    #[error("Window for {strategy} contains non-finite values")]
    NonFinite { strategy: String },

    #[error("Invalid strategy identifier: {strategy:?}")]
    InvalidStrategy { strategy: String },

    #[error("Feature source failed for {strategy}: {reason}")]
    FeatureSource { strategy: String, reason: String },
}

/// Umbrella error for the training and serving entry points.
#[derive(Debug, Error)]
pub enum MlError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    DataInsufficiency(#[from] DataInsufficiencyError),

    #[error(transparent)]
    ArtifactLoad(#[from] ArtifactLoadError),

    #[error(transparent)]
    InferenceInput(#[from] InferenceInputError),

    #[error("Training diverged at epoch {epoch}: loss is {loss}")]
    Diverged { epoch: usize, loss: f64 },

    #[error("Failed to write artifact {path:?}: {reason}")]
    ArtifactWrite { path: PathBuf, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_mismatch_formatting() {
        let err = ConfigurationError::FeatureWidthMismatch {
            expected: 12,
            actual: 10,
        };

        let msg = err.to_string();
        assert!(msg.contains("12"));
        assert!(msg.contains("10"));
    }

    #[test]
    fn test_umbrella_is_transparent() {
        let err: MlError = DataInsufficiencyError::TooFewObservations {
            observations: 5,
            warm_up: 0,
            sequence_length: 7,
        }
        .into();

        assert!(matches!(err, MlError::DataInsufficiency(_)));
        assert!(err.to_string().contains("window of 7"));
    }
}
