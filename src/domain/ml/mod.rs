pub mod feature_registry;
pub mod framing;
pub mod metrics;
pub mod normalizer;
pub mod prediction;

pub use feature_registry::{
    FEATURE_NAMES, LONG_WINDOW, RawObservation, TARGET_COLUMNS, engineer_feature_runs,
    engineer_features,
};
pub use framing::{FramedSequences, frame_sequences};
pub use metrics::RegressionMetrics;
pub use normalizer::Normalizer;
pub use prediction::{PredictionRequest, PredictionResponse, PredictionResult};
