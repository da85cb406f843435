pub mod artifacts;
pub mod inference;
pub mod network;
pub mod optimizer;
pub mod predictor;
pub mod trainer;

pub use artifacts::{ArtifactManifest, load_artifacts, load_artifacts_async, save_artifacts};
pub use inference::{HealthReport, InferenceService, ModelBundle, ModelContext, ModelInfo, ModelState};
pub use network::{ModelVariant, NetworkConfig, SequenceModel};
pub use predictor::YieldPredictor;
pub use trainer::{EpochReport, Trainer, TrainingConfig, TrainingOutcome};
