use super::artifacts::{ArtifactManifest, load_artifacts_async};
use super::network::{ModelVariant, SequenceModel};
use super::predictor::YieldPredictor;
use crate::domain::errors::{ArtifactLoadError, InferenceInputError};
use crate::domain::ml::{Normalizer, PredictionRequest, PredictionResponse, PredictionResult};
use crate::domain::ports::FeatureSource;
use chrono::{DateTime, Utc};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Strategy ids are used as file stems by the CSV source, so they are kept to
/// a conservative alphabet.
pub fn validate_strategy_id(strategy: &str) -> Result<(), InferenceInputError> {
    let valid = !strategy.is_empty()
        && strategy
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(InferenceInputError::InvalidStrategy {
            strategy: strategy.to_string(),
        })
    }
}

/// Parameters and normaliser from one training run, always swapped together.
#[derive(Debug, Clone)]
pub struct ModelBundle {
    model: SequenceModel,
    normalizer: Normalizer,
    manifest: ArtifactManifest,
    version: String,
    name: String,
}

impl ModelBundle {
    pub fn new(model: SequenceModel, normalizer: Normalizer, manifest: ArtifactManifest) -> Self {
        let name = match model.config().variant {
            ModelVariant::Plain => "lstm",
            ModelVariant::Attention => "lstm-attention",
        };
        Self {
            version: manifest.version.to_string(),
            name: name.to_string(),
            model,
            normalizer,
            manifest,
        }
    }

    pub fn model(&self) -> &SequenceModel {
        &self.model
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn manifest(&self) -> &ArtifactManifest {
        &self.manifest
    }

    /// Predicts from a row-major `[days][features]` window.
    pub fn predict_one(
        &self,
        strategy: &str,
        window: &[Vec<f64>],
        horizon_days: u32,
    ) -> Result<PredictionResult, InferenceInputError> {
        let width = self.input_width();
        if window.len() != self.sequence_length() {
            return Err(InferenceInputError::WindowLength {
                strategy: strategy.to_string(),
                expected: self.sequence_length(),
                actual: window.len(),
            });
        }
        if let Some(row) = window.iter().find(|row| row.len() != width) {
            return Err(InferenceInputError::FeatureWidth {
                strategy: strategy.to_string(),
                expected: width,
                actual: row.len(),
            });
        }

        let flat: Vec<f64> = window.iter().flatten().copied().collect();
        let matrix = Array2::from_shape_vec((window.len(), width), flat).map_err(|_| {
            InferenceInputError::FeatureWidth {
                strategy: strategy.to_string(),
                expected: width,
                actual: window.first().map_or(0, Vec::len),
            }
        })?;
        self.predict(strategy, matrix.view(), horizon_days)
    }
}

impl YieldPredictor for ModelBundle {
    fn predict(
        &self,
        strategy: &str,
        window: ArrayView2<'_, f64>,
        horizon_days: u32,
    ) -> Result<PredictionResult, InferenceInputError> {
        let (days, width) = window.dim();
        if days != self.sequence_length() {
            return Err(InferenceInputError::WindowLength {
                strategy: strategy.to_string(),
                expected: self.sequence_length(),
                actual: days,
            });
        }
        if width != self.input_width() {
            return Err(InferenceInputError::FeatureWidth {
                strategy: strategy.to_string(),
                expected: self.input_width(),
                actual: width,
            });
        }
        if window.iter().any(|v| !v.is_finite()) {
            return Err(InferenceInputError::NonFinite {
                strategy: strategy.to_string(),
            });
        }

        let width_err = |_| InferenceInputError::FeatureWidth {
            strategy: strategy.to_string(),
            expected: self.input_width(),
            actual: width,
        };
        let normalized = self.normalizer.transform(window).map_err(width_err)?;
        let output = self.model.infer(normalized.view()).map_err(width_err)?;
        if output.iter().any(|v| !v.is_finite()) {
            return Err(InferenceInputError::NonFinite {
                strategy: strategy.to_string(),
            });
        }

        // Single-target models report zero volatility
        Ok(PredictionResult {
            apy: output[0],
            volatility: output.get(1).copied().unwrap_or(0.0),
            confidence: self.manifest.confidence,
            horizon_days,
        })
    }

    fn sequence_length(&self) -> usize {
        self.manifest.sequence_length
    }

    fn input_width(&self) -> usize {
        self.model.config().input_size
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> &str {
        &self.version
    }
}

#[derive(Debug, Clone, Default)]
pub enum ModelState {
    #[default]
    Unloaded,
    Ready(Arc<ModelBundle>),
}

/// Holds the currently served bundle. A new bundle replaces the old one in a
/// single write, so readers see either the old pair or the new pair.
#[derive(Debug, Default)]
pub struct ModelContext {
    state: RwLock<ModelState>,
}

impl ModelContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads artifacts from `dir` and swaps them in. On failure the previous
    /// state is kept.
    pub async fn load(&self, dir: &Path) -> Result<Arc<ModelBundle>, ArtifactLoadError> {
        match load_artifacts_async(dir).await {
            Ok(bundle) => Ok(self.install(bundle).await),
            Err(e) => {
                warn!("Model load from {:?} failed, keeping current state: {}", dir, e);
                Err(e)
            }
        }
    }

    pub async fn install(&self, bundle: ModelBundle) -> Arc<ModelBundle> {
        let bundle = Arc::new(bundle);
        let mut state = self.state.write().await;
        if let ModelState::Ready(previous) = &*state {
            info!("Replacing model {} with {}", previous.version(), bundle.version());
        }
        *state = ModelState::Ready(bundle.clone());
        bundle
    }

    pub async fn current(&self) -> Result<Arc<ModelBundle>, InferenceInputError> {
        match &*self.state.read().await {
            ModelState::Ready(bundle) => Ok(bundle.clone()),
            ModelState::Unloaded => Err(InferenceInputError::ModelNotReady),
        }
    }

    pub async fn is_ready(&self) -> bool {
        matches!(&*self.state.read().await, ModelState::Ready(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub model_loaded: bool,
    pub model_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub version: String,
    pub created_at: DateTime<Utc>,
    pub variant: ModelVariant,
    pub input_size: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub output_size: usize,
    pub sequence_length: usize,
    pub parameter_count: usize,
    pub feature_names: Vec<String>,
    pub confidence: f64,
}

/// Serves predictions for many strategies from the shared [`ModelContext`].
pub struct InferenceService {
    context: Arc<ModelContext>,
    source: Arc<dyn FeatureSource>,
}

impl InferenceService {
    pub fn new(context: Arc<ModelContext>, source: Arc<dyn FeatureSource>) -> Self {
        Self { context, source }
    }

    pub fn context(&self) -> &Arc<ModelContext> {
        &self.context
    }

    /// Predicts every requested strategy. The first failing strategy fails the
    /// whole request.
    pub async fn predict(
        &self,
        request: &PredictionRequest,
    ) -> Result<PredictionResponse, InferenceInputError> {
        if request.strategies.is_empty() {
            return Err(InferenceInputError::EmptyStrategyList);
        }
        let bundle = self.context.current().await?;

        let mut predictions = BTreeMap::new();
        for strategy in &request.strategies {
            validate_strategy_id(strategy)?;
            if predictions.contains_key(strategy) {
                continue;
            }

            let result = match request.override_for(strategy) {
                Some(window) => bundle.predict_one(strategy, window, request.horizon_days)?,
                None => {
                    let window = self
                        .source
                        .fetch_window(strategy, bundle.sequence_length())
                        .await
                        .map_err(|e| InferenceInputError::FeatureSource {
                            strategy: strategy.clone(),
                            reason: format!("{:#}", e),
                        })?;
                    bundle.predict_one(strategy, &window, request.horizon_days)?
                }
            };
            debug!(
                "Predicted {}: yield={:.4}, volatility={:.4}",
                strategy, result.apy, result.volatility
            );
            predictions.insert(strategy.clone(), result);
        }

        Ok(PredictionResponse {
            predictions,
            timestamp: Utc::now(),
        })
    }

    pub async fn health(&self) -> HealthReport {
        match self.context.current().await {
            Ok(bundle) => HealthReport {
                status: "healthy".to_string(),
                model_loaded: true,
                model_version: Some(bundle.version().to_string()),
            },
            Err(_) => HealthReport {
                status: "degraded".to_string(),
                model_loaded: false,
                model_version: None,
            },
        }
    }

    pub async fn model_info(&self) -> Result<ModelInfo, InferenceInputError> {
        let bundle = self.context.current().await?;
        let config = bundle.model().config();
        Ok(ModelInfo {
            name: bundle.name().to_string(),
            version: bundle.version().to_string(),
            created_at: bundle.manifest().created_at,
            variant: config.variant,
            input_size: config.input_size,
            hidden_size: config.hidden_size,
            num_layers: config.num_layers,
            output_size: config.output_size,
            sequence_length: bundle.sequence_length(),
            parameter_count: bundle.model().parameter_count(),
            feature_names: bundle.manifest().feature_names.clone(),
            confidence: bundle.manifest().confidence,
        })
    }
}
