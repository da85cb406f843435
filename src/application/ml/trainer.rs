use super::network::{ModelVariant, NetworkConfig, SequenceModel, mse_loss};
use super::optimizer::{Adam, clip_global_norm};
use crate::domain::errors::{ConfigurationError, DataInsufficiencyError, MlError};
use crate::domain::ml::{
    FramedSequences, LONG_WINDOW, Normalizer, RawObservation, RegressionMetrics, TARGET_COLUMNS,
    engineer_feature_runs, frame_sequences,
};
use ndarray::{Array2, ArrayView2, ArrayView3, Axis, s};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Epochs between progress log lines.
const LOG_EVERY: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub sequence_length: usize,
    pub dropout: f64,
    pub variant: ModelVariant,
    /// Columns of the feature matrix predicted at the next step.
    pub target_columns: Vec<usize>,
    /// Share of pairs (chronologically first) used for fitting.
    pub train_fraction: f64,
    pub seed: u64,
    /// Maximum global gradient norm.
    pub grad_clip: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            batch_size: 32,
            learning_rate: 0.001,
            hidden_size: 128,
            num_layers: 2,
            sequence_length: 7,
            dropout: 0.2,
            variant: ModelVariant::Plain,
            target_columns: TARGET_COLUMNS.to_vec(),
            train_fraction: 0.8,
            seed: 42,
            grad_clip: 5.0,
        }
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ConfigurationError {
    ConfigurationError::InvalidHyperparameter {
        name,
        reason: reason.into(),
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let at_least_one = [
            ("epochs", self.epochs),
            ("batch_size", self.batch_size),
            ("hidden_size", self.hidden_size),
            ("num_layers", self.num_layers),
            ("sequence_length", self.sequence_length),
            ("target_columns", self.target_columns.len()),
        ];
        for (name, value) in at_least_one {
            if value == 0 {
                return Err(invalid(name, "must be at least 1"));
            }
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(invalid(
                "learning_rate",
                format!("{} is not a positive finite number", self.learning_rate),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(invalid("dropout", format!("{} is outside [0, 1)", self.dropout)));
        }
        if !(self.train_fraction > 0.0 && self.train_fraction <= 1.0) {
            return Err(invalid(
                "train_fraction",
                format!("{} is outside (0, 1]", self.train_fraction),
            ));
        }
        if !(self.grad_clip.is_finite() && self.grad_clip > 0.0) {
            return Err(invalid("grad_clip", format!("{} must be positive", self.grad_clip)));
        }
        Ok(())
    }

    fn network(&self, input_size: usize) -> NetworkConfig {
        NetworkConfig::new(input_size, self.target_columns.len())
            .with_hidden_size(self.hidden_size)
            .with_layers(self.num_layers)
            .with_dropout(self.dropout)
            .with_variant(self.variant)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochReport {
    /// 1-based.
    pub epoch: usize,
    pub train_loss: f64,
}

/// Everything produced by one training run.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: SequenceModel,
    pub normalizer: Normalizer,
    pub sequence_length: usize,
    pub history: Vec<EpochReport>,
    pub train_pairs: usize,
    pub test_pairs: usize,
    /// Held-out MSE in target units; `None` when every pair went to training.
    pub test_loss: Option<f64>,
    pub test_metrics: Option<RegressionMetrics>,
    /// Held-out R² clamped to `[0, 1]`.
    pub confidence: f64,
}

impl TrainingOutcome {
    pub fn final_loss(&self) -> Option<f64> {
        self.history.last().map(|r| r.train_loss)
    }
}

pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Engineers features from raw daily observations and trains on them.
    ///
    /// Each unbroken run of feature rows is framed on its own, so no window
    /// spans a day the feature pipeline had to drop.
    pub fn fit_observations(
        &self,
        observations: &[RawObservation],
    ) -> Result<TrainingOutcome, MlError> {
        let cfg = &self.config;
        let mut parts = Vec::new();
        for run in engineer_feature_runs(observations)? {
            let width = run.first().map_or(0, Vec::len);
            let flat: Vec<f64> = run.iter().flatten().copied().collect();
            let series = Array2::from_shape_vec((run.len(), width), flat)
                .map_err(|e| invalid("observations", e.to_string()))?;
            let framed =
                frame_sequences(series.view(), cfg.sequence_length, Some(&cfg.target_columns))?;
            if !framed.is_empty() {
                parts.push(framed);
            }
        }
        if parts.is_empty() {
            return Err(DataInsufficiencyError::TooFewObservations {
                observations: observations.len(),
                warm_up: LONG_WINDOW - 1,
                sequence_length: cfg.sequence_length,
            }
            .into());
        }
        self.fit_framed(FramedSequences::concat(&parts)?)
    }

    /// Trains on a `[rows, features]` matrix, oldest row first.
    pub fn fit(&self, series: ArrayView2<'_, f64>) -> Result<TrainingOutcome, MlError> {
        let cfg = &self.config;
        let framed = frame_sequences(series, cfg.sequence_length, Some(&cfg.target_columns))?;
        if framed.is_empty() {
            return Err(DataInsufficiencyError::TooFewObservations {
                observations: series.nrows(),
                warm_up: 0,
                sequence_length: cfg.sequence_length,
            }
            .into());
        }
        self.fit_framed(framed)
    }

    fn fit_framed(&self, framed: FramedSequences) -> Result<TrainingOutcome, MlError> {
        let cfg = &self.config;
        let pairs = framed.len();
        let train_count = (pairs as f64 * cfg.train_fraction) as usize;
        if train_count == 0 {
            return Err(DataInsufficiencyError::EmptyTrainingSplit {
                pairs,
                train_fraction: cfg.train_fraction,
            }
            .into());
        }
        let (train, test) = framed.split_at(train_count);

        let normalizer = Normalizer::fit_windows(train.windows.view())?;
        let train = FramedSequences {
            windows: normalizer.transform_windows(train.windows.view())?,
            targets: train.targets,
        };
        let test = FramedSequences {
            windows: normalizer.transform_windows(test.windows.view())?,
            targets: test.targets,
        };

        let mut model = SequenceModel::new(cfg.network(framed.feature_width()), cfg.seed)?;
        info!(
            "Training {:?} model: {} parameters, {} train / {} held-out pairs",
            cfg.variant,
            model.parameter_count(),
            train.len(),
            test.len()
        );

        let mut rng = StdRng::seed_from_u64(cfg.seed.wrapping_add(1));
        let mut adam = Adam::new(cfg.learning_rate);
        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut history = Vec::with_capacity(cfg.epochs);

        for epoch in 1..=cfg.epochs {
            order.shuffle(&mut rng);
            let mut loss_sum = 0.0;

            for batch_idx in order.chunks(cfg.batch_size) {
                let batch = train.select(batch_idx);
                let (output, tape) = model.train_forward(batch.windows.view(), &mut rng)?;
                let (loss, d_output) = mse_loss(&output, &batch.targets);
                if !loss.is_finite() {
                    return Err(MlError::Diverged { epoch, loss });
                }
                loss_sum += loss * batch_idx.len() as f64;

                let mut grads = model.backward(&tape, &d_output);
                let norm = clip_global_norm(&mut grads, cfg.grad_clip);
                if !norm.is_finite() {
                    return Err(MlError::Diverged { epoch, loss: norm });
                }
                adam.step(&mut model, &grads);
            }

            let train_loss = loss_sum / train.len() as f64;
            history.push(EpochReport { epoch, train_loss });
            if epoch % LOG_EVERY == 0 {
                info!("Epoch [{}/{}], Loss: {:.4}", epoch, cfg.epochs, train_loss);
            } else {
                debug!("Epoch [{}/{}], Loss: {:.6}", epoch, cfg.epochs, train_loss);
            }
        }

        debug!("Finished after {} optimiser steps", adam.steps());

        let (test_loss, test_metrics) = if test.is_empty() {
            (None, None)
        } else {
            let predictions = predict_batches(&model, test.windows.view(), cfg.batch_size)?;
            let (loss, _) = mse_loss(&predictions, &test.targets);
            let metrics = RegressionMetrics::calculate(test.targets.view(), predictions.view());
            if let Some(m) = &metrics {
                info!(
                    "Held-out: MSE={:.6}, RMSE={:.6}, MAE={:.6}, R2={:.4}",
                    m.mse, m.rmse, m.mae, m.r2
                );
            }
            (Some(loss), metrics)
        };
        let confidence = test_metrics
            .map(|m| m.r2)
            .filter(|r2| r2.is_finite())
            .map_or(0.0, |r2| r2.clamp(0.0, 1.0));

        Ok(TrainingOutcome {
            model,
            normalizer,
            sequence_length: cfg.sequence_length,
            history,
            train_pairs: train.len(),
            test_pairs: test.len(),
            test_loss,
            test_metrics,
            confidence,
        })
    }
}

/// Inference over many (already normalised) windows, chunked across the
/// rayon pool. Rows of the result follow the input order.
pub fn predict_batches(
    model: &SequenceModel,
    windows: ArrayView3<'_, f64>,
    batch_size: usize,
) -> Result<Array2<f64>, ConfigurationError> {
    let count = windows.len_of(Axis(0));
    let indices: Vec<usize> = (0..count).collect();
    let parts = indices
        .par_chunks(batch_size.max(1))
        .map(|chunk| model.infer_batch(windows.select(Axis(0), chunk).view()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Array2::zeros((count, model.config().output_size));
    let mut offset = 0;
    for part in parts {
        let rows = part.nrows();
        out.slice_mut(s![offset..offset + rows, ..]).assign(&part);
        offset += rows;
    }
    Ok(out)
}
