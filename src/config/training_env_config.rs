//! Training hyperparameter defaults read from environment variables.
//!
//! Command-line flags take precedence over these values.

use crate::application::ml::{ModelVariant, TrainingConfig};
use anyhow::{Context, Result};
use std::env;

/// Training environment configuration
#[derive(Debug, Clone)]
pub struct TrainingEnvConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub sequence_length: usize,
    pub dropout: f64,
    pub attention: bool,
    pub train_fraction: f64,
    pub seed: u64,
}

impl Default for TrainingEnvConfig {
    fn default() -> Self {
        let defaults = TrainingConfig::default();
        Self {
            epochs: defaults.epochs,
            batch_size: defaults.batch_size,
            learning_rate: defaults.learning_rate,
            hidden_size: defaults.hidden_size,
            num_layers: defaults.num_layers,
            sequence_length: defaults.sequence_length,
            dropout: defaults.dropout,
            attention: defaults.variant == ModelVariant::Attention,
            train_fraction: defaults.train_fraction,
            seed: defaults.seed,
        }
    }
}

impl TrainingEnvConfig {
    pub fn from_env() -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            epochs: parse_var("ML_EPOCHS", d.epochs)?,
            batch_size: parse_var("ML_BATCH_SIZE", d.batch_size)?,
            learning_rate: parse_var("ML_LEARNING_RATE", d.learning_rate)?,
            hidden_size: parse_var("ML_HIDDEN_SIZE", d.hidden_size)?,
            num_layers: parse_var("ML_NUM_LAYERS", d.num_layers)?,
            sequence_length: parse_var("ML_SEQUENCE_LENGTH", d.sequence_length)?,
            dropout: parse_var("ML_DROPOUT", d.dropout)?,
            attention: parse_var("ML_ATTENTION", d.attention)?,
            train_fraction: parse_var("ML_TRAIN_FRACTION", d.train_fraction)?,
            seed: parse_var("ML_SEED", d.seed)?,
        })
    }

    pub fn to_training_config(&self) -> TrainingConfig {
        TrainingConfig {
            epochs: self.epochs,
            batch_size: self.batch_size,
            learning_rate: self.learning_rate,
            hidden_size: self.hidden_size,
            num_layers: self.num_layers,
            sequence_length: self.sequence_length,
            dropout: self.dropout,
            variant: if self.attention {
                ModelVariant::Attention
            } else {
                ModelVariant::Plain
            },
            train_fraction: self.train_fraction,
            seed: self.seed,
            ..TrainingConfig::default()
        }
    }
}

fn parse_var<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr + ToString,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse::<T>()
        .context(format!("Failed to parse {}", key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_falls_back_to_default() {
        let value: usize = parse_var("YIELDCAST_TEST_UNSET_USIZE", 17).unwrap();
        assert_eq!(value, 17);
        let value: bool = parse_var("YIELDCAST_TEST_UNSET_BOOL", true).unwrap();
        assert!(value);
    }

    #[test]
    fn test_defaults_match_training_config() {
        assert_eq!(
            TrainingEnvConfig::default().to_training_config(),
            TrainingConfig::default()
        );
    }
}
