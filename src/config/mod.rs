//! Configuration module for yieldcast.
//!
//! Values come from environment variables (optionally via a `.env` file
//! loaded by the binaries with `dotenvy`).

mod training_env_config;

pub use training_env_config::TrainingEnvConfig;

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding `model.json`, `normalizer.json` and `manifest.json`.
    pub model_dir: PathBuf,
    /// Directory of per-strategy `<strategy>.csv` observation files.
    pub data_dir: PathBuf,
    /// Lowers the default log level to DEBUG.
    pub debug: bool,
    pub training: TrainingEnvConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let model_dir = env::var("ML_MODEL_DIR").unwrap_or_else(|_| "models".to_string());
        let data_dir = env::var("ML_DATA_DIR").unwrap_or_else(|_| "data/strategies".to_string());
        let debug = env::var("DEBUG")
            .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
            .unwrap_or(false);
        let training = TrainingEnvConfig::from_env().context("Failed to load training config")?;

        Ok(Self {
            model_dir: PathBuf::from(model_dir),
            data_dir: PathBuf::from(data_dir),
            debug,
            training,
        })
    }
}
