use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub const DEFAULT_HORIZON_DAYS: u32 = 7;

fn default_horizon() -> u32 {
    DEFAULT_HORIZON_DAYS
}

/// Prediction request for one or more strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub strategies: Vec<String>,
    #[serde(default = "default_horizon")]
    pub horizon_days: u32,
    /// Optional per-strategy windows (`[days][features]`, oldest first) used
    /// instead of the feature source.
    #[serde(default)]
    pub features: Option<HashMap<String, Vec<Vec<f64>>>>,
}

impl PredictionRequest {
    pub fn new(strategies: Vec<String>) -> Self {
        Self {
            strategies,
            horizon_days: DEFAULT_HORIZON_DAYS,
            features: None,
        }
    }

    pub fn with_horizon(mut self, horizon_days: u32) -> Self {
        self.horizon_days = horizon_days;
        self
    }

    pub fn with_override(mut self, strategy: &str, window: Vec<Vec<f64>>) -> Self {
        self.features
            .get_or_insert_with(HashMap::new)
            .insert(strategy.to_string(), window);
        self
    }

    pub fn override_for(&self, strategy: &str) -> Option<&Vec<Vec<f64>>> {
        self.features.as_ref().and_then(|f| f.get(strategy))
    }
}

/// Forecast for a single strategy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    #[serde(rename = "yield", alias = "apy")]
    pub apy: f64,
    pub volatility: f64,
    pub confidence: f64,
    /// Echoed from the request; does not change the computation.
    pub horizon_days: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predictions: BTreeMap<String, PredictionResult>,
    pub timestamp: DateTime<Utc>,
}
