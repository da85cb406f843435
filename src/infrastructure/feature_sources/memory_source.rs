use crate::domain::ports::FeatureSource;
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Feature rows held in memory, keyed by strategy.
/// Suitable for tests and for embedding the service in another process.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFeatureSource {
    rows: Arc<RwLock<HashMap<String, Vec<Vec<f64>>>>>,
}

impl InMemoryFeatureSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the feature history of `strategy` (oldest row first).
    pub async fn insert(&self, strategy: &str, rows: Vec<Vec<f64>>) {
        self.rows.write().await.insert(strategy.to_string(), rows);
    }

    /// Appends one day of features to `strategy`'s history.
    pub async fn push(&self, strategy: &str, row: Vec<f64>) {
        self.rows
            .write()
            .await
            .entry(strategy.to_string())
            .or_default()
            .push(row);
    }
}

#[async_trait]
impl FeatureSource for InMemoryFeatureSource {
    async fn fetch_window(&self, strategy: &str, length: usize) -> Result<Vec<Vec<f64>>> {
        let rows = self.rows.read().await;
        let Some(history) = rows.get(strategy) else {
            bail!("Unknown strategy: {}", strategy);
        };
        if history.len() < length {
            bail!(
                "Strategy {} has {} rows of features, need {}",
                strategy,
                history.len(),
                length
            );
        }
        Ok(history[history.len() - length..].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_returns_most_recent_rows() {
        let source = InMemoryFeatureSource::new();
        source
            .insert("aave", (0..10).map(|d| vec![d as f64, 0.0]).collect())
            .await;
        source.push("aave", vec![10.0, 0.0]).await;

        let window = source.fetch_window("aave", 3).await.unwrap();
        assert_eq!(window, vec![vec![8.0, 0.0], vec![9.0, 0.0], vec![10.0, 0.0]]);
    }

    #[tokio::test]
    async fn test_unknown_or_short_history() {
        let source = InMemoryFeatureSource::new();
        source.insert("lido", vec![vec![1.0]; 2]).await;

        assert!(source.fetch_window("aave", 1).await.is_err());
        assert!(source.fetch_window("lido", 3).await.is_err());
        assert_eq!(source.fetch_window("lido", 2).await.unwrap().len(), 2);
    }
}
