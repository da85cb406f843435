use anyhow::Result;
use async_trait::async_trait;

/// Supplies the most recent feature window for a strategy.
///
/// Rows are oldest first and columns follow
/// [`FEATURE_NAMES`](crate::domain::ml::FEATURE_NAMES).
#[async_trait]
pub trait FeatureSource: Send + Sync {
    async fn fetch_window(&self, strategy: &str, length: usize) -> Result<Vec<Vec<f64>>>;
}
