//! Per-strategy CSV history files.
//!
//! Each `<dir>/<strategy>.csv` holds one row per day with the columns
//! `date,apy,tvl,volatility,gas_price,eth_price`. Rows may appear in any
//! order; once sorted, the dates must form one unbroken run of days.

use crate::application::ml::inference::validate_strategy_id;
use crate::domain::ml::{RawObservation, engineer_features};
use crate::domain::ports::FeatureSource;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::Duration;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

fn parse_observations<R: Read>(reader: R) -> Result<Vec<RawObservation>> {
    let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut observations = csv_reader
        .deserialize::<RawObservation>()
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to parse observation rows")?;
    observations.sort_by_key(|o| o.date);

    for pair in observations.windows(2) {
        let (prev, next) = (pair[0].date, pair[1].date);
        if next == prev {
            bail!("Duplicate observation for {}", next);
        }
        if next - prev != Duration::days(1) {
            bail!("Missing observations between {} and {}", prev, next);
        }
    }
    Ok(observations)
}

/// Reads a CSV of daily observations, sorted by date.
pub fn read_observations(path: &Path) -> Result<Vec<RawObservation>> {
    let file = std::fs::File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    parse_observations(file).with_context(|| format!("Invalid observations in {:?}", path))
}

/// Writes observations with a header row.
pub fn write_observations(path: &Path, observations: &[RawObservation]) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("Failed to create {:?}", path))?;
    for obs in observations {
        writer.serialize(obs)?;
    }
    writer.flush()?;
    Ok(())
}

/// Serves engineered feature windows from CSV files in one directory.
#[derive(Debug, Clone)]
pub struct CsvFeatureSource {
    dir: PathBuf,
}

impl CsvFeatureSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, strategy: &str) -> Result<PathBuf> {
        validate_strategy_id(strategy)?;
        Ok(self.dir.join(format!("{}.csv", strategy)))
    }
}

#[async_trait]
impl FeatureSource for CsvFeatureSource {
    async fn fetch_window(&self, strategy: &str, length: usize) -> Result<Vec<Vec<f64>>> {
        let path = self.path_for(strategy)?;
        let bytes = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read {:?}", path))?;
        let observations = parse_observations(bytes.as_slice())
            .with_context(|| format!("Invalid observations in {:?}", path))?;
        let rows = engineer_features(&observations)?;
        debug!(
            "{}: {} observations -> {} feature rows",
            strategy,
            observations.len(),
            rows.len()
        );

        if rows.len() < length {
            bail!(
                "Strategy {} has {} usable days of features, need {}",
                strategy,
                rows.len(),
                length
            );
        }
        Ok(rows[rows.len() - length..].to_vec())
    }
}
