use super::inference::ModelBundle;
use super::network::SequenceModel;
use super::trainer::TrainingOutcome;
use crate::domain::errors::{ArtifactLoadError, MlError};
use crate::domain::ml::{Normalizer, RegressionMetrics};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

pub const MODEL_FILE: &str = "model.json";
pub const NORMALIZER_FILE: &str = "normalizer.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Describes one persisted training run and pins the checksums of its blobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub version: Uuid,
    pub created_at: DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub sequence_length: usize,
    pub confidence: f64,
    pub test_metrics: Option<RegressionMetrics>,
    pub model_sha256: String,
    pub normalizer_sha256: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn write_err(path: &Path, reason: impl ToString) -> MlError {
    MlError::ArtifactWrite {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), MlError> {
    fs::write(path, bytes).map_err(|e| write_err(path, e))
}

/// Writes `model.json`, `normalizer.json` and `manifest.json` into `dir`.
///
/// The manifest is written last, so a directory with a manifest always has
/// both blobs it refers to.
pub fn save_artifacts(
    dir: &Path,
    outcome: &TrainingOutcome,
    feature_names: &[String],
) -> Result<ArtifactManifest, MlError> {
    let width = outcome.normalizer.width();
    if feature_names.len() != width {
        return Err(write_err(
            dir,
            format!("{} feature names for width {}", feature_names.len(), width),
        ));
    }
    fs::create_dir_all(dir).map_err(|e| write_err(dir, e))?;

    let model_bytes = serde_json::to_vec(&outcome.model).map_err(|e| write_err(dir, e))?;
    let normalizer_bytes =
        serde_json::to_vec_pretty(&outcome.normalizer).map_err(|e| write_err(dir, e))?;

    let manifest = ArtifactManifest {
        version: Uuid::new_v4(),
        created_at: Utc::now(),
        feature_names: feature_names.to_vec(),
        sequence_length: outcome.sequence_length,
        confidence: outcome.confidence,
        test_metrics: outcome.test_metrics,
        model_sha256: sha256_hex(&model_bytes),
        normalizer_sha256: sha256_hex(&normalizer_bytes),
    };
    let manifest_bytes = serde_json::to_vec_pretty(&manifest).map_err(|e| write_err(dir, e))?;

    write_file(&dir.join(MODEL_FILE), &model_bytes)?;
    write_file(&dir.join(NORMALIZER_FILE), &normalizer_bytes)?;
    write_file(&dir.join(MANIFEST_FILE), &manifest_bytes)?;

    info!("Saved model {} to {:?}", manifest.version, dir);
    Ok(manifest)
}

type FileBytes = (PathBuf, Vec<u8>);

fn read_result(path: PathBuf, read: std::io::Result<Vec<u8>>) -> Result<FileBytes, ArtifactLoadError> {
    match read {
        Ok(bytes) => Ok((path, bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(ArtifactLoadError::Missing { path }),
        Err(source) => Err(ArtifactLoadError::Io { path, source }),
    }
}

fn read_file(path: PathBuf) -> Result<FileBytes, ArtifactLoadError> {
    let read = fs::read(&path);
    read_result(path, read)
}

async fn read_file_async(path: PathBuf) -> Result<FileBytes, ArtifactLoadError> {
    let read = tokio::fs::read(&path).await;
    read_result(path, read)
}

fn parse<T: DeserializeOwned>(path: &Path, bytes: &[u8]) -> Result<T, ArtifactLoadError> {
    serde_json::from_slice(bytes).map_err(|e| ArtifactLoadError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn verify(path: &Path, bytes: &[u8], expected: &str) -> Result<(), ArtifactLoadError> {
    let actual = sha256_hex(bytes);
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(ArtifactLoadError::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}

/// Reads and validates the artifacts in `dir`. Nothing is returned unless
/// every file is present, matches its checksum and the shapes line up.
pub fn load_artifacts(dir: &Path) -> Result<ModelBundle, ArtifactLoadError> {
    let manifest = read_file(dir.join(MANIFEST_FILE))?;
    let model = read_file(dir.join(MODEL_FILE))?;
    let normalizer = read_file(dir.join(NORMALIZER_FILE))?;
    assemble(dir, manifest, model, normalizer)
}

/// [`load_artifacts`] with the file reads done through `tokio::fs`.
pub async fn load_artifacts_async(dir: &Path) -> Result<ModelBundle, ArtifactLoadError> {
    let manifest = read_file_async(dir.join(MANIFEST_FILE)).await?;
    let model = read_file_async(dir.join(MODEL_FILE)).await?;
    let normalizer = read_file_async(dir.join(NORMALIZER_FILE)).await?;
    assemble(dir, manifest, model, normalizer)
}

fn assemble(
    dir: &Path,
    (manifest_path, manifest_bytes): FileBytes,
    (model_path, model_bytes): FileBytes,
    (normalizer_path, normalizer_bytes): FileBytes,
) -> Result<ModelBundle, ArtifactLoadError> {
    let manifest: ArtifactManifest = parse(&manifest_path, &manifest_bytes)?;
    verify(&model_path, &model_bytes, &manifest.model_sha256)?;
    verify(&normalizer_path, &normalizer_bytes, &manifest.normalizer_sha256)?;

    let model: SequenceModel = parse(&model_path, &model_bytes)?;
    model
        .check_shapes()
        .map_err(|e| ArtifactLoadError::Corrupt {
            path: model_path.clone(),
            reason: e.to_string(),
        })?;
    let normalizer: Normalizer = parse(&normalizer_path, &normalizer_bytes)?;
    if normalizer.mean.len() != normalizer.scale.len()
        || normalizer.scale.iter().any(|s| !s.is_finite() || *s <= 0.0)
    {
        return Err(ArtifactLoadError::Corrupt {
            path: normalizer_path,
            reason: "mean and scale must have equal length and positive finite scales"
                .to_string(),
        });
    }

    let input = model.config().input_size;
    if normalizer.width() != input {
        return Err(ArtifactLoadError::WidthMismatch {
            normalizer: normalizer.width(),
            model: input,
        });
    }
    if manifest.feature_names.len() != input || manifest.sequence_length == 0 {
        return Err(ArtifactLoadError::Corrupt {
            path: manifest_path,
            reason: format!(
                "{} feature names and sequence length {} for model width {}",
                manifest.feature_names.len(),
                manifest.sequence_length,
                input
            ),
        });
    }

    info!("Loaded model {} from {:?}", manifest.version, dir);
    Ok(ModelBundle::new(model, normalizer, manifest))
}
