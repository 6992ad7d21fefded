//! Durable storage of the model artifact and its metrics sidecar

use crate::engine::ModelArtifact;
use crate::error::{ForecastError, Result};
use crate::metrics::EvaluationMetrics;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// File-backed store for a single logical model
///
/// The artifact lives in `{dir}/{name}.json` and its metrics in
/// `{dir}/{name}_metrics.json`.
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
    name: String,
}

impl ModelStore {
    /// Create a store rooted at `dir`
    pub fn new<P: AsRef<Path>>(dir: P, name: &str) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            name: name.to_string(),
        }
    }

    /// Path of the artifact blob
    pub fn artifact_path(&self) -> PathBuf {
        self.dir.join(format!("{}.json", self.name))
    }

    /// Path of the metrics sidecar
    pub fn metrics_path(&self) -> PathBuf {
        self.dir.join(format!("{}_metrics.json", self.name))
    }

    /// Save the artifact, then its metrics
    ///
    /// Metrics are only written once the artifact is in place. Without
    /// metrics any older sidecar is removed so it cannot describe the new
    /// artifact.
    pub fn save(&self, artifact: &ModelArtifact, metrics: Option<&EvaluationMetrics>) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        write_json(&self.artifact_path(), artifact)?;
        info!(path = %self.artifact_path().display(), "Saved model artifact");

        match metrics {
            Some(metrics) => {
                write_json(&self.metrics_path(), metrics)?;
                info!(path = %self.metrics_path().display(), "Saved evaluation metrics");
            }
            None => match fs::remove_file(self.metrics_path()) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            },
        }
        Ok(())
    }

    /// Replace the metrics sidecar of an already saved artifact
    pub fn save_metrics(&self, metrics: &EvaluationMetrics) -> Result<()> {
        if !self.artifact_path().exists() {
            return Err(ForecastError::ModelNotTrained);
        }
        write_json(&self.metrics_path(), metrics)?;
        info!(path = %self.metrics_path().display(), "Saved evaluation metrics");
        Ok(())
    }

    /// Load the artifact; `Ok(None)` when nothing has been saved
    pub fn load(&self) -> Result<Option<ModelArtifact>> {
        read_json(&self.artifact_path())
    }

    /// Load the metrics sidecar, ignoring a missing or unreadable file
    pub fn load_metrics(&self) -> Option<EvaluationMetrics> {
        match read_json(&self.metrics_path()) {
            Ok(metrics) => metrics,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable metrics sidecar");
                None
            }
        }
    }
}

/// Write through a temporary file so readers never see a partial blob
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, serde_json::to_vec(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}
