//! Model artifacts and their on-disk store.
//!
//! An artifact is written once per stage by the trainer and read back by a
//! prediction-only run. The blob carries a format version and a fingerprint
//! of its feature/target columns so a stale model is refused instead of
//! silently predicting against changed columns.

use std::{
    fs::{self, File},
    io::BufWriter,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    booster::CategoricalBooster,
    config::StageSpec,
    data::Value,
    error::{ImputeError, Result},
    labels::{CategoryDomain, LabelEncoder},
};

const ARTIFACT_VERSION: u32 = 1;

/// Encoded rows held back from training.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HoldoutSplit {
    pub rows: Vec<Vec<u32>>,
    pub labels: Vec<usize>,
}

impl HoldoutSplit {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    version: u32,
    pub stage: String,
    pub feature_columns: Vec<String>,
    pub target_columns: Vec<String>,
    pub domains: Vec<CategoryDomain>,
    pub encoder: LabelEncoder,
    pub classifier: CategoricalBooster,
    pub holdout: HoldoutSplit,
    pub trained_at: DateTime<Utc>,
    fingerprint: String,
}

impl ModelArtifact {
    pub fn new(
        stage: &str,
        feature_columns: Vec<String>,
        target_columns: Vec<String>,
        domains: Vec<CategoryDomain>,
        encoder: LabelEncoder,
        classifier: CategoricalBooster,
        holdout: HoldoutSplit,
    ) -> Self {
        let fingerprint = column_fingerprint(&feature_columns, &target_columns);
        Self {
            version: ARTIFACT_VERSION,
            stage: stage.to_string(),
            feature_columns,
            target_columns,
            domains,
            encoder,
            classifier,
            holdout,
            trained_at: Utc::now(),
            fingerprint,
        }
    }

    /// Refuses an artifact trained for different columns than `spec` declares.
    pub fn ensure_compatible(&self, spec: &StageSpec) -> Result<()> {
        if self.feature_columns != spec.features || self.target_columns != spec.targets {
            return Err(ImputeError::ModelArtifact(format!(
                "model for stage '{}' was trained on features {:?} -> targets {:?}, \
                 but the stage now declares {:?} -> {:?}; retrain it",
                self.stage,
                self.feature_columns,
                self.target_columns,
                spec.features,
                spec.targets
            )));
        }
        if self.fingerprint != column_fingerprint(&self.feature_columns, &self.target_columns) {
            return Err(ImputeError::ModelArtifact(format!(
                "model for stage '{}' has a corrupt column fingerprint",
                self.stage
            )));
        }
        Ok(())
    }

    /// Category codes for one row of feature values, or `None` when any value
    /// lies outside the trained domain.
    pub fn encode_features(&self, values: &[Option<&Value>]) -> Option<Vec<u32>> {
        if values.len() != self.domains.len() {
            return None;
        }
        values
            .iter()
            .zip(&self.domains)
            .map(|(value, domain)| value.and_then(|v| domain.code(v)))
            .collect()
    }

    fn reindex(&mut self) {
        for domain in &mut self.domains {
            domain.reindex();
        }
    }
}

fn column_fingerprint(features: &[String], targets: &[String]) -> String {
    let mut hasher = Sha256::new();
    for feature in features {
        hasher.update(feature.as_bytes());
        hasher.update([0x1f]);
    }
    hasher.update([0x1e]);
    for target in targets {
        hasher.update(target.as_bytes());
        hasher.update([0x1f]);
    }
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// Directory of persisted artifacts keyed by stage name.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, stage: &str) -> PathBuf {
        self.dir.join(format!("model_{stage}.bin"))
    }

    pub fn save(&self, artifact: &ModelArtifact) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir).map_err(|e| ImputeError::io(&self.dir, e))?;
        let path = self.path_for(&artifact.stage);
        let file = File::create(&path).map_err(|e| ImputeError::io(&path, e))?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(artifact, &mut writer, bincode::config::standard())
            .map_err(|e| {
                ImputeError::ModelArtifact(format!("writing model to {path:?}: {e}"))
            })?;
        debug!("Model for stage '{}' written to {:?}", artifact.stage, path);
        Ok(path)
    }

    pub fn load(&self, stage: &str) -> Result<ModelArtifact> {
        let path = self.path_for(stage);
        let bytes = fs::read(&path).map_err(|e| {
            ImputeError::ModelArtifact(format!(
                "no trained model for stage '{stage}' at {path:?} ({e}); run training first"
            ))
        })?;
        let (mut artifact, _): (ModelArtifact, usize) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).map_err(
                |e| ImputeError::ModelArtifact(format!("reading model from {path:?}: {e}")),
            )?;
        if artifact.version != ARTIFACT_VERSION {
            return Err(ImputeError::ModelArtifact(format!(
                "unsupported model version {} in {path:?} (expected {ARTIFACT_VERSION})",
                artifact.version
            )));
        }
        if artifact.stage != stage {
            return Err(ImputeError::ModelArtifact(format!(
                "{path:?} holds the model for stage '{}', not '{stage}'",
                artifact.stage
            )));
        }
        artifact.reindex();
        Ok(artifact)
    }
}
