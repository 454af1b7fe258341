//! Pipeline configuration loaded from YAML.
//!
//! Relative table and output paths resolve against the directory holding the
//! configuration file.

use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{
    booster::BoosterParams,
    error::{ImputeError, Result},
    merge::ConflictPolicy,
};

pub const DEFAULT_TEST_SIZE: f64 = 0.2;
const DEFAULT_OUTPUT_DIR: &str = "output";
const ARTIFACT_SUBDIR: &str = "models";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageSpec {
    pub features: Vec<String>,
    pub targets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_size: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_state: Option<u64>,
    /// Source table to train on; defaults to the stage name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default)]
    pub booster: BoosterParams,
}

impl StageSpec {
    pub fn new(features: &[&str], targets: &[&str]) -> Self {
        Self {
            features: features.iter().map(|s| s.to_string()).collect(),
            targets: targets.iter().map(|s| s.to_string()).collect(),
            test_size: None,
            random_state: None,
            table: None,
            booster: BoosterParams::default(),
        }
    }

    pub fn test_size(&self) -> f64 {
        self.test_size.unwrap_or(DEFAULT_TEST_SIZE)
    }

    pub fn source_table<'a>(&'a self, stage: &'a str) -> &'a str {
        self.table.as_deref().unwrap_or(stage)
    }

    pub fn validate(&self, stage: &str) -> Result<()> {
        if self.features.is_empty() {
            return Err(ImputeError::Configuration(format!(
                "stage '{stage}' declares no features"
            )));
        }
        if self.targets.is_empty() {
            return Err(ImputeError::Configuration(format!(
                "stage '{stage}' declares no targets"
            )));
        }
        if let Some(overlap) = self.targets.iter().find(|t| self.features.contains(t)) {
            return Err(ImputeError::Configuration(format!(
                "stage '{stage}' uses '{overlap}' as both feature and target"
            )));
        }
        let test_size = self.test_size();
        if !(0.0..1.0).contains(&test_size) {
            return Err(ImputeError::Configuration(format!(
                "stage '{stage}' test_size must be in [0, 1), got {test_size}"
            )));
        }
        self.booster.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub population: PathBuf,
    #[serde(default)]
    pub tables: BTreeMap<String, PathBuf>,
    pub stages: BTreeMap<String, StageSpec>,
    pub tasks: String,
    #[serde(default)]
    pub conflict_policies: BTreeMap<String, ConflictPolicy>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub artifact_dir: Option<PathBuf>,
    #[serde(default)]
    pub delimiter: Option<String>,
    #[serde(default)]
    pub input_encoding: Option<String>,
    #[serde(skip)]
    base_dir: PathBuf,
}

impl PipelineConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| ImputeError::io(path, e))?;
        let mut config = Self::from_str(&raw)?;
        config.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(config)
    }

    pub fn stage(&self, name: &str) -> Result<&StageSpec> {
        self.stages.get(name).ok_or_else(|| {
            ImputeError::Configuration(format!(
                "task schedule names '{name}' but no stage with that name is configured"
            ))
        })
    }

    pub fn policy_for(&self, column: &str) -> Option<ConflictPolicy> {
        self.conflict_policies.get(column).copied()
    }

    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    pub fn population_path(&self) -> PathBuf {
        self.resolve(&self.population)
    }

    pub fn table_path(&self, name: &str) -> Option<PathBuf> {
        self.tables.get(name).map(|p| self.resolve(p))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve(
            self.output_dir
                .as_deref()
                .unwrap_or(Path::new(DEFAULT_OUTPUT_DIR)),
        )
    }

    pub fn artifact_dir(&self) -> PathBuf {
        match &self.artifact_dir {
            Some(dir) => self.resolve(dir),
            None => self.output_dir().join(ARTIFACT_SUBDIR),
        }
    }

    pub fn set_output_dir(&mut self, dir: PathBuf) {
        self.output_dir = Some(dir);
    }
}

impl FromStr for PipelineConfig {
    type Err = ImputeError;

    fn from_str(raw: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(raw)
            .map_err(|e| ImputeError::Configuration(format!("parsing configuration: {e}")))?;
        for (name, stage) in &config.stages {
            stage.validate(name)?;
        }
        Ok(config)
    }
}
