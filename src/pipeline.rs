//! Drives the train → predict → sample → merge cycle over a task schedule.
//!
//! The pipeline owns the evolving population table. Sequential stages see the
//! table as left by every earlier stage; members of a bracketed group run on
//! scoped threads against the same snapshot and are merged afterwards in the
//! order they were listed.

use std::{
    collections::{BTreeMap, HashSet},
    path::PathBuf,
    thread,
};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{
    artifact::{ArtifactStore, ModelArtifact},
    config::{PipelineConfig, StageSpec},
    error::{ImputeError, Result},
    frame::AttributeTable,
    io_utils::{self, ReadOptions},
    merge::merge_attribute,
    predictor,
    sampler::Sampler,
    schedule::{Schedule, Stage},
    trainer::{self, HoldoutMetrics},
};

/// Where a stage's model comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Train every stage from its source table and persist the artifact.
    Full,
    /// Load previously persisted artifacts.
    PredictOnly,
}

/// Derives a per-stage seed from the run seed and the attribute name so that
/// results do not depend on thread scheduling.
pub fn stage_seed(run_seed: u64, attribute: &str) -> u64 {
    let digest = Sha256::digest(attribute.as_bytes());
    let mut folded = [0u8; 8];
    folded.copy_from_slice(&digest[..8]);
    run_seed ^ u64::from_le_bytes(folded)
}

#[derive(Debug, Clone, Serialize)]
pub struct TrainReport {
    pub attribute: String,
    pub classes: usize,
    pub holdout: Option<HoldoutMetrics>,
    pub artifact: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageReport {
    pub attribute: String,
    /// Position of the stage in the schedule; group members share it.
    pub step: usize,
    pub trained: bool,
    pub classes: usize,
    pub in_range: usize,
    pub out_of_range: usize,
    pub filled: usize,
    pub reconciled: usize,
    pub installed_columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holdout: Option<HoldoutMetrics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub schedule: String,
    pub seed: Option<u64>,
    pub rows: usize,
    pub columns: Vec<String>,
    pub stages: Vec<StageReport>,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct RunOutcome {
    pub population: AttributeTable,
    pub summary: RunSummary,
}

struct StageOutput {
    update: AttributeTable,
    report: StageReport,
}

pub struct Pipeline {
    config: PipelineConfig,
    schedule: Schedule,
    sources: BTreeMap<String, AttributeTable>,
    store: ArtifactStore,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, sources: BTreeMap<String, AttributeTable>) -> Result<Self> {
        let schedule = Schedule::parse(&config.tasks)?;
        for name in schedule.names() {
            config.stage(name)?;
        }
        let store = ArtifactStore::new(config.artifact_dir());
        Ok(Self {
            config,
            schedule,
            sources,
            store,
        })
    }

    /// Builds a pipeline and loads the source tables its stages train on.
    /// Prediction-only runs load no source tables.
    pub fn from_config(config: PipelineConfig, mode: RunMode) -> Result<Self> {
        let mut pipeline = Self::new(config, BTreeMap::new())?;
        if mode == RunMode::Full {
            let options = pipeline.read_options()?;
            let mut sources = BTreeMap::new();
            for name in pipeline.schedule.names() {
                let table = pipeline.config.stage(name)?.source_table(name).to_string();
                if sources.contains_key(&table) {
                    continue;
                }
                let path = pipeline.config.table_path(&table).ok_or_else(|| {
                    ImputeError::Configuration(format!(
                        "stage '{name}' trains on table '{table}' but no such table is configured"
                    ))
                })?;
                let loaded = io_utils::read_table(&path, options)?;
                info!("Source table '{table}': {} row(s) from {:?}", loaded.len(), path);
                sources.insert(table, loaded);
            }
            pipeline.sources = sources;
        }
        Ok(pipeline)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn read_options(&self) -> Result<ReadOptions> {
        ReadOptions::new(
            self.config.delimiter.as_deref(),
            self.config.input_encoding.as_deref(),
        )
    }

    pub fn load_population(&self) -> Result<AttributeTable> {
        let path = self.config.population_path();
        if !path.exists() {
            return Err(ImputeError::MissingDependency(format!(
                "population table {path:?} does not exist"
            )));
        }
        io_utils::read_table(&path, self.read_options()?)
    }

    /// Checks the whole schedule against the population before anything is
    /// mutated: every stage's features must be available when its turn comes,
    /// and every target that will collide with existing values needs a policy.
    pub fn preflight(&self, population: &AttributeTable) -> Result<()> {
        let mut available: HashSet<&str> =
            population.columns().iter().map(String::as_str).collect();
        let mut populated: HashSet<&str> = population
            .columns()
            .iter()
            .filter(|c| population.has_values(c))
            .map(String::as_str)
            .collect();

        for stage in self.schedule.stages() {
            for name in stage.names() {
                let spec = self.config.stage(name)?;
                if let Some(missing) = spec
                    .features
                    .iter()
                    .find(|f| !available.contains(f.as_str()))
                {
                    return Err(ImputeError::MissingDependency(format!(
                        "stage '{name}' needs feature column '{missing}', which is neither in \
                         the population nor produced by an earlier stage"
                    )));
                }
            }
            for name in stage.names() {
                let spec = self.config.stage(name)?;
                for target in &spec.targets {
                    if populated.contains(target.as_str())
                        && self.config.policy_for(target).is_none()
                    {
                        return Err(ImputeError::Configuration(format!(
                            "stage '{name}' writes '{target}', which will already hold values, \
                             and no conflict policy is configured for it"
                        )));
                    }
                    populated.insert(target.as_str());
                    available.insert(target.as_str());
                }
            }
        }
        Ok(())
    }

    fn source_for(&self, name: &str, spec: &StageSpec) -> Result<&AttributeTable> {
        let table = spec.source_table(name);
        self.sources.get(table).ok_or_else(|| {
            ImputeError::Configuration(format!(
                "stage '{name}' trains on table '{table}' which was not loaded"
            ))
        })
    }

    fn train_stage(&self, name: &str) -> Result<ModelArtifact> {
        let mut spec = self.config.stage(name)?.clone();
        if spec.random_state.is_none() {
            spec.random_state = self.config.seed.map(|seed| stage_seed(seed, name));
        }
        let source = self.source_for(name, &spec)?;
        let artifact = trainer::train_attribute(name, source, &spec)?;
        let path = self.store.save(&artifact)?;
        info!("Stage '{name}': model saved to {path:?}");
        Ok(artifact)
    }

    /// Trains and persists the model of every scheduled stage.
    pub fn train(&self) -> Result<Vec<TrainReport>> {
        self.schedule
            .names()
            .map(|name| {
                let artifact = self.train_stage(name).map_err(|e| e.in_stage(name))?;
                Ok(TrainReport {
                    attribute: name.to_string(),
                    classes: artifact.encoder.len(),
                    holdout: trainer::evaluate_holdout(&artifact),
                    artifact: self.store.path_for(name),
                })
            })
            .collect()
    }

    /// Runs one stage against a population snapshot and returns the sampled
    /// update with out-of-range rows re-attached. The snapshot is not touched.
    fn run_stage(
        &self,
        name: &str,
        step: usize,
        population: &AttributeTable,
        mode: RunMode,
    ) -> Result<StageOutput> {
        let spec = self.config.stage(name)?;
        let artifact = match mode {
            RunMode::Full => self.train_stage(name)?,
            RunMode::PredictOnly => self.store.load(name)?,
        };
        artifact.ensure_compatible(spec)?;

        let partition = predictor::partition(population, &artifact)?;
        if !partition.out_of_range.is_empty() {
            warn!(
                "Stage '{name}': {} row(s) have feature values outside the trained domain \
                 and keep their current '{}' values",
                partition.out_of_range.len(),
                spec.targets.join("', '")
            );
        }
        let frame = predictor::predict(&artifact, &partition.in_range)?;
        let mut sampler = Sampler::new(self.config.seed.map(|seed| stage_seed(seed, name)));
        let mut update = sampler.sample(&frame, &spec.features, &spec.targets)?;
        update
            .append_aligned(&partition.out_of_range)
            .map_err(|e| ImputeError::DomainMismatch(e.to_string()))?;
        info!("Stage '{name}': sampled {} row(s)", frame.len());

        Ok(StageOutput {
            update,
            report: StageReport {
                attribute: name.to_string(),
                step,
                trained: mode == RunMode::Full,
                classes: artifact.encoder.len(),
                in_range: partition.in_range.len(),
                out_of_range: partition.out_of_range.len(),
                filled: 0,
                reconciled: 0,
                installed_columns: Vec::new(),
                holdout: trainer::evaluate_holdout(&artifact),
            },
        })
    }

    fn run_group(
        &self,
        names: &[String],
        step: usize,
        population: &AttributeTable,
        mode: RunMode,
    ) -> Vec<Result<StageOutput>> {
        debug!("Running group [{}] on {} thread(s)", names.join(", "), names.len());
        thread::scope(|scope| {
            let handles = names
                .iter()
                .map(|name| {
                    scope.spawn(move || {
                        self.run_stage(name, step, population, mode)
                            .map_err(|e| e.in_stage(name))
                    })
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
                })
                .collect()
        })
    }

    /// Executes the whole schedule and returns the final population. Any
    /// failing stage aborts the run.
    pub fn run(&self, population: AttributeTable, mode: RunMode) -> Result<RunOutcome> {
        self.preflight(&population)?;
        let mut population = population;
        let mut reports = Vec::new();

        for (step, stage) in self.schedule.stages().iter().enumerate() {
            let outputs = match stage {
                Stage::Single(name) => vec![
                    self.run_stage(name, step, &population, mode)
                        .map_err(|e| e.in_stage(name)),
                ],
                Stage::Group(names) => self.run_group(names, step, &population, mode),
            };
            for (name, output) in stage.names().iter().zip(outputs) {
                let StageOutput { update, mut report } = output?;
                let spec = self.config.stage(name)?;
                let (next, stats) = merge_attribute(
                    population,
                    &update,
                    &spec.features,
                    &spec.targets,
                    &self.config.conflict_policies,
                )
                .map_err(|e| e.in_stage(name))?;
                population = next;
                info!(
                    "Stage '{name}': merged {} filled and {} reconciled cell(s)",
                    stats.filled, stats.reconciled
                );
                report.filled = stats.filled;
                report.reconciled = stats.reconciled;
                report.installed_columns = stats.installed_columns;
                reports.push(report);
            }
        }

        let summary = RunSummary {
            schedule: self.schedule.to_string(),
            seed: self.config.seed,
            rows: population.len(),
            columns: population.columns().to_vec(),
            stages: reports,
            completed_at: Utc::now(),
        };
        Ok(RunOutcome {
            population,
            summary,
        })
    }
}
