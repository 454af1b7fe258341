pub mod artifact;
pub mod booster;
pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod frame;
pub mod io_utils;
pub mod labels;
pub mod merge;
pub mod pipeline;
pub mod predictor;
pub mod sampler;
pub mod schedule;
pub mod snapshot;
pub mod table;
pub mod trainer;

use std::{env, fs, path::Path, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands},
    config::PipelineConfig,
    pipeline::{Pipeline, RunMode, RunOutcome},
    snapshot::{PopulationSnapshot, SNAPSHOT_FILE},
};

const POPULATION_CSV: &str = "population.csv";
const RUN_SUMMARY: &str = "run_summary.json";

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("pop_impute", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Check(args) => handle_check(&args),
        Commands::Train(args) => handle_train(&args),
        Commands::Predict(args) => handle_run(&args, RunMode::PredictOnly),
        Commands::Run(args) => handle_run(&args, RunMode::Full),
        Commands::Preview(args) => handle_preview(&args),
    }
}

fn load_config(args: &cli::ConfigArgs) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load(&args.config)
        .with_context(|| format!("Loading configuration from {:?}", args.config))?;
    if let Some(dir) = &args.output_dir {
        config.set_output_dir(dir.clone());
    }
    Ok(config)
}

fn handle_check(args: &cli::ConfigArgs) -> Result<()> {
    let config = load_config(args)?;
    let pipeline = Pipeline::new(config, Default::default())
        .with_context(|| format!("Validating configuration {:?}", args.config))?;
    let population = pipeline.load_population().with_context(|| {
        format!(
            "Loading population table {:?}",
            pipeline.config().population_path()
        )
    })?;
    pipeline
        .preflight(&population)
        .with_context(|| format!("Checking schedule '{}'", pipeline.schedule()))?;

    let headers = ["step", "stage", "features", "targets", "table"].map(String::from);
    let mut rows = Vec::new();
    for (step, stage) in pipeline.schedule().stages().iter().enumerate() {
        for name in stage.names() {
            let spec = pipeline.config().stage(name)?;
            rows.push(vec![
                step.to_string(),
                name.clone(),
                spec.features.join(", "),
                spec.targets.join(", "),
                spec.source_table(name).to_string(),
            ]);
        }
    }
    table::print_table(&headers, &rows);
    info!(
        "Schedule '{}' is valid for {} population row(s)",
        pipeline.schedule(),
        population.len()
    );
    Ok(())
}

fn handle_train(args: &cli::ConfigArgs) -> Result<()> {
    let config = load_config(args)?;
    let pipeline = Pipeline::from_config(config, RunMode::Full)
        .with_context(|| format!("Preparing pipeline from {:?}", args.config))?;
    let reports = pipeline.train().context("Training scheduled stages")?;

    let headers = ["stage", "classes", "holdout accuracy", "artifact"].map(String::from);
    let rows = reports
        .iter()
        .map(|r| {
            vec![
                r.attribute.clone(),
                r.classes.to_string(),
                r.holdout
                    .map(|m| format!("{:.3}", m.accuracy))
                    .unwrap_or_else(|| "-".to_string()),
                r.artifact.display().to_string(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    info!(
        "Trained {} stage(s) into {:?}",
        reports.len(),
        pipeline.store().dir()
    );
    Ok(())
}

fn handle_run(args: &cli::RunArgs, mode: RunMode) -> Result<()> {
    let mut config = load_config(&args.common)?;
    if let Some(seed) = args.seed {
        config.seed = Some(seed);
    }
    let pipeline = Pipeline::from_config(config, mode)
        .with_context(|| format!("Preparing pipeline from {:?}", args.common.config))?;
    let population = pipeline.load_population().with_context(|| {
        format!(
            "Loading population table {:?}",
            pipeline.config().population_path()
        )
    })?;
    info!(
        "Running schedule '{}' over {} population row(s)",
        pipeline.schedule(),
        population.len()
    );
    let outcome = pipeline
        .run(population, mode)
        .with_context(|| format!("Running schedule '{}'", pipeline.schedule()))?;
    persist_outcome(&pipeline.config().output_dir(), &outcome)?;

    if args.preview > 0 {
        print!(
            "{}",
            table::render_population(&outcome.population, args.preview)
        );
    }
    Ok(())
}

fn persist_outcome(output_dir: &Path, outcome: &RunOutcome) -> Result<()> {
    fs::create_dir_all(output_dir)
        .with_context(|| format!("Creating output directory {output_dir:?}"))?;

    let snapshot_path = output_dir.join(SNAPSHOT_FILE);
    PopulationSnapshot::from_table(&outcome.population)
        .save(&snapshot_path)
        .with_context(|| format!("Writing snapshot to {snapshot_path:?}"))?;

    let csv_path = output_dir.join(POPULATION_CSV);
    io_utils::write_table_csv(&outcome.population, &csv_path)
        .with_context(|| format!("Writing population to {csv_path:?}"))?;

    let summary_path = output_dir.join(RUN_SUMMARY);
    io_utils::write_json(&outcome.summary, &summary_path)
        .with_context(|| format!("Writing run summary to {summary_path:?}"))?;

    debug!("Run summary: {:?}", outcome.summary.stages);
    info!(
        "Population of {} row(s) x {} column(s) written to {:?}",
        outcome.population.len(),
        outcome.population.columns().len(),
        output_dir
    );
    Ok(())
}

fn handle_preview(args: &cli::PreviewArgs) -> Result<()> {
    let snapshot = PopulationSnapshot::load(&args.input)
        .with_context(|| format!("Reading snapshot {:?}", args.input))?;
    if args.summary {
        print!("{}", table::render_snapshot_summary(&snapshot));
        return Ok(());
    }
    let population = snapshot
        .to_table()
        .with_context(|| format!("Decoding snapshot {:?}", args.input))?;
    print!("{}", table::render_population(&population, args.rows));
    info!(
        "Displayed {} of {} row(s) from {:?}",
        args.rows.min(population.len()),
        population.len(),
        args.input
    );
    Ok(())
}
