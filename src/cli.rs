use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Impute attributes onto population microdata",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Validate a configuration and its task schedule against the population
    Check(ConfigArgs),
    /// Train and persist the model of every scheduled stage
    Train(ConfigArgs),
    /// Impute the population with previously trained models
    Predict(RunArgs),
    /// Train every stage and impute the population in one pass
    Run(RunArgs),
    /// Show the first rows of a persisted population snapshot
    Preview(PreviewArgs),
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Pipeline configuration file (YAML)
    #[arg(short, long)]
    pub config: PathBuf,
    /// Directory for outputs and models, overriding the configuration
    #[arg(long = "output-dir")]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: ConfigArgs,
    /// Run seed for sampling, overriding the configuration
    #[arg(long)]
    pub seed: Option<u64>,
    /// Print the first rows of the imputed population when done
    #[arg(long, default_value_t = 0)]
    pub preview: usize,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    /// Snapshot file written by `run` or `predict`
    #[arg(short, long)]
    pub input: PathBuf,
    /// Number of rows to display
    #[arg(long, default_value_t = 10)]
    pub rows: usize,
    /// Show per-column category counts instead of rows
    #[arg(long)]
    pub summary: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_flags_parse() {
        let cli = Cli::try_parse_from([
            "pop-impute",
            "run",
            "-c",
            "pipeline.yaml",
            "--seed",
            "7",
            "--output-dir",
            "out",
        ])
        .unwrap();
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.seed, Some(7));
                assert_eq!(args.common.output_dir, Some(PathBuf::from("out")));
                assert_eq!(args.common.config, PathBuf::from("pipeline.yaml"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn preview_defaults_to_ten_rows() {
        let cli = Cli::try_parse_from(["pop-impute", "preview", "-i", "p.snapshot"]).unwrap();
        match cli.command {
            Commands::Preview(args) => assert_eq!(args.rows, 10),
            other => panic!("unexpected command {other:?}"),
        }
    }
}
