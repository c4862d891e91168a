//! cprof - consensus profiles CLI
//!
//! Command-line interface for consensus signatures and sphering of
//! image-based profiles.

use clap::{Parser, Subcommand, ValueEnum};
use composable_profiles::consensus::{ConsensusConfig, ConsensusMethod, ConsensusPlan, ModzConfig};
use composable_profiles::data::{ControlSpec, OutputOptions, ProfileTable};
use composable_profiles::dose::DoseConfig;
use composable_profiles::error::Result;
use composable_profiles::normalize::{spherize_grouped, SpherizeConfig, SpherizeMethod};
use composable_profiles::pipeline::{run_batches, BatchJob, Pipeline, PipelineConfig};
use composable_profiles::select::FeatureSelectConfig;
use composable_profiles::stats::Similarity;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// CLI-friendly aggregation method
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliMethod {
    /// Coordinate-wise median
    Median,
    /// Correlation-weighted moderated z-score
    Modz,
}

impl From<CliMethod> for ConsensusMethod {
    fn from(method: CliMethod) -> Self {
        match method {
            CliMethod::Median => ConsensusMethod::Median,
            CliMethod::Modz => ConsensusMethod::Modz,
        }
    }
}

/// CLI-friendly whitening variant
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliWhitening {
    Zca,
    Pca,
    ZcaCor,
    PcaCor,
}

impl From<CliWhitening> for SpherizeMethod {
    fn from(method: CliWhitening) -> Self {
        match method {
            CliWhitening::Zca => SpherizeMethod::Zca,
            CliWhitening::Pca => SpherizeMethod::Pca,
            CliWhitening::ZcaCor => SpherizeMethod::ZcaCor,
            CliWhitening::PcaCor => SpherizeMethod::PcaCor,
        }
    }
}

/// Consensus signatures and batch sphering for Cell Painting profiles
#[derive(Parser)]
#[command(name = "cprof")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every batch of a YAML pipeline configuration
    Run {
        /// Path to pipeline configuration YAML
        #[arg(short, long)]
        config: PathBuf,

        /// Write a JSON summary of batch outcomes here
        #[arg(short, long)]
        summary: Option<PathBuf>,
    },

    /// Aggregate replicates into consensus profiles
    Consensus {
        /// Profile tables (CSV/TSV, optionally gzipped), stacked in order
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Output path (.gz for gzip)
        #[arg(short, long)]
        output: PathBuf,

        /// Aggregation method
        #[arg(short, long, value_enum, default_value = "modz")]
        method: CliMethod,

        /// Replicate key columns, in output order
        #[arg(short, long, required = true, num_args = 1..)]
        key: Vec<String>,

        /// Use Pearson instead of Spearman correlation for MODZ weights
        #[arg(long)]
        pearson: bool,

        /// Floor for MODZ replicate correlations (default: 0.0)
        #[arg(long, default_value = "0.0")]
        min_correlation: f64,
    },

    /// Whiten profiles against their controls
    Spherize {
        /// Profile tables (CSV/TSV, optionally gzipped), stacked in order
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Output path (.gz for gzip)
        #[arg(short, long)]
        output: PathBuf,

        /// Stratification columns; each group is whitened against its own controls
        #[arg(short, long, num_args = 1..)]
        strata: Vec<String>,

        /// Eigenvalue regularization (default: 1e-6)
        #[arg(short, long, default_value = "1e-6")]
        epsilon: f64,

        /// Whitening variant
        #[arg(short, long, value_enum, default_value = "zca")]
        method: CliWhitening,

        /// Metadata column identifying controls
        #[arg(long, default_value = "Metadata_broad_sample")]
        control_column: String,

        /// Value of the control column on control rows
        #[arg(long, default_value = "DMSO")]
        control_value: String,
    },

    /// Write an example pipeline configuration
    Example {
        /// Output path for the YAML configuration
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { config, summary } => cmd_run(&config, summary.as_deref()),

        Commands::Consensus {
            input,
            output,
            method,
            key,
            pearson,
            min_correlation,
        } => cmd_consensus(&input, &output, method, &key, pearson, min_correlation),

        Commands::Spherize {
            input,
            output,
            strata,
            epsilon,
            method,
            control_column,
            control_value,
        } => cmd_spherize(
            &input,
            &output,
            strata,
            epsilon,
            method,
            ControlSpec::new(&control_column, &control_value),
        ),

        Commands::Example { output } => cmd_example(&output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Per-batch line of the JSON run summary
#[derive(Serialize)]
struct BatchReport {
    name: String,
    output: PathBuf,
    success: bool,
    rows: Option<usize>,
    features: Option<usize>,
    error: Option<String>,
}

/// Run all configured batches
fn cmd_run(config_path: &Path, summary_path: Option<&Path>) -> Result<()> {
    eprintln!("Loading pipeline configuration from {:?}...", config_path);
    let config = PipelineConfig::from_file(config_path)?;
    let pipeline = Pipeline::from_config(&config);

    eprintln!(
        "Running pipeline '{}' ({} steps) on {} batches...",
        config.name,
        config.steps.len(),
        config.batches.len()
    );
    let outcomes = run_batches(&pipeline, &config.batches, &config.output);

    let reports: Vec<BatchReport> = outcomes
        .iter()
        .map(|o| BatchReport {
            name: o.name.clone(),
            output: o.output.clone(),
            success: o.is_success(),
            rows: o.result.as_ref().ok().map(|s| s.rows),
            features: o.result.as_ref().ok().map(|s| s.features),
            error: o.result.as_ref().err().map(|e| e.to_string()),
        })
        .collect();

    for r in &reports {
        match &r.error {
            None => eprintln!(
                "  {}: {} rows x {} features -> {:?}",
                r.name,
                r.rows.unwrap_or(0),
                r.features.unwrap_or(0),
                r.output
            ),
            Some(e) => eprintln!("  {}: FAILED: {}", r.name, e),
        }
    }

    if let Some(path) = summary_path {
        std::fs::write(path, serde_json::to_string_pretty(&reports)?)?;
        eprintln!("Wrote summary to {:?}", path);
    }

    let n_failed = reports.iter().filter(|r| !r.success).count();
    if n_failed > 0 {
        eprintln!("{} of {} batches failed", n_failed, reports.len());
        std::process::exit(2);
    }
    eprintln!("Done! {} batches written", reports.len());
    Ok(())
}

fn load_inputs(inputs: &[PathBuf]) -> Result<ProfileTable> {
    eprintln!("Loading {} profile file(s)...", inputs.len());
    let plates: Vec<ProfileTable> = inputs
        .iter()
        .map(ProfileTable::from_csv)
        .collect::<Result<_>>()?;
    let table = ProfileTable::concat(&plates)?;
    eprintln!(
        "Loaded {} rows x {} features",
        table.n_rows(),
        table.n_features()
    );
    Ok(table)
}

/// Aggregate replicates
fn cmd_consensus(
    inputs: &[PathBuf],
    output_path: &Path,
    method: CliMethod,
    key: &[String],
    pearson: bool,
    min_correlation: f64,
) -> Result<()> {
    let table = load_inputs(inputs)?;

    let config = ConsensusConfig {
        method: method.into(),
        replicate_columns: key.to_vec(),
        modz: ModzConfig {
            similarity: if pearson {
                Similarity::Pearson
            } else {
                Similarity::Spearman
            },
            min_correlation,
        },
    };
    let out = Pipeline::new()
        .name("consensus")
        .consensus(config)
        .run(&table)?;

    eprintln!("Writing {} consensus rows to {:?}...", out.n_rows(), output_path);
    out.to_csv(output_path, &OutputOptions::default())?;
    Ok(())
}

/// Whiten against controls
fn cmd_spherize(
    inputs: &[PathBuf],
    output_path: &Path,
    strata: Vec<String>,
    epsilon: f64,
    method: CliWhitening,
    control: ControlSpec,
) -> Result<()> {
    let table = load_inputs(inputs)?;

    let config = SpherizeConfig {
        method: method.into(),
        epsilon,
        center: true,
        control,
        strata,
    };
    let out = spherize_grouped(&table, &config)?;

    eprintln!("Writing {} spherized rows to {:?}...", out.n_rows(), output_path);
    out.to_csv(output_path, &OutputOptions::default())?;
    Ok(())
}

/// Write an example configuration for the two-batch consensus workflow
fn cmd_example(output_path: &Path) -> Result<()> {
    let pipeline = Pipeline::new()
        .name("example-consensus")
        .recode_dose(DoseConfig::default())
        .fill_metadata("Metadata_moa", "unknown")
        .fill_metadata("Metadata_target", "unknown")
        .feature_select(FeatureSelectConfig::default())
        .consensus_signatures(ConsensusPlan::default())
        .spherize(SpherizeConfig::default());

    let mut config = pipeline.to_config(Some(
        "Feature selection, MODZ consensus signatures and ZCA sphering per batch",
    ));
    config.batches = vec![
        BatchJob::new(
            "2016_04_01_a549_48hr_batch1",
            vec![
                PathBuf::from("profiles/2016_04_01_a549_48hr_batch1/SQ00014812_normalized.csv.gz"),
                PathBuf::from("profiles/2016_04_01_a549_48hr_batch1/SQ00014813_normalized.csv.gz"),
            ],
            PathBuf::from("consensus/2016_04_01_a549_48hr_batch1_modz.csv.gz"),
        ),
        BatchJob::new(
            "2017_12_05_Batch2",
            vec![
                PathBuf::from("profiles/2017_12_05_Batch2/BR00116991_normalized.csv.gz"),
                PathBuf::from("profiles/2017_12_05_Batch2/BR00116992_normalized.csv.gz"),
            ],
            PathBuf::from("consensus/2017_12_05_Batch2_modz.csv.gz"),
        ),
    ];
    let yaml = config.to_yaml()?;

    std::fs::write(output_path, &yaml)?;
    eprintln!("Wrote example pipeline to {:?}", output_path);
    eprintln!();
    eprintln!("Contents:");
    println!("{}", yaml);

    Ok(())
}
