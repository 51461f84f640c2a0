use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "fieldops", about = "Field-service frequency, scheduling and routing pipeline")]
pub struct Cli {
    /// Set the logging level
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    /// Worker thread count: "auto" sizes to the available cores, or a fixed number
    #[arg(long, default_value = "auto", global = true)]
    pub threads: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Shared input/output/config flags every stage command takes (§10.4).
#[derive(Parser, Debug, Clone)]
pub struct StageArgs {
    /// Directory holding partners.csv, assets.csv, sku_lines.csv,
    /// consumption.csv, point_mapping.csv, driving_matrix.csv, walking_matrix.csv
    #[arg(long)]
    pub input_dir: PathBuf,

    /// Directory the stage's output tables are written to
    #[arg(long)]
    pub output_dir: PathBuf,

    /// Run configuration TOML (§6 "Config")
    #[arg(long)]
    pub config: PathBuf,

    /// Route every agent 1-to-1 against a weekly-consolidated route instead
    /// of bundling per-day routes with the similarity heuristic (§4.3, §4.4)
    #[arg(long)]
    pub one_to_one: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run only the frequency engine (S1) and write frequencies.csv
    Freq(StageArgs),
    /// Run S1 and the weekly scheduler (S2), writing schedule.csv
    Schedule(StageArgs),
    /// Run S1-S3, writing the route book and route summary tables
    Route(StageArgs),
    /// Run the full S1-S4 pipeline, writing agent routes and agent assets
    Match(StageArgs),
    /// Run S1-S4 plus the branch summary rollup and the batch manifest
    Run(StageArgs),
    /// Ingest the input tables and report diagnostics without solving anything
    Validate {
        #[arg(long)]
        input_dir: PathBuf,
        #[arg(long)]
        config: PathBuf,
    },
}
