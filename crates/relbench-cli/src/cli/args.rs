use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "relbench",
    version,
    about = "Measures how well an LLM reproduces human relevance judgments"
)]
pub struct Cli {
    #[command(flatten)]
    pub log: LogArgs,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Judge one configured window and record it as a run
    Run(RunArgs),
    /// Run every settings entry of a file in order
    Sweep(SweepArgs),
    /// Write a sample settings file
    Init(InitArgs),
    Version,
}

#[derive(Args, Clone)]
pub struct LogArgs {
    /// tracing filter for stderr output (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// also write one debug-level log file per run (named by run key) into this directory
    #[arg(long, global = true, env = "RELBENCH_LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Args, Clone)]
pub struct StoreOverrides {
    /// audit database (overrides audit_db from the config)
    #[arg(long)]
    pub audit_db: Option<PathBuf>,

    /// dataset database (overrides data_db from the config)
    #[arg(long)]
    pub data_db: Option<PathBuf>,
}

#[derive(Parser, Clone)]
pub struct RunArgs {
    #[arg(long, default_value = "relbench.yaml")]
    pub config: PathBuf,

    /// write the end-of-run summary as JSON to this path
    #[arg(long)]
    pub summary_json: Option<PathBuf>,

    #[command(flatten)]
    pub stores: StoreOverrides,
}

#[derive(Parser, Clone)]
pub struct SweepArgs {
    #[arg(long, default_value = "sweep.yaml")]
    pub config: PathBuf,

    /// seconds to wait between runs
    #[arg(long, default_value_t = 5)]
    pub pause: u64,

    #[command(flatten)]
    pub stores: StoreOverrides,
}

#[derive(Parser, Clone)]
pub struct InitArgs {
    #[arg(long, default_value = "relbench.yaml")]
    pub config: PathBuf,
}
