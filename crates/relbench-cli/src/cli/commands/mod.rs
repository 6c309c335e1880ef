use super::args::*;
use relbench_core::config::{load_config, write_sample_config};
use relbench_core::context::RunContext;
use relbench_core::dataset::SqliteQrels;
use relbench_core::engine::Runner;
use relbench_core::errors::is_validation_failure;
use relbench_core::model::RunSettings;
use relbench_core::report::{console::print_summary, RunSummary};
use relbench_core::storage::Store;
use std::path::Path;
use std::sync::Arc;
use tokio::time::Duration;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const RUN_FAILED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Run(args) => cmd_run(args).await,
        Command::Sweep(args) => cmd_sweep(args).await,
        Command::Init(args) => cmd_init(args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_init(args: InitArgs) -> anyhow::Result<i32> {
    if args.config.exists() {
        eprintln!("note: {} already exists", args.config.display());
    } else {
        write_sample_config(&args.config)?;
        eprintln!("created {}", args.config.display());
    }
    Ok(exit_codes::OK)
}

async fn cmd_run(args: RunArgs) -> anyhow::Result<i32> {
    let mut runs = match load_config(&args.config) {
        Ok(runs) => runs,
        Err(e) => {
            eprintln!("config error: {}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };
    if runs.len() != 1 {
        eprintln!(
            "config error: {} holds {} runs; use `relbench sweep` for multi-run files",
            args.config.display(),
            runs.len()
        );
        return Ok(exit_codes::CONFIG_ERROR);
    }
    let mut settings = runs.remove(0);
    apply_overrides(&mut settings, &args.stores);

    let summary = match execute(RunContext::new("run"), &settings).await {
        Ok(summary) => summary,
        Err(e) => return Ok(report_failure(&e)),
    };
    if let Some(path) = &args.summary_json {
        write_summary_json(path, &summary)?;
    }
    Ok(exit_codes::OK)
}

fn write_summary_json(path: &Path, summary: &RunSummary) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(summary)?)?;
    eprintln!("wrote {}", path.display());
    Ok(())
}

async fn cmd_sweep(args: SweepArgs) -> anyhow::Result<i32> {
    let runs = match load_config(&args.config) {
        Ok(runs) => runs,
        Err(e) => {
            eprintln!("config error: {}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    let total = runs.len();
    let mut failed = 0usize;
    for (i, mut settings) in runs.into_iter().enumerate() {
        apply_overrides(&mut settings, &args.stores);
        let label = format!("sweep-{}/{}", i + 1, total);
        tracing::info!(event = "sweep_run_start", run = i + 1, total, model = %settings.model);

        if let Err(e) = execute(RunContext::new(label), &settings).await {
            failed += 1;
            report_failure(&e);
            tracing::error!(
                event = "sweep_run_failed",
                run = i + 1,
                total,
                error = %e,
                "sweep run failed, continuing"
            );
        }

        if i + 1 < total && args.pause > 0 {
            tokio::time::sleep(Duration::from_secs(args.pause)).await;
        }
    }

    eprintln!("Sweep: runs={} failed={}", total, failed);
    Ok(if failed == 0 {
        exit_codes::OK
    } else {
        exit_codes::RUN_FAILED
    })
}

fn apply_overrides(settings: &mut RunSettings, stores: &StoreOverrides) {
    if let Some(p) = &stores.audit_db {
        settings.audit_db = p.clone();
    }
    if let Some(p) = &stores.data_db {
        settings.data_db = p.clone();
    }
}

async fn execute(ctx: RunContext, settings: &RunSettings) -> anyhow::Result<RunSummary> {
    settings.validate()?;

    let source = SqliteQrels::open(&settings.data_db)?;
    let store = Store::open(&settings.audit_db)?;
    let client = relbench_core::providers::llm::build_client(settings)?;
    let provenance = relbench_core::provenance::capture(Path::new("."));

    let runner = Runner::new(store, Arc::new(source), client).with_provenance(provenance);
    let summary = runner.run_once(&ctx, settings).await?;
    print_summary(&summary);
    Ok(summary)
}

fn report_failure(e: &anyhow::Error) -> i32 {
    if is_validation_failure(e) {
        eprintln!("config error: {}", e);
        exit_codes::CONFIG_ERROR
    } else {
        eprintln!("run failed: {:#}", e);
        exit_codes::RUN_FAILED
    }
}
