//! heatflow CLI entry point

use anyhow::{Context, Result};
use clap::Parser;
use heatflow::compare;
use heatflow::config::cli::{Cli, ExecutionMode};
use heatflow::config::{toml as config_toml, validator, SimConfig};
use heatflow::distributed::{DistributedMaster, DistributedWorker};
use heatflow::output::{json, text};
use heatflow::{sequential, ParallelEngine, Problem, RunReport};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let config = config_toml::load_config(&cli).context("Failed to load configuration")?;

    // A worker takes its grid from the master
    if cli.mode == ExecutionMode::Worker {
        validator::validate_network(&config.network)
            .context("Configuration validation failed")?;
    } else {
        validator::validate_config(&config).context("Configuration validation failed")?;
    }
    debug!(mode = ?cli.mode, "Configuration loaded");

    if cli.dry_run {
        println!("heatflow v{}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("{}", config);
        println!();
        println!("Dry run mode - configuration validated successfully");
        return Ok(());
    }

    match cli.mode {
        ExecutionMode::Sequential => run_sequential(&config),
        ExecutionMode::Parallel => run_parallel(&config),
        ExecutionMode::Master => run_master(&config),
        ExecutionMode::Worker => run_worker(&config),
        ExecutionMode::Compare => run_compare(&config),
    }
}

/// `--debug` selects debug, `--quiet` warn, otherwise info; `RUST_LOG` wins
fn init_logging(cli: &Cli) {
    let default_level = if cli.debug {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build_problem(config: &SimConfig) -> Result<Problem> {
    Problem::from_config(&config.grid, &config.run).context("Failed to set up problem")
}

fn build_runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("Failed to create tokio runtime")
}

fn finish_report(mode: &str, config: &SimConfig, report: &RunReport) -> Result<()> {
    text::print_report(report);

    if let Some(ref path) = config.runtime.json_output {
        let output = json::build_report_output(mode, config, report);
        json::write_json_output(path, &output, true)?;
        info!(path = %path.display(), "JSON results written");
    }
    Ok(())
}

fn run_sequential(config: &SimConfig) -> Result<()> {
    let problem = build_problem(config)?;
    let report = sequential::solve(&problem);
    finish_report("sequential", config, &report)
}

fn run_parallel(config: &SimConfig) -> Result<()> {
    let problem = build_problem(config)?;
    let report = ParallelEngine::new(config.run.workers)
        .run(&problem)
        .context("Parallel run failed")?;
    finish_report("parallel", config, &report)
}

fn run_master(config: &SimConfig) -> Result<()> {
    let problem = build_problem(config)?;
    let runtime = build_runtime()?;

    let report = runtime.block_on(async {
        let master = DistributedMaster::bind(&config.network, config.run.workers)
            .await
            .with_context(|| format!("Failed to bind {}", config.network.addr()))?;
        println!(
            "Waiting for {} worker(s) on {}",
            config.run.workers,
            master.local_addr()?
        );
        master.run(&problem).await.context("Distributed run failed")
    })?;

    finish_report("master", config, &report)
}

fn run_worker(config: &SimConfig) -> Result<()> {
    let runtime = build_runtime()?;

    let outcome = runtime.block_on(async {
        DistributedWorker::new(&config.network)
            .run()
            .await
            .context("Worker failed")
    })?;

    text::print_worker_outcome(&outcome);
    Ok(())
}

fn run_compare(config: &SimConfig) -> Result<()> {
    let problem = build_problem(config)?;
    let runtime = build_runtime()?;

    let comparison = runtime
        .block_on(compare::run_comparison(
            &problem,
            config.run.workers,
            &config.network,
        ))
        .context("Comparison failed")?;

    text::print_comparison(&comparison);

    if let Some(ref path) = config.runtime.json_output {
        let output = json::build_comparison_output(config, &comparison);
        json::write_json_output(path, &output, true)?;
        info!(path = %path.display(), "JSON results written");
    }
    Ok(())
}
