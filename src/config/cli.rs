//! CLI argument parsing using clap

use crate::grid::Hotspot;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Single-threaded reference solver
    Sequential,
    /// Barrier-synchronized threads on this machine
    Parallel,
    /// Distributed master - waits for workers to connect
    Master,
    /// Distributed worker - connects to a master
    Worker,
    /// Run sequential, parallel and distributed (local workers) and compare
    Compare,
}

/// heatflow - 2-D heat diffusion solver
#[derive(Parser, Debug)]
#[command(name = "heatflow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Execution mode
    #[arg(long, value_enum, default_value = "compare")]
    pub mode: ExecutionMode,

    // === Configuration File ===
    /// TOML configuration file
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    // === Grid Options ===
    /// Number of grid rows (including boundary rows)
    #[arg(long)]
    pub rows: Option<usize>,

    /// Number of grid columns (including boundary columns)
    #[arg(long)]
    pub cols: Option<usize>,

    /// Set rows and cols together
    #[arg(short = 's', long, conflicts_with_all = ["rows", "cols"])]
    pub size: Option<usize>,

    /// Initial temperature of every cell
    #[arg(long)]
    pub initial_temp: Option<f64>,

    /// Same fixed temperature on all four edges
    #[arg(long)]
    pub boundary: Option<f64>,

    /// Fixed temperature of the top edge
    #[arg(long)]
    pub top: Option<f64>,

    /// Fixed temperature of the bottom edge
    #[arg(long)]
    pub bottom: Option<f64>,

    /// Fixed temperature of the left edge
    #[arg(long)]
    pub left: Option<f64>,

    /// Fixed temperature of the right edge
    #[arg(long)]
    pub right: Option<f64>,

    /// Diffusion coefficient (overrides alpha/dt/dx)
    #[arg(long)]
    pub coefficient: Option<f64>,

    /// Thermal diffusivity
    #[arg(long)]
    pub alpha: Option<f64>,

    /// Time step
    #[arg(long)]
    pub dt: Option<f64>,

    /// Grid spacing
    #[arg(long)]
    pub dx: Option<f64>,

    /// Fixed interior hotspot as ROW,COL,TEMP (e.g., 100,100,100)
    #[arg(long, value_parser = parse_hotspot)]
    pub hotspot: Option<Hotspot>,

    // === Run Options ===
    /// Number of iterations
    #[arg(short = 'n', long)]
    pub iterations: Option<u64>,

    /// Stop once the largest per-cell change is below this value
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Number of threads or distributed workers
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    // === Network Options ===
    /// Master host (bind address for master, target for worker)
    #[arg(long, env = "HEATFLOW_HOST")]
    pub host: Option<String>,

    /// Master port
    #[arg(short = 'p', long, env = "HEATFLOW_PORT")]
    pub port: Option<u16>,

    /// Per-round deadline for worker results (milliseconds)
    #[arg(long)]
    pub round_timeout_ms: Option<u64>,

    /// Deadline for all workers to register (milliseconds)
    #[arg(long)]
    pub accept_timeout_ms: Option<u64>,

    /// How long a worker retries connecting to the master (milliseconds)
    #[arg(long)]
    pub connect_timeout_ms: Option<u64>,

    // === Output Options ===
    /// Write the run report as JSON to this file
    #[arg(long)]
    pub json_output: Option<PathBuf>,

    /// Dry run - validate configuration without executing
    #[arg(long)]
    pub dry_run: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Only log warnings and errors
    #[arg(short = 'q', long, conflicts_with = "debug")]
    pub quiet: bool,
}

/// Parse `ROW,COL,TEMP`
pub fn parse_hotspot(s: &str) -> Result<Hotspot, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        return Err(format!("expected ROW,COL,TEMP, got '{}'", s));
    }

    let row = parts[0]
        .parse::<usize>()
        .map_err(|e| format!("invalid hotspot row '{}': {}", parts[0], e))?;
    let col = parts[1]
        .parse::<usize>()
        .map_err(|e| format!("invalid hotspot column '{}': {}", parts[1], e))?;
    let temp = parts[2]
        .parse::<f64>()
        .map_err(|e| format!("invalid hotspot temperature '{}': {}", parts[2], e))?;

    Ok(Hotspot { row, col, temp })
}
