//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.

pub mod cli;
pub mod toml;
pub mod validator;

use crate::grid::{Boundary, Hotspot, StencilRule};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Complete simulation configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub grid: GridConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Grid shape, initial state and diffusion parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    #[serde(default = "default_rows")]
    pub rows: usize,
    #[serde(default = "default_cols")]
    pub cols: usize,
    /// Uniform initial temperature of every cell before boundaries are applied
    #[serde(default = "default_initial_temp")]
    pub initial_temp: f64,
    /// Diffusion coefficient; derived from alpha/dt/dx when absent
    pub coefficient: Option<f64>,
    /// Thermal diffusivity
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Time step
    #[serde(default = "default_dt")]
    pub dt: f64,
    /// Grid spacing
    #[serde(default = "default_dx")]
    pub dx: f64,
    #[serde(default)]
    pub boundary: Boundary,
    pub hotspot: Option<Hotspot>,
}

fn default_rows() -> usize {
    200
}

fn default_cols() -> usize {
    200
}

fn default_initial_temp() -> f64 {
    20.0
}

fn default_alpha() -> f64 {
    0.1
}

fn default_dt() -> f64 {
    0.1
}

fn default_dx() -> f64 {
    1.0
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            rows: default_rows(),
            cols: default_cols(),
            initial_temp: default_initial_temp(),
            coefficient: None,
            alpha: default_alpha(),
            dt: default_dt(),
            dx: default_dx(),
            boundary: Boundary::default(),
            hotspot: None,
        }
    }
}

impl GridConfig {
    /// Stencil rule from the explicit coefficient or the physical parameters
    pub fn stencil_rule(&self) -> StencilRule {
        match self.coefficient {
            Some(c) => StencilRule::new(c),
            None => StencilRule::from_physical(self.alpha, self.dt, self.dx),
        }
    }
}

/// Iteration control and parallelism
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_iterations")]
    pub iterations: u64,
    /// Stop early once the largest per-cell change drops below this value
    pub tolerance: Option<f64>,
    /// Threads (parallel) or remote workers (distributed)
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_iterations() -> u64 {
    500
}

fn default_workers() -> usize {
    num_cpus::get()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            iterations: default_iterations(),
            tolerance: None,
            workers: default_workers(),
        }
    }
}

/// Master address and distributed-mode deadlines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Deadline for every worker's result in one round
    #[serde(default = "default_round_timeout_ms")]
    pub round_timeout_ms: u64,
    /// Deadline for all workers to register
    #[serde(default = "default_accept_timeout_ms")]
    pub accept_timeout_ms: u64,
    /// How long a worker keeps retrying the master
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    12345
}

fn default_round_timeout_ms() -> u64 {
    30_000
}

fn default_accept_timeout_ms() -> u64 {
    60_000
}

fn default_connect_timeout_ms() -> u64 {
    30_000
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            round_timeout_ms: default_round_timeout_ms(),
            accept_timeout_ms: default_accept_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl NetworkConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn round_timeout(&self) -> Duration {
        Duration::from_millis(self.round_timeout_ms)
    }

    pub fn accept_timeout(&self) -> Duration {
        Duration::from_millis(self.accept_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,
    /// Write the run report(s) as JSON to this path
    pub json_output: Option<PathBuf>,
}

impl fmt::Display for GridConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}, initial={}", self.rows, self.cols, self.initial_temp)?;
        write!(
            f,
            ", boundary(top={}, bottom={}, left={}, right={})",
            self.boundary.top, self.boundary.bottom, self.boundary.left, self.boundary.right
        )?;
        match self.coefficient {
            Some(c) => write!(f, ", c={}", c)?,
            None => write!(
                f,
                ", c={:.4} (alpha={}, dt={}, dx={})",
                self.stencil_rule().coefficient(),
                self.alpha,
                self.dt,
                self.dx
            )?,
        }
        if let Some(h) = self.hotspot {
            write!(f, ", hotspot=({}, {})@{}", h.row, h.col, h.temp)?;
        }
        Ok(())
    }
}

impl fmt::Display for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} iteration(s), {} worker(s)", self.iterations, self.workers)?;
        if let Some(tol) = self.tolerance {
            write!(f, ", tolerance={:e}", tol)?;
        }
        Ok(())
    }
}

impl fmt::Display for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (round timeout {}ms, accept timeout {}ms, connect timeout {}ms)",
            self.addr(),
            self.round_timeout_ms,
            self.accept_timeout_ms,
            self.connect_timeout_ms
        )
    }
}

impl fmt::Display for RuntimeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.debug {
            parts.push("debug".to_string());
        }
        if let Some(ref path) = self.json_output {
            parts.push(format!("json={}", path.display()));
        }
        if parts.is_empty() {
            write!(f, "default")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

impl fmt::Display for SimConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Grid:    {}", self.grid)?;
        writeln!(f, "Run:     {}", self.run)?;
        writeln!(f, "Network: {}", self.network)?;
        write!(f, "Runtime: {}", self.runtime)
    }
}
