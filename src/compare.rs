//! Side-by-side runs of every paradigm on the same problem
//!
//! The sequential solver is the baseline. The distributed run uses in-process
//! workers that connect to a master over loopback TCP, so the full wire path is
//! exercised without external processes.

use crate::config::NetworkConfig;
use crate::distributed::{DistributedMaster, DistributedWorker};
use crate::engine::ParallelEngine;
use crate::error::{Result, SimError};
use crate::partition::partition_rows;
use crate::problem::Problem;
use crate::report::RunReport;
use crate::sequential;
use crate::util::time::{efficiency, speedup};
use tracing::{debug, info, warn};

/// One paradigm's result measured against the baseline
#[derive(Debug, Clone)]
pub struct ComparisonEntry {
    pub report: RunReport,
    /// Baseline elapsed time divided by this run's elapsed time
    pub speedup: f64,
    /// Speedup per worker
    pub efficiency: f64,
    /// Largest per-cell deviation from the baseline grid
    pub max_diff: f64,
}

impl ComparisonEntry {
    pub fn against(report: RunReport, baseline: &RunReport) -> Self {
        let speedup = speedup(baseline.elapsed, report.elapsed);
        let efficiency = efficiency(speedup, report.workers);
        let max_diff = baseline.grid.max_abs_diff(&report.grid);
        Self {
            report,
            speedup,
            efficiency,
            max_diff,
        }
    }
}

/// Baseline plus every other paradigm's entry
#[derive(Debug, Clone)]
pub struct Comparison {
    pub baseline: RunReport,
    pub entries: Vec<ComparisonEntry>,
}

impl Comparison {
    /// Largest deviation from the baseline across all entries
    pub fn max_diff(&self) -> f64 {
        self.entries
            .iter()
            .map(|e| e.max_diff)
            .fold(0.0, f64::max)
    }

    /// True when every entry stays within `tolerance` of the baseline
    pub fn agrees_within(&self, tolerance: f64) -> bool {
        self.max_diff() <= tolerance
    }
}

/// Run sequential, parallel and distributed on `problem` with `workers` workers
pub async fn run_comparison(
    problem: &Problem,
    workers: usize,
    network: &NetworkConfig,
) -> Result<Comparison> {
    info!(workers, "Starting comparison");

    let baseline = {
        let problem = problem.clone();
        tokio::task::spawn_blocking(move || sequential::solve(&problem))
            .await
            .map_err(|_| SimError::WorkerPanicked { worker: 0 })?
    };

    let parallel = {
        let problem = problem.clone();
        tokio::task::spawn_blocking(move || ParallelEngine::new(workers).run(&problem))
            .await
            .map_err(|_| SimError::WorkerPanicked { worker: 0 })??
    };

    let distributed = run_local_distributed(problem, workers, network).await?;

    let entries = vec![
        ComparisonEntry::against(parallel, &baseline),
        ComparisonEntry::against(distributed, &baseline),
    ];
    for entry in &entries {
        debug!(
            paradigm = %entry.report.paradigm,
            speedup = entry.speedup,
            max_diff = entry.max_diff,
            "Comparison entry"
        );
    }

    Ok(Comparison { baseline, entries })
}

/// Distributed run against `workers` in-process workers on an ephemeral port
///
/// Binds `network.host` with port 0 and ignores the configured port.
pub async fn run_local_distributed(
    problem: &Problem,
    workers: usize,
    network: &NetworkConfig,
) -> Result<RunReport> {
    // Fail before any worker starts dialing
    partition_rows(problem.initial().rows(), workers)?;

    let listen = NetworkConfig {
        port: 0,
        ..network.clone()
    };
    let master = DistributedMaster::bind(&listen, workers).await?;
    let addr = master.local_addr()?;

    let connect = NetworkConfig {
        host: addr.ip().to_string(),
        port: addr.port(),
        ..network.clone()
    };

    let mut handles = Vec::with_capacity(workers);
    for i in 0..workers {
        let worker = DistributedWorker::new(&connect).with_name(format!("local-{}", i));
        handles.push(tokio::spawn(async move { worker.run().await }));
    }

    let report = master.run(problem).await;
    if report.is_err() {
        for handle in &handles {
            handle.abort();
        }
    }

    for (i, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(Ok(outcome)) => debug!(worker = i, reason = ?outcome.reason, "Local worker finished"),
            Ok(Err(e)) => debug!(worker = i, error = %e, "Local worker failed"),
            Err(e) if e.is_cancelled() => debug!(worker = i, "Local worker cancelled"),
            Err(e) => warn!(worker = i, error = %e, "Local worker task panicked"),
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GridConfig, RunConfig};
    use crate::grid::Boundary;
    use crate::report::Paradigm;

    fn problem(rows: usize, cols: usize, iterations: u64) -> Problem {
        let grid = GridConfig {
            rows,
            cols,
            initial_temp: 0.0,
            coefficient: Some(0.2),
            boundary: Boundary {
                top: 100.0,
                ..Boundary::default()
            },
            ..GridConfig::default()
        };
        let run = RunConfig {
            iterations,
            tolerance: None,
            workers: 2,
        };
        Problem::from_config(&grid, &run).unwrap()
    }

    #[tokio::test]
    async fn test_comparison_agrees() {
        let problem = problem(10, 8, 30);
        let comparison = run_comparison(&problem, 3, &NetworkConfig::default())
            .await
            .unwrap();

        assert_eq!(comparison.baseline.paradigm, Paradigm::Sequential);
        assert_eq!(comparison.entries.len(), 2);
        assert_eq!(comparison.entries[0].report.paradigm, Paradigm::Parallel);
        assert_eq!(comparison.entries[1].report.paradigm, Paradigm::Distributed);
        assert!(comparison.agrees_within(1e-9));
        for entry in &comparison.entries {
            assert_eq!(entry.report.rounds, 30);
            assert_eq!(entry.report.workers, 3);
        }
    }

    #[tokio::test]
    async fn test_local_distributed_single_worker() {
        let problem = problem(6, 6, 10);
        let report = run_local_distributed(&problem, 1, &NetworkConfig::default())
            .await
            .unwrap();
        let oracle = sequential::solve(&problem);
        assert_eq!(report.paradigm, Paradigm::Distributed);
        assert_eq!(report.workers, 1);
        assert_eq!(report.grid.max_abs_diff(&oracle.grid), 0.0);
    }

    #[tokio::test]
    async fn test_local_distributed_too_many_workers() {
        let problem = problem(5, 5, 10);
        let err = run_local_distributed(&problem, 4, &NetworkConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, SimError::Config(_)));
    }
}
