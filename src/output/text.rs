//! Human-readable text output

use crate::compare::Comparison;
use crate::distributed::WorkerOutcome;
use crate::report::RunReport;
use crate::util::time::{format_duration, format_rate};

const RULE: &str = "═══════════════════════════════════════════════════════════";

fn banner(title: &str) {
    println!("{}", RULE);
    println!("{:^59}", title);
    println!("{}", RULE);
    println!();
}

/// Print one run's results to console
pub fn print_report(report: &RunReport) {
    banner(&format!("{} RESULTS", report.paradigm.to_string().to_uppercase()));

    println!(
        "Grid:         {} x {}",
        report.grid.rows(),
        report.grid.cols()
    );
    println!("Workers:      {}", report.workers);
    println!("Rounds:       {}", report.rounds);
    println!("Outcome:      {}", report.outcome);
    println!("Elapsed Time: {:.3}s", report.elapsed.as_secs_f64());
    println!("Rate:         {} rounds/s", format_rate(report.rounds_per_sec()));
    println!();
    print_grid_summary(report);
}

/// Min/max/mean over the final grid
fn print_grid_summary(report: &RunReport) {
    let data = report.grid.data();
    if data.is_empty() {
        return;
    }
    let min = data.iter().copied().fold(f64::INFINITY, f64::min);
    let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean = data.iter().sum::<f64>() / data.len() as f64;

    println!("Temperature:");
    println!("  Min:  {:.4}", min);
    println!("  Max:  {:.4}", max);
    println!("  Mean: {:.4}", mean);
    println!();
}

/// Print the comparison table
pub fn print_comparison(comparison: &Comparison) {
    banner("COMPARISON RESULTS");

    let baseline = &comparison.baseline;
    println!(
        "Grid: {} x {}, rounds: {}, outcome: {}",
        baseline.grid.rows(),
        baseline.grid.cols(),
        baseline.rounds,
        baseline.outcome
    );
    println!();

    println!(
        "{:<12} {:>7} {:>10} {:>9} {:>10} {:>12}",
        "Paradigm", "Workers", "Elapsed", "Speedup", "Efficiency", "Max Diff"
    );
    println!(
        "{:<12} {:>7} {:>10} {:>9} {:>10} {:>12}",
        baseline.paradigm.to_string(),
        baseline.workers,
        format_duration(baseline.elapsed),
        "1.00x",
        "-",
        "-"
    );
    for entry in &comparison.entries {
        println!(
            "{:<12} {:>7} {:>10} {:>8.2}x {:>9.1}% {:>12.3e}",
            entry.report.paradigm.to_string(),
            entry.report.workers,
            format_duration(entry.report.elapsed),
            entry.speedup,
            entry.efficiency * 100.0,
            entry.max_diff
        );
    }
    println!();

    if comparison.agrees_within(1e-6) {
        println!("All paradigms agree with the sequential result");
    } else {
        println!(
            "WARNING: results deviate from the sequential result by up to {:.3e}",
            comparison.max_diff()
        );
    }
}

/// Print what a distributed worker did before it was stopped
pub fn print_worker_outcome(outcome: &WorkerOutcome) {
    banner("WORKER SUMMARY");

    println!("Worker ID: {}", outcome.worker_id);
    println!(
        "Band:      rows {}..{} ({} rows)",
        outcome.band.lo,
        outcome.band.hi,
        outcome.band.len()
    );
    println!("Rounds:    {}", outcome.rounds);
    println!("Stopped:   {:?}", outcome.reason);
}
