//! Single-threaded reference solver
//!
//! The result of this solver is what the parallel engine and the distributed
//! master are checked against.

use crate::grid::{Grid, Hotspot, StencilRule};
use crate::problem::Problem;
use crate::report::{Outcome, Paradigm, RunReport};
use std::time::Instant;
use tracing::{debug, info};

/// Advance every interior row of `src` by one round into `dst`
///
/// `dst` must have the same shape as `src`; its edge rows are left untouched.
/// Returns the largest absolute change.
pub fn step(rule: &StencilRule, src: &Grid, dst: &mut Grid, hotspot: Option<&Hotspot>) -> f64 {
    let cols = src.cols();
    let interior = src.interior_rows();
    rule.sweep_rows(src.data(), cols, interior.clone(), dst.rows_slice_mut(interior), hotspot)
}

/// Run the problem to completion on the calling thread
///
/// Returns the final grid, rounds computed and terminal outcome.
pub(crate) fn run_loop(problem: &Problem) -> (Grid, u64, Outcome) {
    let rule = problem.rule();
    let hotspot = problem.hotspot();

    let mut current = problem.initial().clone();
    let mut next = current.clone();
    let mut round = 0u64;

    loop {
        round += 1;
        let max_delta = step(&rule, &current, &mut next, hotspot);
        std::mem::swap(&mut current, &mut next);

        if let Some(outcome) = problem.terminal_outcome(round, max_delta) {
            return (current, round, outcome);
        }

        if round % 100 == 0 {
            debug!(round, max_delta, "Sequential progress");
        }
    }
}

/// Solve `problem` sequentially
pub fn solve(problem: &Problem) -> RunReport {
    let start = Instant::now();
    let (grid, rounds, outcome) = run_loop(problem);
    let elapsed = start.elapsed();

    info!(rounds, elapsed_ms = elapsed.as_millis() as u64, %outcome, "Sequential run complete");

    RunReport {
        paradigm: Paradigm::Sequential,
        workers: 1,
        grid,
        rounds,
        outcome,
        elapsed,
    }
}
