//! Run results shared by every execution path

use crate::grid::Grid;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Execution paradigm that produced a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Paradigm {
    Sequential,
    Parallel,
    Distributed,
}

impl fmt::Display for Paradigm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Paradigm::Sequential => write!(f, "sequential"),
            Paradigm::Parallel => write!(f, "parallel"),
            Paradigm::Distributed => write!(f, "distributed"),
        }
    }
}

/// How a run ended
///
/// Running out of iterations is a normal outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// Largest change in `round` fell below the tolerance
    Converged { round: u64, max_delta: f64 },
    /// Iteration cap reached
    IterationLimit { max_delta: f64 },
}

impl Outcome {
    pub fn max_delta(&self) -> f64 {
        match self {
            Outcome::Converged { max_delta, .. } | Outcome::IterationLimit { max_delta } => {
                *max_delta
            }
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, Outcome::Converged { .. })
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Converged { round, max_delta } => {
                write!(f, "converged at round {} (max change {:.3e})", round, max_delta)
            }
            Outcome::IterationLimit { max_delta } => {
                write!(f, "iteration limit (max change {:.3e})", max_delta)
            }
        }
    }
}

/// Final state of one run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub paradigm: Paradigm,
    /// Threads or remote workers used (1 for sequential)
    pub workers: usize,
    pub grid: Grid,
    /// Rounds actually computed
    pub rounds: u64,
    pub outcome: Outcome,
    pub elapsed: Duration,
}

impl RunReport {
    /// Rounds per second of wall-clock time
    pub fn rounds_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.rounds as f64 / secs
        } else {
            0.0
        }
    }
}
