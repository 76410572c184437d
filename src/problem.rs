//! Simulation problem
//!
//! A `Problem` is everything a solver needs: the prepared initial grid, the
//! stencil rule, the optional hotspot and the stopping rule. All three
//! paradigms start from the same `Problem`, which is what makes their results
//! comparable.

use crate::config::{validator, GridConfig, RunConfig};
use crate::error::{Result, SimError};
use crate::grid::{Boundary, Grid, Hotspot, StencilRule, CFL_LIMIT};
use crate::report::Outcome;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct Problem {
    initial: Grid,
    boundary: Boundary,
    rule: StencilRule,
    hotspot: Option<Hotspot>,
    iterations: u64,
    tolerance: Option<f64>,
}

impl Problem {
    /// Build and validate a problem from the grid and run sections of the config
    pub fn from_config(grid: &GridConfig, run: &RunConfig) -> Result<Self> {
        validator::validate_grid(grid).map_err(|e| SimError::config(e.to_string()))?;
        if run.iterations == 0 {
            return Err(SimError::config("iterations must be at least 1"));
        }
        if let Some(tol) = run.tolerance {
            if !(tol.is_finite() && tol > 0.0) {
                return Err(SimError::config(format!(
                    "tolerance must be positive and finite, got {}",
                    tol
                )));
            }
        }

        let rule = grid.stencil_rule();
        if !rule.is_stable() {
            warn!(
                coefficient = rule.coefficient(),
                limit = CFL_LIMIT,
                "Diffusion coefficient exceeds the CFL stability limit, results may diverge"
            );
        }

        let initial = Grid::new(grid.rows, grid.cols, grid.initial_temp)?;
        let mut problem = Self {
            initial,
            boundary: grid.boundary,
            rule,
            hotspot: grid.hotspot,
            iterations: run.iterations,
            tolerance: run.tolerance,
        };
        problem.prepare();
        Ok(problem)
    }

    /// Replace the initial field, keeping boundary and hotspot
    ///
    /// Edge cells and the hotspot cell of `grid` are overwritten.
    pub fn with_initial(mut self, grid: Grid) -> Result<Self> {
        if (grid.rows(), grid.cols()) != (self.initial.rows(), self.initial.cols()) {
            return Err(SimError::config(format!(
                "initial grid is {}x{}, problem is {}x{}",
                grid.rows(),
                grid.cols(),
                self.initial.rows(),
                self.initial.cols()
            )));
        }
        self.initial = grid;
        self.prepare();
        Ok(self)
    }

    fn prepare(&mut self) {
        if let Some(ref h) = self.hotspot {
            self.initial.pin_hotspot(h);
        }
        self.initial.apply_boundary(&self.boundary);
    }

    pub fn initial(&self) -> &Grid {
        &self.initial
    }

    pub fn boundary(&self) -> &Boundary {
        &self.boundary
    }

    pub fn rule(&self) -> StencilRule {
        self.rule
    }

    pub fn hotspot(&self) -> Option<&Hotspot> {
        self.hotspot.as_ref()
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn tolerance(&self) -> Option<f64> {
        self.tolerance
    }

    /// Decide whether the run ends after committing `round`
    ///
    /// Convergence is checked before the iteration cap, so a run that converges
    /// on its last round reports `Converged`.
    pub fn terminal_outcome(&self, round: u64, max_delta: f64) -> Option<Outcome> {
        if let Some(tol) = self.tolerance {
            if max_delta < tol {
                return Some(Outcome::Converged { round, max_delta });
            }
        }
        if round >= self.iterations {
            return Some(Outcome::IterationLimit { max_delta });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn six_by_six() -> (GridConfig, RunConfig) {
        let grid = GridConfig {
            rows: 6,
            cols: 6,
            initial_temp: 0.0,
            coefficient: Some(0.2),
            boundary: Boundary {
                top: 100.0,
                ..Boundary::default()
            },
            ..GridConfig::default()
        };
        let run = RunConfig {
            iterations: 50,
            tolerance: None,
            workers: 2,
        };
        (grid, run)
    }

    #[test]
    fn test_from_config_prepares_grid() {
        let (mut grid, run) = six_by_six();
        grid.hotspot = Some(Hotspot {
            row: 2,
            col: 3,
            temp: 50.0,
        });
        let problem = Problem::from_config(&grid, &run).unwrap();

        let initial = problem.initial();
        assert!(initial.row(0).iter().all(|&v| v == 100.0));
        assert_eq!(initial.get(2, 3), 50.0);
        assert_eq!(initial.get(3, 3), 0.0);
        assert_eq!(problem.rule().coefficient(), 0.2);
    }

    #[test]
    fn test_from_config_rejects_bad_input() {
        let (mut grid, mut run) = six_by_six();
        grid.hotspot = Some(Hotspot {
            row: 0,
            col: 3,
            temp: 1.0,
        });
        assert!(matches!(
            Problem::from_config(&grid, &run),
            Err(SimError::Config(_))
        ));

        grid.hotspot = None;
        run.iterations = 0;
        assert!(Problem::from_config(&grid, &run).is_err());

        run.iterations = 1;
        run.tolerance = Some(0.0);
        assert!(Problem::from_config(&grid, &run).is_err());
    }

    #[test]
    fn test_with_initial_reapplies_boundary() {
        let (grid, run) = six_by_six();
        let problem = Problem::from_config(&grid, &run)
            .unwrap()
            .with_initial(Grid::new(6, 6, 7.0).unwrap())
            .unwrap();

        assert_eq!(problem.initial().get(0, 2), 100.0);
        assert_eq!(problem.initial().get(2, 2), 7.0);
        assert_eq!(problem.initial().get(5, 2), 0.0);

        let wrong = Grid::new(5, 6, 0.0).unwrap();
        assert!(Problem::from_config(&grid, &run)
            .unwrap()
            .with_initial(wrong)
            .is_err());
    }

    #[test]
    fn test_terminal_outcome() {
        let (grid, mut run) = six_by_six();
        run.iterations = 10;
        let problem = Problem::from_config(&grid, &run).unwrap();
        assert_eq!(problem.terminal_outcome(3, 1.0), None);
        assert_eq!(
            problem.terminal_outcome(10, 1.0),
            Some(Outcome::IterationLimit { max_delta: 1.0 })
        );

        run.tolerance = Some(1e-3);
        let problem = Problem::from_config(&grid, &run).unwrap();
        assert_eq!(
            problem.terminal_outcome(4, 1e-4),
            Some(Outcome::Converged {
                round: 4,
                max_delta: 1e-4
            })
        );
        assert_eq!(
            problem.terminal_outcome(10, 1e-4),
            Some(Outcome::Converged {
                round: 10,
                max_delta: 1e-4
            })
        );
    }
}
