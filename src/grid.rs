//! Grid model and stencil rule
//!
//! The grid is a dense row-major `Vec<f64>`. Ownership of rows by bands is kept
//! outside the grid (see [`crate::partition`]); nothing in here knows about
//! workers or threads.
//!
//! # Stencil
//!
//! The explicit 2-D heat equation discretized with a 5-point stencil:
//!
//! ```text
//! T'(i,j) = T(i,j) + c * (T(i-1,j) + T(i+1,j) + T(i,j-1) + T(i,j+1) - 4*T(i,j))
//! ```
//!
//! with `c = alpha * dt / dx^2`. The scheme is stable for `c <= 0.25`.
//!
//! Every execution path (sequential, threads, distributed worker) goes through
//! [`StencilRule::sweep_rows`], so identical inputs produce bit-identical outputs.

use crate::error::{Result, SimError};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Largest coefficient for which the explicit 2-D scheme is stable
pub const CFL_LIMIT: f64 = 0.25;

/// Fixed Dirichlet values for the four grid edges
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Boundary {
    #[serde(default)]
    pub top: f64,
    #[serde(default)]
    pub bottom: f64,
    #[serde(default)]
    pub left: f64,
    #[serde(default)]
    pub right: f64,
}

impl Boundary {
    /// Same value on all four edges
    pub fn uniform(value: f64) -> Self {
        Self {
            top: value,
            bottom: value,
            left: value,
            right: value,
        }
    }
}

/// Interior cell held at a constant temperature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Hotspot {
    pub row: usize,
    pub col: usize,
    pub temp: f64,
}

impl Hotspot {
    /// Same hotspot with its row expressed relative to `first_row`
    ///
    /// Returns `None` when the hotspot lies above `first_row`.
    pub fn shifted(&self, first_row: usize) -> Option<Hotspot> {
        self.row.checked_sub(first_row).map(|row| Hotspot { row, ..*self })
    }
}

/// Dense 2-D temperature field
///
/// Only built through [`Grid::new`] and [`Grid::from_vec`], which enforce
/// `data.len() == rows * cols`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Grid {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Grid {
    /// Create a grid filled with `initial`
    ///
    /// Both dimensions must be at least 3 so that there is an interior.
    pub fn new(rows: usize, cols: usize, initial: f64) -> Result<Self> {
        if rows < 3 || cols < 3 {
            return Err(SimError::config(format!(
                "grid must be at least 3x3 to have interior cells, got {}x{}",
                rows, cols
            )));
        }
        Ok(Self {
            rows,
            cols,
            data: vec![initial; rows * cols],
        })
    }

    /// Build a grid from row-major data
    pub fn from_vec(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if rows < 3 || cols < 3 {
            return Err(SimError::config(format!(
                "grid must be at least 3x3 to have interior cells, got {}x{}",
                rows, cols
            )));
        }
        if data.len() != rows * cols {
            return Err(SimError::config(format!(
                "grid data has {} cells, expected {}x{}={}",
                data.len(),
                rows,
                cols,
                rows * cols
            )));
        }
        Ok(Self { rows, cols, data })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Rows that the stencil updates: `[1, rows - 1)`
    #[inline]
    pub fn interior_rows(&self) -> Range<usize> {
        1..self.rows - 1
    }

    #[inline]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[row * self.cols + col] = value;
    }

    /// One full row
    pub fn row(&self, row: usize) -> &[f64] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    /// Contiguous block of rows
    pub fn rows_slice(&self, rows: Range<usize>) -> &[f64] {
        &self.data[rows.start * self.cols..rows.end * self.cols]
    }

    pub fn rows_slice_mut(&mut self, rows: Range<usize>) -> &mut [f64] {
        &mut self.data[rows.start * self.cols..rows.end * self.cols]
    }

    /// Overwrite a contiguous block of rows starting at `first_row`
    pub fn write_rows(&mut self, first_row: usize, values: &[f64]) {
        let start = first_row * self.cols;
        self.data[start..start + values.len()].copy_from_slice(values);
    }

    /// Write the Dirichlet values onto the edges
    ///
    /// Columns first, then rows, so corner cells take the top/bottom value.
    pub fn apply_boundary(&mut self, boundary: &Boundary) {
        let cols = self.cols;
        for r in 0..self.rows {
            self.data[r * cols] = boundary.left;
            self.data[r * cols + cols - 1] = boundary.right;
        }
        self.data[..cols].fill(boundary.top);
        let last = (self.rows - 1) * cols;
        self.data[last..].fill(boundary.bottom);
    }

    pub fn pin_hotspot(&mut self, hotspot: &Hotspot) {
        self.set(hotspot.row, hotspot.col, hotspot.temp);
    }

    /// True when the cell is on one of the four edges
    #[inline]
    pub fn is_boundary(&self, row: usize, col: usize) -> bool {
        row == 0 || col == 0 || row == self.rows - 1 || col == self.cols - 1
    }

    /// Largest absolute per-cell difference between two grids of the same shape
    pub fn max_abs_diff(&self, other: &Grid) -> f64 {
        debug_assert_eq!((self.rows, self.cols), (other.rows, other.cols));
        self.data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }

    /// True when every edge cell is bit-identical in both grids
    pub fn boundary_identical(&self, other: &Grid) -> bool {
        if (self.rows, self.cols) != (other.rows, other.cols) {
            return false;
        }
        (0..self.rows).all(|r| {
            (0..self.cols)
                .filter(|&c| self.is_boundary(r, c))
                .all(|c| self.get(r, c).to_bits() == other.get(r, c).to_bits())
        })
    }
}

/// 5-point explicit stencil with a fixed diffusion coefficient
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StencilRule {
    coefficient: f64,
}

impl StencilRule {
    pub fn new(coefficient: f64) -> Self {
        Self { coefficient }
    }

    /// `c = alpha * dt / dx^2`
    pub fn from_physical(alpha: f64, dt: f64, dx: f64) -> Self {
        Self::new(alpha * dt / (dx * dx))
    }

    #[inline]
    pub fn coefficient(&self) -> f64 {
        self.coefficient
    }

    /// Whether the coefficient satisfies the CFL condition
    pub fn is_stable(&self) -> bool {
        self.coefficient <= CFL_LIMIT
    }

    /// New value of one cell from its current value and four axis neighbors
    #[inline]
    pub fn update(&self, center: f64, north: f64, south: f64, east: f64, west: f64) -> f64 {
        center + self.coefficient * (north + south + east + west - 4.0 * center)
    }

    /// Sweep the given rows of `src` into `dst`
    ///
    /// `src` is row-major with `cols` columns and must contain the rows directly
    /// above and below `rows`. `dst` receives exactly `rows.len()` rows. Edge
    /// columns are copied unchanged. A hotspot (in `src` row coordinates) that
    /// falls inside `rows` is written with its fixed temperature.
    ///
    /// Returns the largest absolute change of any written cell.
    pub fn sweep_rows(
        &self,
        src: &[f64],
        cols: usize,
        rows: Range<usize>,
        dst: &mut [f64],
        hotspot: Option<&Hotspot>,
    ) -> f64 {
        debug_assert!(rows.start >= 1);
        debug_assert!(src.len() >= (rows.end + 1) * cols);
        debug_assert_eq!(dst.len(), rows.len() * cols);

        let mut max_delta = 0.0f64;
        for (out_row, r) in rows.enumerate() {
            let above = &src[(r - 1) * cols..r * cols];
            let here = &src[r * cols..(r + 1) * cols];
            let below = &src[(r + 1) * cols..(r + 2) * cols];
            let out = &mut dst[out_row * cols..(out_row + 1) * cols];

            let pinned = hotspot.filter(|h| h.row == r);

            out[0] = here[0];
            out[cols - 1] = here[cols - 1];
            for c in 1..cols - 1 {
                let value = match pinned {
                    Some(h) if h.col == c => h.temp,
                    _ => self.update(here[c], above[c], below[c], here[c + 1], here[c - 1]),
                };
                out[c] = value;
                max_delta = max_delta.max((value - here[c]).abs());
            }
        }
        max_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_requires_interior() {
        assert!(Grid::new(2, 5, 0.0).is_err());
        assert!(Grid::new(5, 2, 0.0).is_err());
        assert!(Grid::new(3, 3, 0.0).is_ok());
    }

    #[test]
    fn test_from_vec_checks_length() {
        assert!(Grid::from_vec(3, 3, vec![0.0; 8]).is_err());
        let grid = Grid::from_vec(3, 3, (0..9).map(|v| v as f64).collect()).unwrap();
        assert_eq!(grid.get(1, 1), 4.0);
        assert_eq!(grid.row(2), &[6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_apply_boundary_corners_take_row_values() {
        let mut grid = Grid::new(4, 5, 20.0).unwrap();
        grid.apply_boundary(&Boundary {
            top: 100.0,
            bottom: 50.0,
            left: 1.0,
            right: 2.0,
        });

        assert!(grid.row(0).iter().all(|&v| v == 100.0));
        assert!(grid.row(3).iter().all(|&v| v == 50.0));
        assert_eq!(grid.get(1, 0), 1.0);
        assert_eq!(grid.get(2, 4), 2.0);
        assert_eq!(grid.get(1, 2), 20.0);
    }

    #[test]
    fn test_update_is_weighted_average() {
        let rule = StencilRule::new(0.2);
        // c * (sum - 4 * center) = 0.2 * (100 - 0)
        assert_eq!(rule.update(0.0, 100.0, 0.0, 0.0, 0.0), 20.0);
        // Uniform neighborhood is a fixed point
        assert_eq!(rule.update(7.5, 7.5, 7.5, 7.5, 7.5), 7.5);
    }

    #[test]
    fn test_from_physical() {
        let rule = StencilRule::from_physical(0.1, 0.1, 1.0);
        assert!((rule.coefficient() - 0.01).abs() < 1e-15);
        assert!(rule.is_stable());
        assert!(!StencilRule::new(0.3).is_stable());
    }

    #[test]
    fn test_sweep_rows_leaves_edge_columns() {
        let mut grid = Grid::new(4, 4, 0.0).unwrap();
        grid.apply_boundary(&Boundary {
            top: 100.0,
            left: 5.0,
            right: 7.0,
            bottom: 0.0,
        });
        let rule = StencilRule::new(0.2);
        let mut out = vec![f64::NAN; 2 * 4];
        let delta = rule.sweep_rows(grid.data(), 4, 1..3, &mut out, None);

        assert_eq!(out[0], 5.0);
        assert_eq!(out[3], 7.0);
        assert_eq!(out[4], 5.0);
        assert_eq!(out[7], 7.0);
        // (1,1): north 100, west 5
        assert!((out[1] - 0.2 * 105.0).abs() < 1e-12);
        // (1,2): north 100, east 7
        assert!((out[2] - 0.2 * 107.0).abs() < 1e-12);
        assert!((delta - 0.2 * 107.0).abs() < 1e-12);
    }

    #[test]
    fn test_sweep_rows_pins_hotspot() {
        let mut grid = Grid::new(5, 5, 0.0).unwrap();
        let hotspot = Hotspot {
            row: 2,
            col: 2,
            temp: 80.0,
        };
        grid.pin_hotspot(&hotspot);
        let rule = StencilRule::new(0.25);
        let mut out = vec![0.0; 3 * 5];
        let delta = rule.sweep_rows(grid.data(), 5, 1..4, &mut out, Some(&hotspot));

        assert_eq!(out[5 + 2], 80.0);
        assert_eq!(out[2], 20.0);
        assert_eq!(delta, 20.0);
    }

    #[test]
    fn test_hotspot_shifted() {
        let h = Hotspot {
            row: 4,
            col: 1,
            temp: 1.0,
        };
        assert_eq!(h.shifted(3).map(|s| s.row), Some(1));
        assert_eq!(h.shifted(5), None);
    }

    #[test]
    fn test_max_abs_diff_and_boundary_identical() {
        let a = Grid::new(3, 3, 1.0).unwrap();
        let mut b = a.clone();
        b.set(1, 1, 1.5);
        assert_eq!(a.max_abs_diff(&b), 0.5);
        assert!(a.boundary_identical(&b));
        b.set(0, 1, 2.0);
        assert!(!a.boundary_identical(&b));
    }
}
