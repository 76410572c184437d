//! Row-band partitioning
//!
//! Interior rows `[1, rows - 1)` are split into contiguous bands, one per
//! worker. When the count does not divide evenly the earliest bands get one
//! extra row each, so band sizes never differ by more than one.
//!
//! The same rule is used by the threaded engine and the distributed master.

use crate::error::{Result, SimError};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Interior row range `[lo, hi)` owned by one worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    /// Worker index (0-based, top to bottom)
    pub id: usize,
    /// First owned global row (inclusive)
    pub lo: usize,
    /// One past the last owned global row
    pub hi: usize,
}

impl Band {
    #[inline]
    pub fn len(&self) -> usize {
        self.hi - self.lo
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hi == self.lo
    }

    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.lo..self.hi
    }

    /// Global row copied into the top halo
    #[inline]
    pub fn halo_top_row(&self) -> usize {
        self.lo - 1
    }

    /// Global row copied into the bottom halo
    #[inline]
    pub fn halo_bottom_row(&self) -> usize {
        self.hi
    }

    #[inline]
    pub fn contains(&self, row: usize) -> bool {
        self.lo <= row && row < self.hi
    }
}

/// Split the interior rows of a `rows`-row grid into `workers` bands
pub fn partition_rows(rows: usize, workers: usize) -> Result<Vec<Band>> {
    if workers == 0 {
        return Err(SimError::config("worker count must be at least 1"));
    }
    if rows < 3 {
        return Err(SimError::config(format!(
            "grid needs at least 3 rows to have an interior, got {}",
            rows
        )));
    }

    let interior = rows - 2;
    if interior < workers {
        return Err(SimError::config(format!(
            "{} workers exceed the {} interior rows of a {}-row grid",
            workers, interior, rows
        )));
    }

    let base = interior / workers;
    let remainder = interior % workers;

    let mut bands = Vec::with_capacity(workers);
    let mut cursor = 1;
    for id in 0..workers {
        let lo = cursor;
        let hi = lo + base + usize::from(id < remainder);
        bands.push(Band { id, lo, hi });
        cursor = hi;
    }

    Ok(bands)
}
