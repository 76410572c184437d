//! Shared-memory parallel stencil engine
//!
//! The interior rows are split into bands (see [`crate::partition`]) and each
//! band is swept by its own OS thread. The calling thread acts as orchestrator.
//!
//! # Round structure
//!
//! ```text
//! workers:      read committed(k) -> sweep band into buffer(k+1) -> wait  . -> wait -> ...
//! orchestrator:                                                     wait -> commit -> wait -> ...
//! ```
//!
//! Every round has two barrier phases. After the first, all band buffers for
//! round k+1 are written and no worker holds the grid lock, so the orchestrator
//! commits them into the grid, re-pins the hotspot and runs the convergence
//! check. The second phase releases the workers into the next round, or lets
//! them exit when the orchestrator decided to stop.
//!
//! The committed grid and every band buffer carry the round they represent.
//! Workers check the grid they read and the orchestrator checks every buffer
//! it commits; a mismatch surfaces as [`SimError::RoundMismatch`].
//!
//! # Failure
//!
//! A worker that fails or panics reports its error over a channel and aborts
//! the barrier, which releases every other participant. The run then returns
//! that error and never a partially updated grid.

pub mod barrier;

pub use barrier::{BarrierWaitResult, RoundBarrier};

use crate::error::{Result, SimError};
use crate::grid::Grid;
use crate::partition::{partition_rows, Band};
use crate::problem::Problem;
use crate::report::{Outcome, Paradigm, RunReport};
use crate::sequential;
use crossbeam::channel::{self, Receiver, Sender};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info};

/// Cancels a running [`ParallelEngine::run`] from another thread
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    barrier: Mutex<Option<Arc<RoundBarrier>>>,
}

impl CancelHandle {
    /// Request cancellation and wake every thread blocked at the barrier
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        if let Some(ref barrier) = *lock(&self.inner.barrier) {
            barrier.abort();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    fn attach(&self, barrier: Arc<RoundBarrier>) {
        *lock(&self.inner.barrier) = Some(barrier);
    }

    fn detach(&self) {
        *lock(&self.inner.barrier) = None;
    }
}

/// Committed global grid, tagged with the round it represents
struct Committed {
    round: u64,
    grid: Grid,
}

/// One band's output for a round
struct BandBuffer {
    round: u64,
    data: Vec<f64>,
    max_delta: f64,
}

/// State shared by the orchestrator and all band threads for one run
struct Shared<'a> {
    problem: &'a Problem,
    committed: RwLock<Committed>,
    buffers: Vec<Mutex<BandBuffer>>,
    barrier: Arc<RoundBarrier>,
    stop: AtomicBool,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(PoisonError::into_inner)
}

/// Test-only faults, keyed by (band, round)
#[derive(Debug, Clone, Copy, Default)]
struct Injected {
    panic_at: Option<(usize, u64)>,
    /// Leave the band buffer tagged with the previous round
    stale_at: Option<(usize, u64)>,
}

/// Barrier-synchronized multi-threaded solver
#[derive(Debug)]
pub struct ParallelEngine {
    workers: usize,
    cancel: CancelHandle,
    #[cfg(test)]
    injected: Injected,
}

impl ParallelEngine {
    pub fn new(workers: usize) -> Self {
        Self {
            workers,
            cancel: CancelHandle::default(),
            #[cfg(test)]
            injected: Injected::default(),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Handle that cancels runs of this engine
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Solve `problem` with `workers` threads
    pub fn run(&self, problem: &Problem) -> Result<RunReport> {
        let start = Instant::now();
        let rows = problem.initial().rows();
        let bands = partition_rows(rows, self.workers)?;

        if self.cancel.is_cancelled() {
            return Err(SimError::Cancelled);
        }

        let (grid, rounds, outcome) = if self.workers == 1 {
            debug!("Single worker, running the sequential loop");
            sequential::run_loop(problem)
        } else {
            self.run_threads(problem, &bands)?
        };

        let elapsed = start.elapsed();
        info!(
            workers = self.workers,
            rounds,
            elapsed_ms = elapsed.as_millis() as u64,
            %outcome,
            "Parallel run complete"
        );

        Ok(RunReport {
            paradigm: Paradigm::Parallel,
            workers: self.workers,
            grid,
            rounds,
            outcome,
            elapsed,
        })
    }

    fn run_threads(&self, problem: &Problem, bands: &[Band]) -> Result<(Grid, u64, Outcome)> {
        let cols = problem.initial().cols();
        let barrier = Arc::new(RoundBarrier::new(bands.len() + 1));

        self.cancel.attach(Arc::clone(&barrier));
        if self.cancel.is_cancelled() {
            self.cancel.detach();
            return Err(SimError::Cancelled);
        }

        let shared = Shared {
            problem,
            committed: RwLock::new(Committed {
                round: 0,
                grid: problem.initial().clone(),
            }),
            buffers: bands
                .iter()
                .map(|b| {
                    Mutex::new(BandBuffer {
                        round: 0,
                        data: vec![0.0; b.len() * cols],
                        max_delta: 0.0,
                    })
                })
                .collect(),
            barrier,
            stop: AtomicBool::new(false),
        };

        for band in bands {
            debug!(band = band.id, lo = band.lo, hi = band.hi, "Band assigned");
        }

        let (fault_tx, fault_rx) = channel::unbounded();
        let result = thread::scope(|scope| {
            for &band in bands {
                let shared = &shared;
                let faults = fault_tx.clone();
                #[cfg(test)]
                let injected = self.injected;
                #[cfg(not(test))]
                let injected = Injected::default();

                let spawned = thread::Builder::new()
                    .name(format!("stencil-{}", band.id))
                    .spawn_scoped(scope, move || {
                        band_thread(shared, band, cols, injected, &faults)
                    });
                if let Err(e) = spawned {
                    shared.barrier.abort();
                    return Err(SimError::Io(e));
                }
            }
            orchestrate(&shared, bands, &fault_rx, &self.cancel)
        });

        self.cancel.detach();

        let (rounds, outcome) = result?;
        let committed = shared
            .committed
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        Ok((committed.grid, rounds, outcome))
    }
}

/// Thread entry: run the band loop and report anything other than a clean stop
fn band_thread(
    shared: &Shared<'_>,
    band: Band,
    cols: usize,
    injected: Injected,
    faults: &Sender<SimError>,
) {
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| band_loop(shared, band, cols, injected)));
    let fault = match outcome {
        Ok(Ok(())) | Ok(Err(SimError::BarrierAborted)) => return,
        Ok(Err(e)) => e,
        Err(_) => SimError::WorkerPanicked { worker: band.id },
    };

    error!(band = band.id, error = %fault, "Band thread failed");
    let _ = faults.send(fault);
    shared.barrier.abort();
}

fn band_loop(
    shared: &Shared<'_>,
    band: Band,
    cols: usize,
    injected: Injected,
) -> Result<()> {
    let rule = shared.problem.rule();
    let hotspot = shared.problem.hotspot();
    let mut round = 0u64;

    loop {
        if injected.panic_at == Some((band.id, round + 1)) {
            panic!("injected failure in band {} round {}", band.id, round + 1);
        }

        {
            let committed = read(&shared.committed);
            if committed.round != round {
                return Err(SimError::RoundMismatch {
                    band: band.id,
                    expected: round,
                    found: committed.round,
                });
            }

            let mut guard = lock(&shared.buffers[band.id]);
            let buf = &mut *guard;
            buf.max_delta =
                rule.sweep_rows(committed.grid.data(), cols, band.range(), &mut buf.data, hotspot);
            buf.round = if injected.stale_at == Some((band.id, round + 1)) {
                round
            } else {
                round + 1
            };
        }

        // Band written
        shared.barrier.wait()?;
        // Round committed
        shared.barrier.wait()?;

        round += 1;
        if shared.stop.load(Ordering::Acquire) {
            return Ok(());
        }
    }
}

/// Orchestrator side of every round: commit, check, release
fn orchestrate(
    shared: &Shared<'_>,
    bands: &[Band],
    faults: &Receiver<SimError>,
    cancel: &CancelHandle,
) -> Result<(u64, Outcome)> {
    let problem = shared.problem;
    let mut round = 0u64;

    loop {
        if let Err(e) = shared.barrier.wait() {
            return Err(failure(faults, cancel, e));
        }
        round += 1;

        let mut max_delta = 0.0f64;
        {
            let mut committed = write(&shared.committed);
            for band in bands {
                let buf = lock(&shared.buffers[band.id]);
                if buf.round != round {
                    shared.barrier.abort();
                    return Err(SimError::RoundMismatch {
                        band: band.id,
                        expected: round,
                        found: buf.round,
                    });
                }
                committed.grid.write_rows(band.lo, &buf.data);
                max_delta = max_delta.max(buf.max_delta);
            }
            if let Some(h) = problem.hotspot() {
                committed.grid.pin_hotspot(h);
            }
            committed.round = round;
        }

        let outcome = problem.terminal_outcome(round, max_delta);
        if outcome.is_some() {
            shared.stop.store(true, Ordering::Release);
        }

        if let Err(e) = shared.barrier.wait() {
            return Err(failure(faults, cancel, e));
        }

        if let Some(outcome) = outcome {
            return Ok((round, outcome));
        }

        if round % 100 == 0 {
            debug!(round, max_delta, "Parallel progress");
        }
    }
}

/// Turn a barrier abort into the error that caused it
fn failure(faults: &Receiver<SimError>, cancel: &CancelHandle, aborted: SimError) -> SimError {
    if let Ok(fault) = faults.try_recv() {
        return fault;
    }
    if cancel.is_cancelled() {
        return SimError::Cancelled;
    }
    aborted
}
