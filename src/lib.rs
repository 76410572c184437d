//! heatflow - 2-D heat diffusion across three execution paradigms
//!
//! A 5-point finite-difference stencil with fixed (Dirichlet) boundaries, run
//! single-threaded, on a pool of barrier-synchronized threads, or across worker
//! processes connected to a master over TCP. All three paths share one stencil
//! kernel and produce matching grids.
//!
//! # Architecture
//!
//! - **Grid model**: flat row-major grid, boundary description, stencil rule
//! - **Partitioning**: contiguous row bands with one halo row on each side
//! - **Parallel engine**: one thread per band, reusable abortable barrier
//! - **Distributed mode**: length-prefixed MessagePack frames, master/worker rounds
//! - **Comparison**: speedup, efficiency and deviation from the sequential result

pub mod compare;
pub mod config;
pub mod distributed;
pub mod engine;
pub mod error;
pub mod grid;
pub mod output;
pub mod partition;
pub mod problem;
pub mod report;
pub mod sequential;
pub mod util;

// Re-export commonly used types
pub use config::SimConfig;
pub use engine::ParallelEngine;
pub use error::{ProtocolError, Result, SimError};
pub use grid::{Boundary, Grid, Hotspot, StencilRule};
pub use problem::Problem;
pub use report::{Outcome, Paradigm, RunReport};
