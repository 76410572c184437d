//! Distributed mode implementation
//!
//! Hub-and-spoke over TCP: one master owns the global grid and drives rounds,
//! each worker owns one band of interior rows.
//!
//! # Modules
//!
//! - `protocol`: Message definitions and length-prefixed framing
//! - `master`: Listener, registration, round gating and failure attribution
//! - `worker`: Reactive band solver

pub mod master;
pub mod protocol;
pub mod worker;

pub use master::{DistributedMaster, MasterState, WorkerSlot};
pub use protocol::{Command, Message, StopReason, MAX_FRAME_LEN, PROTOCOL_VERSION};
pub use worker::{DistributedWorker, WorkerOutcome, WorkerState};
