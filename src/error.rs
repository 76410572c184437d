//! Error types
//!
//! `SimError` covers every way a run can refuse to start or stop early.
//! Reaching the iteration limit without converging is not an error; see
//! [`crate::report::Outcome`].

use std::time::Duration;
use thiserror::Error;

/// Wire-level failures on a single connection
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection closed by peer")]
    ConnectionClosed,

    #[error("frame truncated: expected {expected} bytes, got {got}")]
    Truncated { expected: usize, got: usize },

    #[error("frame length {0} exceeds maximum of {max} bytes", max = crate::distributed::protocol::MAX_FRAME_LEN)]
    FrameTooLarge(usize),

    #[error("failed to encode message: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("failed to decode message: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("unexpected command: expected {expected}, got {got}")]
    UnexpectedCommand { expected: String, got: String },

    #[error("protocol version mismatch: local={local}, remote={remote}")]
    VersionMismatch { local: u32, remote: u32 },

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("peer reported error: {0}")]
    Remote(String),
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("worker {worker} failed in round {round} while master was {state}: {source}")]
    Worker {
        worker: usize,
        round: u64,
        state: String,
        #[source]
        source: Box<SimError>,
    },

    #[error("timed out after {after:?} waiting for {what}")]
    Timeout { what: String, after: Duration },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("round barrier aborted")]
    BarrierAborted,

    #[error("run cancelled")]
    Cancelled,

    #[error("worker thread {worker} panicked")]
    WorkerPanicked { worker: usize },

    #[error("band {band} observed round {found}, expected round {expected}")]
    RoundMismatch { band: usize, expected: u64, found: u64 },
}

impl SimError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Worker id this error is attributed to, if any
    pub fn worker(&self) -> Option<usize> {
        match self {
            SimError::Worker { worker, .. } => Some(*worker),
            SimError::WorkerPanicked { worker } => Some(*worker),
            _ => None,
        }
    }

    /// Round this error is attributed to, if any
    pub fn round(&self) -> Option<u64> {
        match self {
            SimError::Worker { round, .. } => Some(*round),
            SimError::RoundMismatch { expected, .. } => Some(*expected),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;
