//! Distributed master
//!
//! The master is the hub: it owns the global grid, accepts one persistent
//! connection per worker and drives every round. Workers never talk to each
//! other; halo rows always travel through the master.
//!
//! # State machine
//!
//! ```text
//! Partitioning -> Distributing -> AwaitingHaloAck(k) -> AwaitingResults(k)
//!                                       ^                      |
//!                                       +------- k + 1 --------+
//!                                                              |
//!                                       Converged | IterationLimit | Failed
//! ```
//!
//! Halos for round k+1 are built only after every RESULT of round k has been
//! assembled, so a worker never receives a halo older than its neighbors'
//! latest rows.
//!
//! Any disconnect, timeout or protocol error on one worker is fatal. The error
//! names the worker, the round and the master state; every other worker gets a
//! best-effort STOP(Aborted) and all connections are closed.

use crate::config::NetworkConfig;
use crate::distributed::protocol::*;
use crate::error::{ProtocolError, Result, SimError};
use crate::grid::Grid;
use crate::partition::{partition_rows, Band};
use crate::problem::Problem;
use crate::report::{Outcome, Paradigm, RunReport};
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, error, info, warn};

/// Deadline for best-effort STOP(Aborted) writes during teardown
const ABORT_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// Master lifecycle, carried into worker errors for diagnosis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterState {
    Partitioning,
    Distributing,
    AwaitingHaloAck(u64),
    AwaitingResults(u64),
    Converged,
    IterationLimit,
    Failed,
}

impl fmt::Display for MasterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MasterState::Partitioning => write!(f, "Partitioning"),
            MasterState::Distributing => write!(f, "Distributing"),
            MasterState::AwaitingHaloAck(k) => write!(f, "AwaitingHaloAck({})", k),
            MasterState::AwaitingResults(k) => write!(f, "AwaitingResults({})", k),
            MasterState::Converged => write!(f, "Converged"),
            MasterState::IterationLimit => write!(f, "IterationLimit"),
            MasterState::Failed => write!(f, "Failed"),
        }
    }
}

/// Per-worker bookkeeping
#[derive(Debug)]
pub struct WorkerSlot {
    pub id: usize,
    /// Name from HELLO, for logs
    pub name: String,
    pub peer: SocketAddr,
    pub band: Band,
    /// Last band rows this worker returned successfully
    pub last_rows: Vec<f64>,
    /// Round of `last_rows` (0 = initial values)
    pub last_round: u64,
    stream: TcpStream,
}

/// Distributed master
///
/// Bound on construction so the listening address is known before `run`.
pub struct DistributedMaster {
    listener: TcpListener,
    workers: usize,
    round_timeout: Duration,
    accept_timeout: Duration,
}

impl DistributedMaster {
    /// Bind the listener on `network.host:network.port`
    pub async fn bind(network: &NetworkConfig, workers: usize) -> Result<Self> {
        let addr = network.addr();
        let listener = TcpListener::bind(&addr).await?;
        info!(addr = %listener.local_addr()?, workers, "Master listening");

        Ok(Self {
            listener,
            workers,
            round_timeout: network.round_timeout(),
            accept_timeout: network.accept_timeout(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Run `problem` across the workers that connect
    ///
    /// Connections are closed when this returns, on success and on failure.
    pub async fn run(self, problem: &Problem) -> Result<RunReport> {
        let start = std::time::Instant::now();

        let mut state = MasterState::Partitioning;
        debug!(%state, "Computing bands");
        let bands = partition_rows(problem.initial().rows(), self.workers)?;

        state = MasterState::Distributing;
        debug!(%state, "Waiting for workers");
        let mut slots = Vec::with_capacity(bands.len());
        let driven = match self.register(&bands, &mut slots).await {
            Ok(()) => self.drive(problem, &mut slots, &mut state).await,
            Err(e) => Err(e),
        };

        match driven {
            Ok((grid, rounds, outcome)) => {
                let elapsed = start.elapsed();
                info!(
                    workers = slots.len(),
                    rounds,
                    elapsed_ms = elapsed.as_millis() as u64,
                    %outcome,
                    "Distributed run complete"
                );
                Ok(RunReport {
                    paradigm: Paradigm::Distributed,
                    workers: slots.len(),
                    grid,
                    rounds,
                    outcome,
                    elapsed,
                })
            }
            Err(e) => {
                state = MasterState::Failed;
                error!(%state, error = %e, "Distributed run failed");
                abort_all(&mut slots, e.worker(), e.round().unwrap_or(0)).await;
                Err(e)
            }
        }
    }

    /// Accept every worker, then send INIT and wait for each STEP(0)
    async fn register(&self, bands: &[Band], slots: &mut Vec<WorkerSlot>) -> Result<()> {
        let state = MasterState::Distributing;
        let deadline = Instant::now() + self.accept_timeout;

        for band in bands {
            let id = band.id;
            let (mut stream, peer) = timeout_at(deadline, self.listener.accept())
                .await
                .map_err(|_| SimError::Timeout {
                    what: format!("{} of {} workers to register", bands.len() - id, bands.len()),
                    after: self.accept_timeout,
                })??;
            stream.set_nodelay(true)?;

            let hello = match timeout_at(deadline, read_message(&mut stream)).await {
                Ok(Ok(Message::Hello(hello))) => hello,
                Ok(Ok(other)) => {
                    return Err(attribute(id, 0, state, other.unexpected(Command::Hello).into()))
                }
                Ok(Err(e)) => return Err(attribute(id, 0, state, e)),
                Err(_) => {
                    return Err(attribute(
                        id,
                        0,
                        state,
                        SimError::Timeout {
                            what: "HELLO".to_string(),
                            after: self.accept_timeout,
                        },
                    ))
                }
            };

            if hello.protocol_version != PROTOCOL_VERSION {
                let err = ProtocolError::VersionMismatch {
                    local: PROTOCOL_VERSION,
                    remote: hello.protocol_version,
                };
                let _ = write_message(
                    &mut stream,
                    &Message::Error(ErrorMessage {
                        worker_id: Some(id),
                        error: err.to_string(),
                    }),
                )
                .await;
                return Err(attribute(id, 0, state, err.into()));
            }

            info!(worker = id, name = %hello.worker_name, %peer, lo = band.lo, hi = band.hi, "Worker registered");
            slots.push(WorkerSlot {
                id,
                name: hello.worker_name,
                peer,
                band: *band,
                last_rows: Vec::new(),
                last_round: 0,
                stream,
            });
        }

        Ok(())
    }

    /// Distribute bands and run rounds until a terminal outcome
    async fn drive(
        &self,
        problem: &Problem,
        slots: &mut [WorkerSlot],
        state: &mut MasterState,
    ) -> Result<(Grid, u64, Outcome)> {
        let mut grid = problem.initial().clone();
        let cols = grid.cols();
        let coefficient = problem.rule().coefficient();

        for slot in slots.iter_mut() {
            let band = slot.band;
            let rows = grid.rows_slice(band.range()).to_vec();
            let init = Message::Init(InitMessage {
                protocol_version: PROTOCOL_VERSION,
                worker_id: slot.id,
                band,
                cols,
                coefficient,
                rows: rows.clone(),
                halo_top: grid.row(band.halo_top_row()).to_vec(),
                halo_bottom: grid.row(band.halo_bottom_row()).to_vec(),
                hotspot: problem
                    .hotspot()
                    .filter(|h| band.contains(h.row))
                    .and_then(|h| h.shifted(band.lo - 1)),
            });
            slot.last_rows = rows;
            self.send(slot, &init, 0, *state).await?;
        }

        let deadline = Instant::now() + self.round_timeout;
        for slot in slots.iter_mut() {
            match self.recv(slot, deadline, 0, *state, "STEP").await? {
                Message::Step(StepMessage { round: 0 }) => {}
                Message::Step(StepMessage { round }) => {
                    let err = ProtocolError::Malformed(format!("STEP({}) before any round, expected STEP(0)", round));
                    return Err(attribute(slot.id, 0, *state, err.into()));
                }
                other => {
                    return Err(attribute(slot.id, 0, *state, other.unexpected(Command::Step).into()))
                }
            }
        }
        info!(workers = slots.len(), "All workers initialized");

        let mut round = 0u64;
        loop {
            round += 1;

            *state = MasterState::AwaitingHaloAck(round);
            for slot in slots.iter_mut() {
                let halo = Message::Halo(HaloMessage {
                    round,
                    top: grid.row(slot.band.halo_top_row()).to_vec(),
                    bottom: grid.row(slot.band.halo_bottom_row()).to_vec(),
                });
                self.send(slot, &halo, round, *state).await?;
            }

            *state = MasterState::AwaitingResults(round);
            let deadline = Instant::now() + self.round_timeout;
            let mut max_delta = 0.0f64;
            for slot in slots.iter_mut() {
                let result = match self.recv(slot, deadline, round, *state, "RESULT").await? {
                    Message::Result(result) => result,
                    other => {
                        return Err(attribute(
                            slot.id,
                            round,
                            *state,
                            other.unexpected(Command::Result).into(),
                        ))
                    }
                };
                check_result(&result, slot, round, cols)
                    .map_err(|e| attribute(slot.id, round, *state, e.into()))?;

                grid.write_rows(slot.band.lo, &result.rows);
                max_delta = max_delta.max(result.max_delta);
                slot.last_rows = result.rows;
                slot.last_round = round;
            }

            if let Some(h) = problem.hotspot() {
                grid.pin_hotspot(h);
            }

            if let Some(outcome) = problem.terminal_outcome(round, max_delta) {
                let reason = match outcome {
                    Outcome::Converged { .. } => {
                        *state = MasterState::Converged;
                        StopReason::Converged
                    }
                    Outcome::IterationLimit { .. } => {
                        *state = MasterState::IterationLimit;
                        StopReason::IterationLimit
                    }
                };
                debug!(%state, round, "Stopping workers");

                let stop = Message::Stop(StopMessage { round, reason });
                for slot in slots.iter_mut() {
                    if let Err(e) = self.send(slot, &stop, round, *state).await {
                        warn!(worker = slot.id, error = %e, "Failed to deliver STOP");
                    }
                }
                return Ok((grid, round, outcome));
            }

            if round % 100 == 0 {
                debug!(round, max_delta, "Distributed progress");
            }
        }
    }

    /// Write one message within the round deadline, attributing failures
    async fn send(&self, slot: &mut WorkerSlot, msg: &Message, round: u64, state: MasterState) -> Result<()> {
        match timeout(self.round_timeout, write_message(&mut slot.stream, msg)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(attribute(slot.id, round, state, e)),
            Err(_) => Err(attribute(
                slot.id,
                round,
                state,
                SimError::Timeout {
                    what: format!("{} to be written", msg.command()),
                    after: self.round_timeout,
                },
            )),
        }
    }

    /// Read one message before `deadline`, attributing failures
    async fn recv(
        &self,
        slot: &mut WorkerSlot,
        deadline: Instant,
        round: u64,
        state: MasterState,
        what: &str,
    ) -> Result<Message> {
        match timeout_at(deadline, read_message(&mut slot.stream)).await {
            Ok(Ok(msg)) => Ok(msg),
            Ok(Err(e)) => Err(attribute(slot.id, round, state, e)),
            Err(_) => Err(attribute(
                slot.id,
                round,
                state,
                SimError::Timeout {
                    what: what.to_string(),
                    after: self.round_timeout,
                },
            )),
        }
    }
}

fn attribute(worker: usize, round: u64, state: MasterState, source: SimError) -> SimError {
    SimError::Worker {
        worker,
        round,
        state: state.to_string(),
        source: Box::new(source),
    }
}

/// RESULT must match the round, the sender and the band shape
fn check_result(
    result: &ResultMessage,
    slot: &WorkerSlot,
    round: u64,
    cols: usize,
) -> std::result::Result<(), ProtocolError> {
    if result.round != round {
        return Err(ProtocolError::Malformed(format!(
            "RESULT for round {}, expected round {}",
            result.round, round
        )));
    }
    if result.worker_id != slot.id {
        return Err(ProtocolError::Malformed(format!(
            "RESULT from worker {} on worker {}'s connection",
            result.worker_id, slot.id
        )));
    }
    let expected = slot.band.len() * cols;
    if result.rows.len() != expected {
        return Err(ProtocolError::Malformed(format!(
            "RESULT has {} cells, band {}..{} needs {}",
            result.rows.len(),
            slot.band.lo,
            slot.band.hi,
            expected
        )));
    }
    Ok(())
}

/// Best-effort STOP(Aborted) to every connection except the failed one
async fn abort_all(slots: &mut [WorkerSlot], failed: Option<usize>, round: u64) {
    let stop = Message::Stop(StopMessage {
        round,
        reason: StopReason::Aborted,
    });
    for slot in slots.iter_mut() {
        if Some(slot.id) == failed {
            continue;
        }
        match timeout(ABORT_WRITE_TIMEOUT, write_message(&mut slot.stream, &stop)).await {
            Ok(Ok(())) => debug!(worker = slot.id, "Sent STOP(Aborted)"),
            _ => debug!(worker = slot.id, "Could not deliver STOP(Aborted)"),
        }
    }
}
