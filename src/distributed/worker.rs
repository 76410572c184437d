//! Distributed worker
//!
//! A worker connects to the master, receives one band of rows and then only
//! reacts: every HALO(k) is answered with RESULT(k) until STOP arrives.
//!
//! The local band is padded with the two halo rows and double-buffered, so the
//! sweep reads round k-1 and writes round k without touching its input.

use crate::config::NetworkConfig;
use crate::distributed::protocol::*;
use crate::error::{ProtocolError, Result, SimError};
use crate::grid::{Hotspot, StencilRule};
use crate::partition::Band;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

/// Pause between connection attempts
const RETRY_INTERVAL: Duration = Duration::from_millis(200);

/// Deadline for the best-effort ERROR report before closing
const ERROR_WRITE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Connecting,
    AwaitInit,
    AwaitHalo(u64),
    Compute(u64),
    SendResult(u64),
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerState::Connecting => write!(f, "Connecting"),
            WorkerState::AwaitInit => write!(f, "AwaitInit"),
            WorkerState::AwaitHalo(k) => write!(f, "AwaitHalo({})", k),
            WorkerState::Compute(k) => write!(f, "Compute({})", k),
            WorkerState::SendResult(k) => write!(f, "SendResult({})", k),
            WorkerState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// What a worker returns after STOP
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerOutcome {
    pub worker_id: usize,
    pub band: Band,
    /// Owned rows after the last computed round, row-major
    pub rows: Vec<f64>,
    /// Rounds this worker computed
    pub rounds: u64,
    pub reason: StopReason,
}

/// Band state received in INIT
struct LocalBand {
    worker_id: usize,
    band: Band,
    cols: usize,
    rule: StencilRule,
    hotspot: Option<Hotspot>,
    /// `band.len() + 2` rows: top halo, owned rows, bottom halo
    current: Vec<f64>,
    next: Vec<f64>,
}

impl LocalBand {
    fn from_init(init: InitMessage) -> std::result::Result<Self, ProtocolError> {
        if init.protocol_version != PROTOCOL_VERSION {
            return Err(ProtocolError::VersionMismatch {
                local: PROTOCOL_VERSION,
                remote: init.protocol_version,
            });
        }

        let cols = init.cols;
        if cols < 3 || init.band.lo < 1 || init.band.lo >= init.band.hi {
            return Err(ProtocolError::Malformed(format!(
                "INIT band {}..{} with {} columns has no interior",
                init.band.lo, init.band.hi, cols
            )));
        }
        let n = init.band.len();
        let cells = n.checked_mul(cols).ok_or_else(|| {
            ProtocolError::Malformed(format!("INIT band of {} rows x {} columns overflows", n, cols))
        })?;
        if init.rows.len() != cells {
            return Err(ProtocolError::Malformed(format!(
                "INIT has {} cells, band needs {}",
                init.rows.len(),
                cells
            )));
        }
        check_halos(&init.halo_top, &init.halo_bottom, cols)?;
        if let Some(h) = init.hotspot {
            if h.row < 1 || h.row > n || h.col < 1 || h.col >= cols - 1 {
                return Err(ProtocolError::Malformed(format!(
                    "INIT hotspot ({}, {}) outside the band",
                    h.row, h.col
                )));
            }
        }

        let mut current = Vec::with_capacity((n + 2) * cols);
        current.extend_from_slice(&init.halo_top);
        current.extend_from_slice(&init.rows);
        current.extend_from_slice(&init.halo_bottom);
        let next = current.clone();

        Ok(Self {
            worker_id: init.worker_id,
            band: init.band,
            cols,
            rule: StencilRule::new(init.coefficient),
            hotspot: init.hotspot,
            current,
            next,
        })
    }

    fn owned_rows(&self) -> &[f64] {
        &self.current[self.cols..(self.band.len() + 1) * self.cols]
    }

    fn set_halos(&mut self, top: &[f64], bottom: &[f64]) {
        let cols = self.cols;
        let last = (self.band.len() + 1) * cols;
        self.current[..cols].copy_from_slice(top);
        self.current[last..last + cols].copy_from_slice(bottom);
    }

    /// Sweep the owned rows into the back buffer and swap; returns the max change
    fn step(&mut self) -> f64 {
        let cols = self.cols;
        let n = self.band.len();
        let max_delta = self.rule.sweep_rows(
            &self.current,
            cols,
            1..n + 1,
            &mut self.next[cols..(n + 1) * cols],
            self.hotspot.as_ref(),
        );
        std::mem::swap(&mut self.current, &mut self.next);
        max_delta
    }
}

fn check_halos(top: &[f64], bottom: &[f64], cols: usize) -> std::result::Result<(), ProtocolError> {
    if top.len() != cols || bottom.len() != cols {
        return Err(ProtocolError::Malformed(format!(
            "halo rows have {} and {} cells, expected {}",
            top.len(),
            bottom.len(),
            cols
        )));
    }
    Ok(())
}

/// Distributed worker
pub struct DistributedWorker {
    addr: String,
    connect_timeout: Duration,
    name: String,
}

impl DistributedWorker {
    pub fn new(network: &NetworkConfig) -> Self {
        Self {
            addr: network.addr(),
            connect_timeout: network.connect_timeout(),
            name: worker_name(),
        }
    }

    /// Override the name sent in HELLO
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Connect to the master and serve until STOP
    pub async fn run(&self) -> Result<WorkerOutcome> {
        let stream = self.connect().await?;
        stream.set_nodelay(true)?;
        self.serve(stream).await
    }

    /// Retry until the master accepts or the connect timeout expires
    async fn connect(&self) -> Result<TcpStream> {
        debug!(state = %WorkerState::Connecting, addr = %self.addr, "Connecting to master");
        let deadline = Instant::now() + self.connect_timeout;

        loop {
            match timeout_at(deadline, TcpStream::connect(&self.addr)).await {
                Ok(Ok(stream)) => {
                    info!(addr = %self.addr, "Connected to master");
                    return Ok(stream);
                }
                Ok(Err(e)) if Instant::now() + RETRY_INTERVAL < deadline => {
                    debug!(error = %e, "Master not reachable yet, retrying");
                    sleep(RETRY_INTERVAL).await;
                }
                Ok(Err(e)) => {
                    warn!(error = %e, addr = %self.addr, "Giving up on master");
                    return Err(self.connect_timed_out());
                }
                Err(_) => return Err(self.connect_timed_out()),
            }
        }
    }

    fn connect_timed_out(&self) -> SimError {
        SimError::Timeout {
            what: format!("connection to master at {}", self.addr),
            after: self.connect_timeout,
        }
    }

    /// Run the worker protocol over an established stream
    ///
    /// On failure a best-effort ERROR is sent before the stream is dropped.
    pub async fn serve<S>(&self, mut stream: S) -> Result<WorkerOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut state = WorkerState::AwaitInit;
        let mut worker_id = None;

        let result = self.session(&mut stream, &mut state, &mut worker_id).await;
        if let Err(ref e) = result {
            warn!(%state, error = %e, "Worker failed");
            if !matches!(e, SimError::Protocol(ProtocolError::ConnectionClosed)) {
                let report = Message::Error(ErrorMessage {
                    worker_id,
                    error: format!("{} (worker state {})", e, state),
                });
                let _ = timeout(ERROR_WRITE_TIMEOUT, write_message(&mut stream, &report)).await;
            }
        }
        result
    }

    async fn session<S>(
        &self,
        stream: &mut S,
        state: &mut WorkerState,
        worker_id: &mut Option<usize>,
    ) -> Result<WorkerOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        write_message(
            stream,
            &Message::Hello(HelloMessage {
                protocol_version: PROTOCOL_VERSION,
                worker_name: self.name.clone(),
            }),
        )
        .await?;

        let init = match read_message(stream).await? {
            Message::Init(init) => init,
            other => return Err(other.unexpected(Command::Init).into()),
        };
        let mut local = LocalBand::from_init(init)?;
        *worker_id = Some(local.worker_id);
        info!(
            worker = local.worker_id,
            lo = local.band.lo,
            hi = local.band.hi,
            cols = local.cols,
            "Band received"
        );

        write_message(stream, &Message::Step(StepMessage { round: 0 })).await?;

        let mut round = 0u64;
        loop {
            *state = WorkerState::AwaitHalo(round + 1);
            match read_message(stream).await? {
                Message::Halo(halo) => {
                    if halo.round != round + 1 {
                        return Err(ProtocolError::Malformed(format!(
                            "HALO for round {}, expected round {}",
                            halo.round,
                            round + 1
                        ))
                        .into());
                    }
                    check_halos(&halo.top, &halo.bottom, local.cols)?;

                    *state = WorkerState::Compute(halo.round);
                    local.set_halos(&halo.top, &halo.bottom);
                    let max_delta = local.step();
                    round = halo.round;

                    *state = WorkerState::SendResult(round);
                    let result = Message::Result(ResultMessage {
                        round,
                        worker_id: local.worker_id,
                        rows: local.owned_rows().to_vec(),
                        max_delta,
                    });
                    write_message(stream, &result).await?;
                }
                Message::Stop(stop) => {
                    *state = WorkerState::Stopped;
                    info!(worker = local.worker_id, rounds = round, reason = ?stop.reason, "Stopped by master");
                    return Ok(WorkerOutcome {
                        worker_id: local.worker_id,
                        band: local.band,
                        rows: local.owned_rows().to_vec(),
                        rounds: round,
                        reason: stop.reason,
                    });
                }
                other => return Err(other.unexpected(Command::Halo).into()),
            }
        }
    }
}

fn worker_name() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::Grid;

    fn worker() -> DistributedWorker {
        DistributedWorker::new(&NetworkConfig::default()).with_name("test")
    }

    /// 5x4 grid, band = rows 1..4, top boundary 100
    fn init_message() -> InitMessage {
        InitMessage {
            protocol_version: PROTOCOL_VERSION,
            worker_id: 0,
            band: Band { id: 0, lo: 1, hi: 4 },
            cols: 4,
            coefficient: 0.2,
            rows: vec![0.0; 12],
            halo_top: vec![100.0; 4],
            halo_bottom: vec![0.0; 4],
            hotspot: None,
        }
    }

    #[tokio::test]
    async fn test_worker_session() {
        let (worker_side, mut master) = tokio::io::duplex(1 << 16);
        let task = tokio::spawn(async move { worker().serve(worker_side).await });

        match read_message(&mut master).await.unwrap() {
            Message::Hello(h) => {
                assert_eq!(h.protocol_version, PROTOCOL_VERSION);
                assert_eq!(h.worker_name, "test");
            }
            other => panic!("expected HELLO, got {}", other.command()),
        }

        write_message(&mut master, &Message::Init(init_message())).await.unwrap();
        assert_eq!(
            read_message(&mut master).await.unwrap(),
            Message::Step(StepMessage { round: 0 })
        );

        // Compare against a sequential step on the same 5x4 grid
        let mut grid = Grid::new(5, 4, 0.0).unwrap();
        grid.rows_slice_mut(0..1).fill(100.0);
        let mut next = grid.clone();
        let rule = StencilRule::new(0.2);

        for round in 1..=3 {
            write_message(
                &mut master,
                &Message::Halo(HaloMessage {
                    round,
                    top: grid.row(0).to_vec(),
                    bottom: grid.row(4).to_vec(),
                }),
            )
            .await
            .unwrap();

            let expected_delta = crate::sequential::step(&rule, &grid, &mut next, None);
            std::mem::swap(&mut grid, &mut next);

            match read_message(&mut master).await.unwrap() {
                Message::Result(r) => {
                    assert_eq!(r.round, round);
                    assert_eq!(r.rows, grid.rows_slice(1..4));
                    assert_eq!(r.max_delta, expected_delta);
                }
                other => panic!("expected RESULT, got {}", other.command()),
            }
        }

        write_message(
            &mut master,
            &Message::Stop(StopMessage {
                round: 3,
                reason: StopReason::IterationLimit,
            }),
        )
        .await
        .unwrap();

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome.rounds, 3);
        assert_eq!(outcome.reason, StopReason::IterationLimit);
        assert_eq!(outcome.rows, grid.rows_slice(1..4));
    }

    #[tokio::test]
    async fn test_worker_rejects_skipped_round() {
        let (worker_side, mut master) = tokio::io::duplex(1 << 16);
        let task = tokio::spawn(async move { worker().serve(worker_side).await });

        read_message(&mut master).await.unwrap();
        write_message(&mut master, &Message::Init(init_message())).await.unwrap();
        read_message(&mut master).await.unwrap();

        write_message(
            &mut master,
            &Message::Halo(HaloMessage {
                round: 2,
                top: vec![100.0; 4],
                bottom: vec![0.0; 4],
            }),
        )
        .await
        .unwrap();

        // Best-effort ERROR before closing
        match read_message(&mut master).await.unwrap() {
            Message::Error(e) => {
                assert_eq!(e.worker_id, Some(0));
                assert!(e.error.contains("expected round 1"));
            }
            other => panic!("expected ERROR, got {}", other.command()),
        }

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(err, SimError::Protocol(ProtocolError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_worker_rejects_unexpected_command() {
        let (worker_side, mut master) = tokio::io::duplex(1 << 16);
        let task = tokio::spawn(async move { worker().serve(worker_side).await });

        read_message(&mut master).await.unwrap();
        write_message(&mut master, &Message::Step(StepMessage { round: 0 }))
            .await
            .unwrap();

        let err = task.await.unwrap().unwrap_err();
        match err {
            SimError::Protocol(ProtocolError::UnexpectedCommand { expected, got }) => {
                assert_eq!(expected, "INIT");
                assert_eq!(got, "STEP");
            }
            other => panic!("unexpected: {}", other),
        }
    }

    #[tokio::test]
    async fn test_worker_rejects_bad_init_shape() {
        let (worker_side, mut master) = tokio::io::duplex(1 << 16);
        let task = tokio::spawn(async move { worker().serve(worker_side).await });

        read_message(&mut master).await.unwrap();
        let mut init = init_message();
        init.rows.pop();
        write_message(&mut master, &Message::Init(init)).await.unwrap();

        assert!(matches!(
            task.await.unwrap(),
            Err(SimError::Protocol(ProtocolError::Malformed(_)))
        ));
    }

    #[tokio::test]
    async fn test_worker_rejects_inverted_band() {
        for (lo, hi, cols) in [(5, 2, 4), (0, 3, 4), (3, 3, 4), (1, usize::MAX, usize::MAX)] {
            let (worker_side, mut master) = tokio::io::duplex(1 << 16);
            let task = tokio::spawn(async move { worker().serve(worker_side).await });

            read_message(&mut master).await.unwrap();
            let mut init = init_message();
            init.band = Band { id: 0, lo, hi };
            init.cols = cols;
            write_message(&mut master, &Message::Init(init)).await.unwrap();

            let result = task.await.expect("worker task must not panic");
            assert!(
                matches!(result, Err(SimError::Protocol(ProtocolError::Malformed(_)))),
                "band {}..{} x {} accepted",
                lo,
                hi,
                cols
            );
        }
    }

    #[tokio::test]
    async fn test_worker_master_disconnect() {
        let (worker_side, master) = tokio::io::duplex(1 << 16);
        let task = tokio::spawn(async move { worker().serve(worker_side).await });
        drop(master);

        let err = task.await.unwrap().unwrap_err();
        assert!(matches!(
            err,
            SimError::Protocol(ProtocolError::ConnectionClosed) | SimError::Io(_)
        ));
    }

    #[tokio::test]
    async fn test_connect_gives_up_after_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let network = NetworkConfig {
            port,
            connect_timeout_ms: 300,
            ..NetworkConfig::default()
        };
        let started = std::time::Instant::now();
        let err = DistributedWorker::new(&network).run().await.unwrap_err();
        assert!(matches!(err, SimError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
