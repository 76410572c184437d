//! Master/worker wire protocol
//!
//! Messages exchanged between the distributed master and its workers. Payloads
//! are serialized with MessagePack (rmp-serde); `f64` rows travel as MessagePack
//! float64 so values arrive bit-exact.
//!
//! # Protocol Version
//!
//! Current version: 1
//!
//! # Message Flow
//!
//! ```text
//! Master                          Worker
//!     |                              |
//!     |<------- HELLO ---------------|
//!     |                              |
//!     |-------- INIT --------------->|
//!     |<------- STEP(0) -------------|
//!     |                              |
//!     |-------- HALO(k) ------------>|   k = 1, 2, ...
//!     |<------- RESULT(k) -----------|
//!     |                              |
//!     |-------- STOP(reason) ------->|
//! ```
//!
//! Either side may send ERROR before closing the connection.
//!
//! # Message Framing
//!
//! Each message is prefixed with a 4-byte length field (big-endian u32):
//!
//! ```text
//! [4 bytes: payload length][N bytes: MessagePack message]
//! ```

use crate::error::{ProtocolError, Result, SimError};
use crate::grid::Hotspot;
use crate::partition::Band;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version
///
/// Master and workers must have matching protocol versions.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest payload accepted by the frame reader (256 MiB)
pub const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// Size of the length prefix
pub const HEADER_LEN: usize = 4;

/// Command carried by a message, used for state checks and diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Hello,
    Init,
    Step,
    Halo,
    Result,
    Stop,
    Error,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::Hello => "HELLO",
            Command::Init => "INIT",
            Command::Step => "STEP",
            Command::Halo => "HALO",
            Command::Result => "RESULT",
            Command::Stop => "STOP",
            Command::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Why the master ended the run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    Converged,
    IterationLimit,
    Aborted,
}

/// Protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Registration (Worker → Master)
    Hello(HelloMessage),

    /// Band assignment (Master → Worker)
    Init(InitMessage),

    /// Ready to advance from `round` (Worker → Master)
    ///
    /// Sent once with round 0 to acknowledge INIT.
    Step(StepMessage),

    /// Halo rows for a round (Master → Worker)
    Halo(HaloMessage),

    /// Updated interior rows (Worker → Master)
    Result(ResultMessage),

    /// End of run (Master → Worker)
    Stop(StopMessage),

    /// Fatal error report (either direction)
    Error(ErrorMessage),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelloMessage {
    pub protocol_version: u32,

    /// Hostname of the worker process, for logs only
    pub worker_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitMessage {
    pub protocol_version: u32,

    pub worker_id: usize,

    /// Global interior rows owned by this worker
    pub band: Band,

    pub cols: usize,

    pub coefficient: f64,

    /// Initial values of the owned rows, row-major, `band.len() * cols` cells
    pub rows: Vec<f64>,

    /// Copy of global row `band.lo - 1`
    pub halo_top: Vec<f64>,

    /// Copy of global row `band.hi`
    pub halo_bottom: Vec<f64>,

    /// Hotspot in local coordinates (row 0 is the top halo), if this band owns it
    pub hotspot: Option<Hotspot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StepMessage {
    pub round: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HaloMessage {
    /// Round the worker is about to compute
    pub round: u64,
    pub top: Vec<f64>,
    pub bottom: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage {
    pub round: u64,
    pub worker_id: usize,

    /// Owned rows after the round, row-major
    pub rows: Vec<f64>,

    /// Largest absolute change of any owned cell in this round
    pub max_delta: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopMessage {
    /// Last round the master committed
    pub round: u64,
    pub reason: StopReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub worker_id: Option<usize>,
    pub error: String,
}

impl Message {
    pub fn command(&self) -> Command {
        match self {
            Message::Hello(_) => Command::Hello,
            Message::Init(_) => Command::Init,
            Message::Step(_) => Command::Step,
            Message::Halo(_) => Command::Halo,
            Message::Result(_) => Command::Result,
            Message::Stop(_) => Command::Stop,
            Message::Error(_) => Command::Error,
        }
    }

    /// Error for receiving this message while waiting for `expected`
    ///
    /// A peer-sent ERROR is surfaced as [`ProtocolError::Remote`].
    pub fn unexpected(self, expected: Command) -> ProtocolError {
        match self {
            Message::Error(err) => ProtocolError::Remote(err.error),
            other => ProtocolError::UnexpectedCommand {
                expected: expected.to_string(),
                got: other.command().to_string(),
            },
        }
    }
}

/// Serialize a message into a length-prefixed frame
pub fn encode_frame(msg: &Message) -> std::result::Result<Vec<u8>, ProtocolError> {
    let payload = rmp_serde::to_vec(msg)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(payload.len()));
    }

    let mut framed = Vec::with_capacity(HEADER_LEN + payload.len());
    framed.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    framed.extend_from_slice(&payload);
    Ok(framed)
}

/// Deserialize one frame from the front of `buf`
///
/// Returns the message and the number of bytes consumed, prefix included.
pub fn decode_frame(buf: &[u8]) -> std::result::Result<(Message, usize), ProtocolError> {
    if buf.len() < HEADER_LEN {
        return Err(ProtocolError::Truncated {
            expected: HEADER_LEN,
            got: buf.len(),
        });
    }

    let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    let body = &buf[HEADER_LEN..];
    if body.len() < len {
        return Err(ProtocolError::Truncated {
            expected: len,
            got: body.len(),
        });
    }

    let msg = rmp_serde::from_slice(&body[..len])?;
    Ok((msg, HEADER_LEN + len))
}

/// Fill `buf` from the stream, stopping early only at EOF
///
/// Returns the number of bytes read.
async fn read_full<R>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Read one complete message
///
/// Short reads are retried until the frame is complete. EOF before the first
/// byte of a frame is [`ProtocolError::ConnectionClosed`]; EOF anywhere else is
/// [`ProtocolError::Truncated`].
pub async fn read_message<R>(reader: &mut R) -> Result<Message>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; HEADER_LEN];
    let got = read_full(reader, &mut len_buf).await?;
    if got == 0 {
        return Err(ProtocolError::ConnectionClosed.into());
    }
    if got < HEADER_LEN {
        return Err(ProtocolError::Truncated {
            expected: HEADER_LEN,
            got,
        }
        .into());
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len).into());
    }

    let mut body = vec![0u8; len];
    let got = read_full(reader, &mut body).await?;
    if got < len {
        return Err(ProtocolError::Truncated { expected: len, got }.into());
    }

    rmp_serde::from_slice(&body)
        .map_err(ProtocolError::from)
        .map_err(SimError::from)
}

/// Write one message and flush it
pub async fn write_message<W>(writer: &mut W, msg: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let framed = encode_frame(msg)?;
    writer.write_all(&framed).await?;
    writer.flush().await?;
    Ok(())
}
