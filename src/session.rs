//! Per-connection session state machine.
//!
//! A [`Session`] owns one accepted connection and walks it through a fixed
//! sequence of states:
//!
//! ```text
//! Accepted ─read instruction─▶ InstructionRead ─validate─▶ Validated
//!     ─read payload─▶ PayloadReceived ─apply─▶ Transformed ─write─▶ PayloadSent ─▶ Closed
//!
//! any non-terminal state ──▶ Rejected | Aborted ──▶ Closed
//! ```
//!
//! | Failure | Terminal state | Payload read? |
//! |---------|----------------|---------------|
//! | Malformed or truncated instruction | `Aborted` | no |
//! | Unknown operation, bad parameter | `Rejected` | no |
//! | I/O error while receiving the payload | `Aborted` | partially |
//! | No transform behind the operation | `Aborted` | yes |
//! | Payload is not a decodable image | `Aborted` | yes |
//! | I/O error while sending the response | `Aborted` | yes |
//!
//! Rejected and aborted sessions close without writing anything. Error detail
//! only goes to the server log. The connection is released exactly once, when
//! [`Session::run`] returns.

use crate::imaging::{BackendError, ImageBackend, TransformHandle};
use crate::protocol::{self, Limits, ProtocolError};
use crate::registry::{ConstructionError, OperationRegistry, RegistryError};
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("validation failed: {0}")]
    Validation(#[from] RegistryError),
    #[error("parameter {parameter:?} is not valid for {operation}")]
    InvalidParameter { operation: String, parameter: String },
    #[error("transform construction failed: {0}")]
    Construction(#[from] ConstructionError),
    #[error("transform failed: {0}")]
    Transform(#[from] BackendError),
}

impl SessionError {
    /// Whether the session ends `Rejected` (validation) rather than `Aborted`.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidParameter { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Accepted,
    InstructionRead,
    Validated,
    PayloadReceived,
    Transformed,
    PayloadSent,
    Rejected,
    Aborted,
    Closed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        self == Self::Closed
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A byte stream whose write direction can be closed independently.
///
/// Closing the write side is how a payload is terminated on the wire.
pub trait Connection: Read + Write {
    fn close_write(&mut self) -> io::Result<()>;
}

impl Connection for TcpStream {
    fn close_write(&mut self) -> io::Result<()> {
        self.shutdown(Shutdown::Write)
    }
}

/// Everything a session borrows from the server.
pub struct SessionContext<B> {
    pub registry: Arc<OperationRegistry>,
    pub backend: Arc<B>,
    pub limits: Limits,
}

impl<B> Clone for SessionContext<B> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            backend: Arc::clone(&self.backend),
            limits: self.limits,
        }
    }
}

/// What happened during a session, returned once it has closed.
#[derive(Debug)]
pub struct SessionReport {
    pub id: u64,
    pub operation: Option<String>,
    pub bytes_in: usize,
    pub bytes_out: usize,
    /// Every state visited, starting with `Accepted` and ending with `Closed`.
    pub states: Vec<SessionState>,
    pub result: Result<(), SessionError>,
}

impl SessionReport {
    pub fn final_outcome(&self) -> SessionState {
        match &self.result {
            Ok(()) => SessionState::PayloadSent,
            Err(e) if e.is_rejection() => SessionState::Rejected,
            Err(_) => SessionState::Aborted,
        }
    }
}

pub struct Session<C> {
    id: u64,
    conn: C,
    states: Vec<SessionState>,
}

impl<C: Connection> Session<C> {
    pub fn new(id: u64, conn: C) -> Self {
        Self {
            id,
            conn,
            states: vec![SessionState::Accepted],
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.states
            .last()
            .copied()
            .unwrap_or(SessionState::Accepted)
    }

    /// Drive the session to `Closed` and release the connection.
    pub fn run<B: ImageBackend>(mut self, ctx: &SessionContext<B>) -> SessionReport {
        let mut report = SessionReport {
            id: self.id,
            operation: None,
            bytes_in: 0,
            bytes_out: 0,
            states: Vec::new(),
            result: Ok(()),
        };

        let result = self.drive(ctx, &mut report);
        match &result {
            Ok(()) => info!(
                session = self.id,
                operation = report.operation.as_deref().unwrap_or(""),
                bytes_in = report.bytes_in,
                bytes_out = report.bytes_out,
                "session complete"
            ),
            Err(e) => {
                let state = if e.is_rejection() {
                    SessionState::Rejected
                } else {
                    SessionState::Aborted
                };
                self.advance(state);
                warn!(session = self.id, state = %state, error = %e, "session failed");
            }
        }
        self.advance(SessionState::Closed);

        let Session { states, conn, .. } = self;
        drop(conn);
        report.states = states;
        report.result = result;
        report
    }

    fn drive<B: ImageBackend>(
        &mut self,
        ctx: &SessionContext<B>,
        report: &mut SessionReport,
    ) -> Result<(), SessionError> {
        let instruction = protocol::read_instruction(&mut self.conn, ctx.limits.max_field_len)?;
        report.operation = Some(instruction.operation.clone());
        self.advance(SessionState::InstructionRead);

        if !ctx
            .registry
            .validate(&instruction.operation, &instruction.parameter)?
        {
            return Err(SessionError::InvalidParameter {
                operation: instruction.operation,
                parameter: instruction.parameter,
            });
        }
        self.advance(SessionState::Validated);

        let input = protocol::read_payload(&mut self.conn, ctx.limits.fragment_size)?;
        report.bytes_in = input.len();
        self.advance(SessionState::PayloadReceived);

        let transform = ctx
            .registry
            .construct(&instruction.operation, &instruction.parameter)?;
        let handle = TransformHandle::new(transform, &*ctx.backend);
        let output = handle.apply(&input)?;
        self.advance(SessionState::Transformed);

        protocol::write_payload(&mut self.conn, &output, ctx.limits.fragment_size)?;
        self.conn.close_write().map_err(ProtocolError::from)?;
        report.bytes_out = output.len();
        self.advance(SessionState::PayloadSent);
        Ok(())
    }

    fn advance(&mut self, next: SessionState) {
        debug!(session = self.id, from = %self.state(), to = %next, "session transition");
        self.states.push(next);
    }
}
