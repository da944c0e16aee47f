//! Blocking client for the image relay protocol.
//!
//! The client checks the instruction against its own copy of the operation
//! table before connecting, so an obviously invalid request never reaches the
//! network. It then sends the instruction and the payload, half-closes, and
//! reads the response to EOF.
//!
//! The server answers a refused request by closing the connection without a
//! payload, and it may reset the connection if the request payload was never
//! read. Both come back as [`ClientError::NoResponse`].

use crate::protocol::{self, DEFAULT_FRAGMENT_SIZE, Instruction, ProtocolError};
use crate::registry::{OperationRegistry, RegistryError};
use crate::session::Connection;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("request refused locally: {0}")]
    UnknownOperation(#[from] RegistryError),
    #[error("parameter {parameter:?} is not valid for {operation} (expected {expected})")]
    InvalidParameter {
        operation: String,
        parameter: String,
        expected: String,
    },
    #[error("cannot connect: {0}")]
    Connect(#[source] io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("server closed the connection without a response")]
    NoResponse,
}

/// Sends requests to one server.
#[derive(Debug, Clone)]
pub struct Client {
    registry: OperationRegistry,
    fragment_size: usize,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl Client {
    pub fn new() -> Self {
        Self {
            registry: OperationRegistry::standard(),
            fragment_size: DEFAULT_FRAGMENT_SIZE,
        }
    }

    pub fn with_fragment_size(mut self, fragment_size: usize) -> Self {
        self.fragment_size = fragment_size.max(1);
        self
    }

    /// Validate the instruction, then send it with `payload`.
    pub fn send<A: ToSocketAddrs>(
        &self,
        addr: A,
        instruction: &Instruction,
        payload: &[u8],
    ) -> Result<Vec<u8>, ClientError> {
        if !self
            .registry
            .validate(&instruction.operation, &instruction.parameter)?
        {
            let expected = self
                .registry
                .schema(&instruction.operation)
                .map(|schema| schema.kind.to_string())
                .unwrap_or_default();
            return Err(ClientError::InvalidParameter {
                operation: instruction.operation.clone(),
                parameter: instruction.parameter.clone(),
                expected,
            });
        }
        self.send_unchecked(addr, instruction, payload)
    }

    /// Send without local validation.
    pub fn send_unchecked<A: ToSocketAddrs>(
        &self,
        addr: A,
        instruction: &Instruction,
        payload: &[u8],
    ) -> Result<Vec<u8>, ClientError> {
        let mut stream = TcpStream::connect(addr).map_err(ClientError::Connect)?;
        debug!(
            operation = %instruction.operation,
            parameter = %instruction.parameter,
            bytes = payload.len(),
            "sending request"
        );

        let response = exchange(&mut stream, instruction, payload, self.fragment_size)
            .map_err(|e| match e {
                ProtocolError::Io(io) if is_disconnect(&io) => ClientError::NoResponse,
                other => ClientError::Protocol(other),
            })?;
        if response.is_empty() {
            return Err(ClientError::NoResponse);
        }
        debug!(bytes = response.len(), "response received");
        Ok(response)
    }
}

/// Validate and send one request with the standard operation table.
pub fn send_request<A: ToSocketAddrs>(
    addr: A,
    instruction: &Instruction,
    payload: &[u8],
    fragment_size: usize,
) -> Result<Vec<u8>, ClientError> {
    Client::new()
        .with_fragment_size(fragment_size)
        .send(addr, instruction, payload)
}

fn exchange<C: Connection>(
    conn: &mut C,
    instruction: &Instruction,
    payload: &[u8],
    fragment_size: usize,
) -> Result<Vec<u8>, ProtocolError> {
    protocol::write_instruction(conn, instruction)?;
    protocol::write_payload(conn, payload, fragment_size)?;
    conn.close_write()?;
    protocol::read_payload(conn, fragment_size)
}

fn is_disconnect(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::NotConnected
    )
}
