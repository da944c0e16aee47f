//! Instruction frame: two length-prefixed UTF-8 strings.
//!
//! ```text
//! [u32 big-endian opLen][opLen bytes operation][u32 big-endian paramLen][paramLen bytes parameter]
//! ```
//!
//! Each field is read into an owned buffer of exactly the advertised length.
//! The length is checked against a limit before anything is allocated, so a
//! hostile prefix cannot make the server reserve gigabytes.

use super::ProtocolError;
use std::io::{self, Read, Write};

/// The (operation, parameter) pair a client sends to select a transformation.
///
/// Decoded straight off the wire; nothing about it is trusted until the
/// [`registry`](crate::registry) has validated it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub operation: String,
    pub parameter: String,
}

impl Instruction {
    pub fn new(operation: impl Into<String>, parameter: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            parameter: parameter.into(),
        }
    }

    /// Encode into a standalone frame.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::with_capacity(8 + self.operation.len() + self.parameter.len());
        write_instruction(&mut buf, self)?;
        Ok(buf)
    }
}

/// Read an instruction frame, refusing fields longer than `max_field_len`.
pub fn read_instruction<R: Read>(
    reader: &mut R,
    max_field_len: usize,
) -> Result<Instruction, ProtocolError> {
    let operation = read_field(reader, "operation", max_field_len)?;
    let parameter = read_field(reader, "parameter", max_field_len)?;
    Ok(Instruction {
        operation,
        parameter,
    })
}

/// Write an instruction frame.
pub fn write_instruction<W: Write>(
    writer: &mut W,
    instruction: &Instruction,
) -> Result<(), ProtocolError> {
    write_field(writer, "operation", &instruction.operation)?;
    write_field(writer, "parameter", &instruction.parameter)?;
    Ok(())
}

fn read_exact_or_truncated<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    field: &'static str,
) -> Result<(), ProtocolError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => ProtocolError::Truncated { field },
        _ => ProtocolError::Io(e),
    })
}

fn read_field<R: Read>(
    reader: &mut R,
    field: &'static str,
    max: usize,
) -> Result<String, ProtocolError> {
    let mut prefix = [0u8; 4];
    read_exact_or_truncated(reader, &mut prefix, field)?;
    let len = u32::from_be_bytes(prefix) as usize;
    if len > max {
        return Err(ProtocolError::FieldTooLong { field, len, max });
    }

    let mut bytes = vec![0u8; len];
    read_exact_or_truncated(reader, &mut bytes, field)?;
    String::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8 { field })
}

fn write_field<W: Write>(
    writer: &mut W,
    field: &'static str,
    value: &str,
) -> Result<(), ProtocolError> {
    let len = u32::try_from(value.len()).map_err(|_| ProtocolError::FieldTooLong {
        field,
        len: value.len(),
        max: u32::MAX as usize,
    })?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(value.as_bytes())?;
    Ok(())
}
