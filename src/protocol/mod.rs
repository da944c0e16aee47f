//! Wire codec for the two frame kinds exchanged in a session.
//!
//! One session on the wire is always, in order:
//!
//! ```text
//! client → server   Instruction      u32be opLen | op | u32be paramLen | param
//! client → server   Payload          fragments (≤ fragment_size), ended by half-close
//! server → client   Payload          fragments (≤ fragment_size), ended by half-close
//! ```
//!
//! There is no status frame. A session the server refuses is visible to the
//! client only as a connection that closes without a response payload.
//!
//! Payload fragmentation is transparent: only the concatenated byte order is
//! significant, so readers never depend on the fragment sizes they observe.

pub mod instruction;
pub mod payload;

pub use instruction::{Instruction, read_instruction, write_instruction};
pub use payload::{read_payload, write_payload};

use thiserror::Error;

/// Fragment size used by the reference deployment.
pub const DEFAULT_FRAGMENT_SIZE: usize = 4096;

/// Default upper bound on a single instruction field.
pub const DEFAULT_MAX_FIELD_LEN: usize = 1024;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("connection closed while reading {field}")]
    Truncated { field: &'static str },
    #[error("{field} length {len} exceeds limit of {max} bytes")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Framing limits applied to every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Largest fragment written for a payload.
    pub fragment_size: usize,
    /// Largest accepted length for each instruction field.
    pub max_field_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            fragment_size: DEFAULT_FRAGMENT_SIZE,
            max_field_len: DEFAULT_MAX_FIELD_LEN,
        }
    }
}
