//! Payload stream: an opaque byte sequence sent as bounded fragments.
//!
//! There is no length prefix. The sender writes fragments of at most
//! `fragment_size` bytes and then half-closes its write direction; the
//! receiver concatenates whatever arrives until it reads EOF. Fragment
//! boundaries are not preserved by TCP and carry no meaning.

use super::ProtocolError;
use std::io::{self, Read, Write};

/// Read fragments until EOF and return them concatenated.
///
/// `fragment_size` is the read buffer size; any value works since the
/// sender's fragmentation is not observable, but it is clamped to at least 1.
/// The payload is buffered whole; its total size is not bounded here.
pub fn read_payload<R: Read>(
    reader: &mut R,
    fragment_size: usize,
) -> Result<Vec<u8>, ProtocolError> {
    let mut payload = Vec::new();
    let mut fragment = vec![0u8; fragment_size.max(1)];
    loop {
        match reader.read(&mut fragment) {
            Ok(0) => break,
            Ok(n) => payload.extend_from_slice(&fragment[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(ProtocolError::Io(e)),
        }
    }
    Ok(payload)
}

/// Write `payload` as fragments of at most `fragment_size` bytes.
///
/// Returns the number of fragments written. The caller ends the payload by
/// half-closing the connection; this function only flushes.
pub fn write_payload<W: Write>(
    writer: &mut W,
    payload: &[u8],
    fragment_size: usize,
) -> Result<usize, ProtocolError> {
    let mut fragments = 0;
    for fragment in payload.chunks(fragment_size.max(1)) {
        writer.write_all(fragment)?;
        fragments += 1;
    }
    writer.flush()?;
    Ok(fragments)
}
