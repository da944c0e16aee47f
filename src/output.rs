//! CLI output formatting.
//!
//! Everything the binary prints on stdout goes through here; diagnostics go
//! through `tracing` instead.
//!
//! # Output Format
//!
//! ## Operations
//!
//! ```text
//! Operations
//!     resize      double
//!     rotate      double
//!     flip        integer
//!     colour      one of rgb|hsv|grey|ycc|hsl
//! ```
//!
//! ## Serve
//!
//! ```text
//! Serving on 0.0.0.0:12345
//!     Workers: 8
//!     Output: jpeg (quality 90)
//!     Fragments: 4096 bytes
//! ```
//!
//! ## Send
//!
//! ```text
//! colour grey → out.jpg
//!     Sent: 48213 bytes
//!     Received: 20115 bytes
//! ```
//!
//! # Architecture
//!
//! Each block has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::config::ServerConfig;
use crate::imaging::OutputFormat;
use crate::protocol::Instruction;
use crate::registry::OperationRegistry;
use std::net::SocketAddr;
use std::path::Path;

// ============================================================================
// Operations
// ============================================================================

/// Format the operation table, names padded into one column.
pub fn format_operations(registry: &OperationRegistry) -> Vec<String> {
    let width = registry
        .operations()
        .iter()
        .map(|op| op.name.len())
        .max()
        .unwrap_or(0);

    let mut lines = vec!["Operations".to_string()];
    for op in registry.operations() {
        lines.push(format!("    {:<width$}  {}", op.name, op.kind));
    }
    lines
}

pub fn print_operations(registry: &OperationRegistry) {
    for line in format_operations(registry) {
        println!("{}", line);
    }
}

// ============================================================================
// Serve
// ============================================================================

pub fn format_serve_banner(
    addr: SocketAddr,
    workers: usize,
    config: &ServerConfig,
) -> Vec<String> {
    let output = match config.output.format {
        OutputFormat::Jpeg => format!("jpeg (quality {})", config.output.quality),
        OutputFormat::Png => "png".to_string(),
    };
    vec![
        format!("Serving on {}", addr),
        format!("    Workers: {}", workers),
        format!("    Output: {}", output),
        format!("    Fragments: {} bytes", config.protocol.fragment_size),
        format!("    Max output: {} pixels", config.output.max_pixels),
    ]
}

pub fn print_serve_banner(addr: SocketAddr, workers: usize, config: &ServerConfig) {
    for line in format_serve_banner(addr, workers, config) {
        println!("{}", line);
    }
}

// ============================================================================
// Send
// ============================================================================

pub fn format_send_result(
    instruction: &Instruction,
    output: &Path,
    sent: usize,
    received: usize,
) -> Vec<String> {
    vec![
        format!(
            "{} {} → {}",
            instruction.operation,
            instruction.parameter,
            output.display()
        ),
        format!("    Sent: {} bytes", sent),
        format!("    Received: {} bytes", received),
    ]
}

pub fn print_send_result(instruction: &Instruction, output: &Path, sent: usize, received: usize) {
    for line in format_send_result(instruction, output, sent, received) {
        println!("{}", line);
    }
}
