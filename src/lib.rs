//! # imgrelay
//!
//! A TCP server that applies one named image transformation per connection.
//! A client sends an `(operation, parameter)` instruction followed by an
//! encoded image; the server validates the instruction, transforms the image,
//! and streams the re-encoded result back.
//!
//! # Architecture: Accept → Schedule → Session
//!
//! ```text
//! Server::run          accept loop, one Session per connection
//!   └─ TaskScheduler   N workers, FIFO queue
//!        └─ Session    read instruction → validate → read payload
//!                      → transform → write payload → close
//! ```
//!
//! The accept loop never does client I/O; it only enqueues. Each session is
//! processed start to finish by a single worker, so `N` bounds both the
//! number of sessions in flight and the number of threads blocked on
//! sockets.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`server`] | Listening socket, accept loop, session bookkeeping, graceful stop |
//! | [`scheduler`] | Fixed-size worker pool fed from one FIFO task queue |
//! | [`session`] | Per-connection state machine from accept to close |
//! | [`protocol`] | Wire codec: length-prefixed instruction, fragmented payload |
//! | [`registry`] | Operation table, parameter validation, transform construction |
//! | [`imaging`] | Backend seam and the `image`-crate implementation of every transform |
//! | [`client`] | Blocking client that validates locally before sending |
//! | [`config`] | `config.toml` loading, merging over defaults, validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## No Status Frame
//!
//! The wire protocol has no acknowledgement or error frame. A refused or
//! failed session closes without a response payload, and the reason is only
//! logged on the server. Clients therefore treat an empty response as
//! failure.
//!
//! ## Validate Before Reading the Payload
//!
//! The instruction is checked against the [`registry`] before a single
//! payload byte is read, so invalid requests cost the server a few bytes of
//! input, not a full image.
//!
//! ## Threads, Not Async
//!
//! Sessions are short, CPU-bound, and strictly sequential, so a blocking
//! worker pool is the simplest model that bounds concurrency. A stalled
//! peer holds its worker until it disconnects; there are no socket timeouts.

pub mod client;
pub mod config;
pub mod imaging;
pub mod output;
pub mod protocol;
pub mod registry;
pub mod scheduler;
pub mod server;
pub mod session;

#[cfg(test)]
pub(crate) mod test_helpers;
