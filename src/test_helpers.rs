//! Shared test utilities for the imgrelay test suite.
//!
//! Provides synthetic images, a loopback server harness, and a log capture
//! for asserting on `tracing` output.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let running = spawn_server(2, MockBackend::new());
//! // ... talk to running.addr ...
//! running.stop();
//! ```

use std::io::{self, Cursor, Write};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use image::{DynamicImage, ImageFormat, RgbImage};

use crate::config::ServerConfig;
use crate::imaging::ImageBackend;
use crate::server::{Server, ServerError, SessionRegistry, ShutdownHandle};

// =========================================================================
// Synthetic images
// =========================================================================

/// Encode a small synthetic gradient as PNG.
pub fn gradient_png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

/// Decode any supported image into 8-bit RGB. Panics on garbage.
pub fn decode_rgb(bytes: &[u8]) -> RgbImage {
    image::load_from_memory(bytes).unwrap().to_rgb8()
}

// =========================================================================
// Loopback server
// =========================================================================

/// Config listening on an ephemeral loopback port.
pub fn loopback_config(workers: usize) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.server.bind = "127.0.0.1".into();
    config.server.port = 0;
    config.workers.count = Some(workers);
    config
}

/// A server running on a background thread.
pub struct RunningServer {
    pub addr: SocketAddr,
    pub sessions: SessionRegistry,
    handle: ShutdownHandle,
    thread: JoinHandle<Result<(), ServerError>>,
}

impl RunningServer {
    /// Stop accepting, wait for queued sessions, and join. Panics if the
    /// accept loop failed.
    pub fn stop(self) {
        self.handle.shutdown();
        self.thread.join().unwrap().unwrap();
    }
}

/// Bind on loopback and run the accept loop on a background thread.
///
/// The accept thread logs to the caller's current `tracing` dispatcher.
pub fn spawn_server<B: ImageBackend + 'static>(workers: usize, backend: B) -> RunningServer {
    let server = Server::bind(&loopback_config(workers), backend).unwrap();
    let dispatch = tracing::dispatcher::get_default(tracing::Dispatch::clone);
    RunningServer {
        addr: server.local_addr(),
        sessions: server.sessions(),
        handle: server.shutdown_handle(),
        thread: thread::spawn(move || {
            tracing::dispatcher::with_default(&dispatch, || server.run())
        }),
    }
}

// =========================================================================
// Log capture
// =========================================================================

/// In-memory sink for a `tracing_subscriber::fmt` subscriber.
#[derive(Debug, Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// A plain-text fmt subscriber writing into this capture.
    pub fn subscriber(&self) -> impl tracing::Subscriber + Send + Sync + 'static {
        let sink = self.clone();
        tracing_subscriber::fmt()
            .with_writer(move || sink.clone())
            .with_ansi(false)
            .finish()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
