//! TCP acceptor.
//!
//! [`Server::bind`] opens the listening socket; failing to do so is the only
//! fatal error the server has. [`Server::run`] then loops on `accept`, wraps
//! each connection in a [`Session`], and hands it to the [`TaskScheduler`]
//! without waiting for it. With `N` workers at most `N` sessions run at once;
//! the rest wait in the scheduler's FIFO queue.
//!
//! A failed `accept` is logged and skipped. The loop ends only when a
//! [`ShutdownHandle`] asks it to, after which queued sessions are drained
//! before [`Server::run`] returns.
//!
//! Each session runs inside a `session{id=…}` span, so everything it logs on
//! its worker, including a panic, carries the session id.
//!
//! Live sessions are tracked in a [`SessionRegistry`] for logging and
//! introspection. It is bookkeeping only: the lock is never held across
//! socket I/O.

use crate::config::{ServerConfig, effective_workers};
use crate::imaging::ImageBackend;
use crate::registry::OperationRegistry;
use crate::scheduler::{SchedulerError, TaskScheduler};
use crate::session::{Session, SessionContext};
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, error, info, info_span};

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("cannot listen on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("worker pool: {0}")]
    Scheduler(#[from] SchedulerError),
}

/// Map of live session ids to peer addresses.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<Mutex<HashMap<u64, SocketAddr>>>,
}

impl SessionRegistry {
    /// Record a session; it is removed again when the guard drops.
    pub fn register(&self, id: u64, peer: SocketAddr) -> SessionGuard {
        self.lock().insert(id, peer);
        SessionGuard {
            registry: self.clone(),
            id,
        }
    }

    pub fn active(&self) -> usize {
        self.lock().len()
    }

    /// Live sessions ordered by id.
    pub fn snapshot(&self) -> Vec<(u64, SocketAddr)> {
        let mut sessions: Vec<_> = self.lock().iter().map(|(id, peer)| (*id, *peer)).collect();
        sessions.sort_unstable_by_key(|(id, _)| *id);
        sessions
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, SocketAddr>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps a session listed in its [`SessionRegistry`] while alive.
#[derive(Debug)]
pub struct SessionGuard {
    registry: SessionRegistry,
    id: u64,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.id);
    }
}

/// Stops a running [`Server`] from another thread.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    stop: Arc<AtomicBool>,
    addr: SocketAddr,
}

impl ShutdownHandle {
    /// Ask the accept loop to stop.
    ///
    /// The loop is parked in `accept`, so this also opens a throwaway
    /// connection to wake it.
    pub fn shutdown(&self) {
        if self.stop.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut wake = self.addr;
        if wake.ip().is_unspecified() {
            wake.set_ip(match wake.ip() {
                IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
                IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::LOCALHOST),
            });
        }
        if let Err(e) = TcpStream::connect(wake) {
            debug!(addr = %wake, error = %e, "wake-up connection failed");
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

pub struct Server<B> {
    listener: TcpListener,
    local_addr: SocketAddr,
    scheduler: TaskScheduler,
    context: SessionContext<B>,
    sessions: SessionRegistry,
    stop: Arc<AtomicBool>,
    next_id: AtomicU64,
}

impl<B: ImageBackend + 'static> Server<B> {
    /// Bind the listening socket and start the worker pool.
    pub fn bind(config: &ServerConfig, backend: B) -> Result<Self, ServerError> {
        let addr = config.listen_address();
        let listener = TcpListener::bind(&addr).map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| ServerError::Bind { addr, source })?;
        let scheduler = TaskScheduler::new(effective_workers(&config.workers))?;

        Ok(Self {
            listener,
            local_addr,
            scheduler,
            context: SessionContext {
                registry: Arc::new(OperationRegistry::standard()),
                backend: Arc::new(backend),
                limits: config.limits(),
            },
            sessions: SessionRegistry::default(),
            stop: Arc::new(AtomicBool::new(false)),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn workers(&self) -> usize {
        self.scheduler.size()
    }

    pub fn sessions(&self) -> SessionRegistry {
        self.sessions.clone()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.active()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            stop: Arc::clone(&self.stop),
            addr: self.local_addr,
        }
    }

    /// Accept connections until shut down, then drain queued sessions.
    pub fn run(self) -> Result<(), ServerError> {
        info!(
            addr = %self.local_addr,
            workers = self.scheduler.size(),
            "listening"
        );

        for incoming in self.listener.incoming() {
            if self.stop.load(Ordering::SeqCst) {
                break;
            }
            match incoming {
                Ok(stream) => self.dispatch(stream)?,
                Err(e) => error!(error = %e, "accept failed"),
            }
        }

        info!(queued = self.scheduler.queued(), "shutting down, draining sessions");
        self.scheduler.shutdown();
        info!("server stopped");
        Ok(())
    }

    fn dispatch(&self, stream: TcpStream) -> Result<(), ServerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let peer = match stream.peer_addr() {
            Ok(peer) => peer,
            Err(e) => {
                error!(session = id, error = %e, "peer address unavailable, dropping connection");
                return Ok(());
            }
        };
        let _span = info_span!("session", id).entered();
        let guard = self.sessions.register(id, peer);
        info!(
            session = id,
            peer = %peer,
            active = self.sessions.active(),
            "client connected"
        );

        let context = self.context.clone();
        self.scheduler.enqueue(move || {
            let _guard = guard;
            Session::new(id, stream).run(&context)
        })?;
        Ok(())
    }
}
