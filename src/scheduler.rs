//! Bounded worker pool with a FIFO task queue.
//!
//! [`TaskScheduler::new`] starts exactly `n` long-lived worker threads. Each
//! worker blocks on the shared queue, takes the oldest task, runs it to
//! completion, and goes back for the next one. There is no priority and no
//! work stealing: tasks leave the queue in the order they were enqueued,
//! though two tasks picked up by different workers may finish in any order.
//!
//! ## Completion and failure
//!
//! [`TaskScheduler::enqueue`] returns a [`TaskHandle`] that yields the task's
//! return value. A task that panics does not take its worker down: the panic
//! is caught, logged at `error`, and reported through the handle as
//! [`TaskError::Panicked`]. Dropping the handle is fine; the task still runs
//! and a panic is still logged.
//!
//! Tasks run inside the `tracing` span that was current when they were
//! enqueued, and workers log to the dispatcher that was current when the
//! pool was built.
//!
//! ## Shutdown
//!
//! [`TaskScheduler::shutdown`] closes the queue to new work, lets the workers
//! drain everything already queued, and joins them. It is a graceful drain,
//! not a cancellation. Dropping the scheduler does the same.
//!
//! ## Queue bound
//!
//! The queue itself is unbounded. Only the worker count limits concurrency;
//! under sustained load the backlog (and its memory) grows.

use crossbeam_channel::{Receiver, Sender};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::dispatcher::{self, Dispatch};
use tracing::{Span, error, trace, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("a worker pool needs at least one worker")]
    NoWorkers,
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("scheduler is shutting down")]
    ShuttingDown,
}

/// Why a task produced no value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task panicked: {0}")]
    Panicked(String),
    #[error("task was dropped before it ran")]
    Lost,
}

/// Awaitable result of an enqueued task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    result: Receiver<Result<T, TaskError>>,
}

impl<T> TaskHandle<T> {
    /// Block until the task has run and return its outcome.
    pub fn wait(self) -> Result<T, TaskError> {
        self.result.recv().unwrap_or(Err(TaskError::Lost))
    }
}

/// Fixed-size pool of worker threads fed from one FIFO queue.
pub struct TaskScheduler {
    queue: Mutex<Option<Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl TaskScheduler {
    /// Start `size` workers.
    pub fn new(size: usize) -> Result<Self, SchedulerError> {
        if size == 0 {
            return Err(SchedulerError::NoWorkers);
        }
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let dispatch = dispatcher::get_default(Dispatch::clone);

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let rx = rx.clone();
            let dispatch = dispatch.clone();
            let spawned = thread::Builder::new()
                .name(format!("imgrelay-worker-{id}"))
                .spawn(move || dispatcher::with_default(&dispatch, || worker_loop(id, rx)));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    drop(tx);
                    for handle in workers {
                        let _ = handle.join();
                    }
                    return Err(SchedulerError::Spawn(e));
                }
            }
        }

        Ok(Self {
            queue: Mutex::new(Some(tx)),
            workers: Mutex::new(workers),
            size,
        })
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of tasks waiting for a worker.
    pub fn queued(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, |tx| tx.len())
    }

    /// Append a task to the queue and wake one idle worker.
    pub fn enqueue<F, T>(&self, task: F) -> Result<TaskHandle<T>, SchedulerError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let span = Span::current();
        let job: Job = Box::new(move || {
            let _entered = span.enter();
            let outcome = panic::catch_unwind(AssertUnwindSafe(task))
                .map_err(|payload| TaskError::Panicked(panic_message(&*payload)));
            if let Err(TaskError::Panicked(message)) = &outcome {
                error!(panic = %message, "task panicked");
            }
            // Nobody waiting is fine.
            let _ = done_tx.send(outcome);
        });

        let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = queue.as_ref().ok_or(SchedulerError::ShuttingDown)?;
        tx.send(job).map_err(|_| SchedulerError::ShuttingDown)?;
        Ok(TaskHandle { result: done_rx })
    }

    /// Refuse new tasks, run everything already queued, and join all workers.
    ///
    /// Safe to call more than once; later calls return immediately.
    pub fn shutdown(&self) {
        // Dropping the last sender lets workers drain and then see disconnect.
        drop(
            self.queue
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let workers = std::mem::take(
            &mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for handle in workers {
            if handle.join().is_err() {
                warn!("worker thread exited abnormally");
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(id: usize, rx: Receiver<Job>) {
    trace!(worker = id, "worker started");
    // recv() keeps returning queued jobs after the sender is gone and only
    // errors once the queue is both closed and empty.
    while let Ok(job) = rx.recv() {
        job();
    }
    trace!(worker = id, "worker exiting");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
