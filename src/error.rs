//! Error types surfaced by lifecycle operations.
//!
//! Everything past initialization is infallible from the scheduler's point
//! of view (see the crate-level docs): the only `Result`-returning surface
//! is starting up the thread pool, the event thread, and the idle
//! dispatcher. Programmer errors (double-linking a node, destroying a task
//! still linked into a queue or heap) are bugs, not recoverable conditions,
//! and are raised as panics instead.

use std::io;

/// Failure to bring up a piece of the scheduler's runtime machinery.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    /// The OS refused to spawn a worker, event, or idle-dispatcher thread.
    #[error("failed to spawn {role} thread: {source}")]
    ThreadSpawn {
        role: &'static str,
        #[source]
        source: io::Error,
    },

    /// The readiness backend (epoll/kqueue/IOCP, via `mio`) could not be
    /// created.
    #[error("failed to create readiness backend: {0}")]
    ReadinessBackend(#[source] io::Error),
}

pub type InitResult<T> = Result<T, InitError>;
