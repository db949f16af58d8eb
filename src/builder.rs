//! [`Builder`]: assembles a [`Scheduler`] from a worker-thread pool and an
//! event thread, mirroring the fluent builder pattern common to async
//! runtime setup in this crate's reference stack.

use std::sync::Arc;

use crate::error::InitResult;
use crate::event::EventThread;
use crate::task::pool::TaskThreadPool;

/// Configures and builds a [`Scheduler`].
///
/// The short-task count defaults to the number of logical CPUs (via
/// `num_cpus`); the blocking count defaults to 1. Either can be overridden
/// below; each class is clamped to at least 1 worker regardless of what's
/// configured here.
pub struct Builder {
    short_task_threads: usize,
    blocking_threads: usize,
}

impl Builder {
    pub fn new_multi_thread() -> Builder {
        Builder {
            short_task_threads: num_cpus::get(),
            blocking_threads: 1,
        }
    }

    /// Sets the number of workers dedicated to short, non-blocking tasks.
    pub fn short_task_threads(mut self, n: usize) -> Self {
        self.short_task_threads = n;
        self
    }

    /// Sets the number of workers allowed to run blocking task bodies.
    pub fn blocking_threads(mut self, n: usize) -> Self {
        self.blocking_threads = n;
        self
    }

    /// Spawns the worker pool, the event thread, and returns the assembled
    /// [`Scheduler`]. The shared idle dispatcher is started lazily on its
    /// own first use rather than here.
    pub fn build(self) -> InitResult<Scheduler> {
        let pool = TaskThreadPool::add_threads(self.short_task_threads, self.blocking_threads)?;
        let events = EventThread::start()?;
        Ok(Scheduler { pool, events })
    }
}

/// A running scheduler: the worker pool plus the event thread that feeds it
/// readiness signals. The shared idle dispatcher is process-wide and
/// reached through [`crate::idle::IdleDispatcher::global`] rather than
/// through this handle.
pub struct Scheduler {
    pool: Arc<TaskThreadPool>,
    events: Arc<EventThread>,
}

impl Scheduler {
    pub fn pool(&self) -> &Arc<TaskThreadPool> {
        &self.pool
    }

    pub fn events(&self) -> &Arc<EventThread> {
        &self.events
    }

    /// Stops the event thread and tears down the worker pool. Tasks still
    /// queued or linked into a worker's local timer heap at that point are
    /// dropped, same as `TaskThreadPool::remove_threads`.
    pub fn shutdown(&self) {
        self.events.stop();
        self.pool.remove_threads();
    }
}
