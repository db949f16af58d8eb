//! [`TaskThreadPool`]: the fixed vector of worker threads, partitioned into
//! a short-task class and a blocking class, each with its own round-robin
//! picker.
//!
//! Resizing after [`TaskThreadPool::add_threads`] is not supported (see the
//! crate's Non-goals); the pool exists to be built once by a
//! [`crate::builder::Builder`] and torn down once via
//! [`TaskThreadPool::remove_threads`].

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::error::{InitError, InitResult};
use crate::intrusive::BlockingQueue;
use crate::task::core::Task;
use crate::task::thread;

/// Which of the two worker classes a task should run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerClass {
    /// Workers reserved for quick, non-blocking `run()` bodies.
    Short,
    /// Workers where a `run()` body is allowed to block or do long I/O.
    Blocking,
}

/// Identifies one worker thread within a [`TaskThreadPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerId {
    pub class: WorkerClass,
    pub index: usize,
}

/// The state a worker thread is reached through from outside that thread:
/// its event queue, and the flag used to ask it to stop.
pub(crate) struct WorkerHandle {
    pub(crate) id: WorkerId,
    pub(crate) queue: Arc<BlockingQueue<Arc<Task>>>,
    pub(crate) stop: Arc<AtomicBool>,
}

/// A fixed pool of worker threads split into a short-task class and a
/// blocking class.
pub struct TaskThreadPool {
    short: Vec<Arc<WorkerHandle>>,
    blocking: Vec<Arc<WorkerHandle>>,
    short_picker: AtomicUsize,
    blocking_picker: AtomicUsize,
    joins: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskThreadPool {
    /// Spawns `num_short_task_threads` short-task workers and
    /// `num_blocking_task_threads` blocking workers. Both counts are
    /// normalized to at least 1: the core never runs with zero workers in
    /// a class that exists (see `Builder`).
    pub fn add_threads(
        num_short_task_threads: usize,
        num_blocking_task_threads: usize,
    ) -> InitResult<Arc<TaskThreadPool>> {
        let num_short = num_short_task_threads.max(1);
        let num_blocking = num_blocking_task_threads.max(1);

        let mut short = Vec::with_capacity(num_short);
        let mut blocking = Vec::with_capacity(num_blocking);
        let mut joins = Vec::with_capacity(num_short + num_blocking);

        for index in 0..num_short {
            let id = WorkerId {
                class: WorkerClass::Short,
                index,
            };
            let (handle, join) = spawn_worker(id)?;
            short.push(handle);
            joins.push(join);
        }
        for index in 0..num_blocking {
            let id = WorkerId {
                class: WorkerClass::Blocking,
                index,
            };
            let (handle, join) = spawn_worker(id)?;
            blocking.push(handle);
            joins.push(join);
        }

        tracing::debug!(num_short, num_blocking, "task thread pool started");

        Ok(Arc::new(TaskThreadPool {
            short,
            blocking,
            short_picker: AtomicUsize::new(0),
            blocking_picker: AtomicUsize::new(0),
            joins: Mutex::new(joins),
        }))
    }

    pub fn num_short_task_threads(&self) -> usize {
        self.short.len()
    }

    pub fn num_blocking_task_threads(&self) -> usize {
        self.blocking.len()
    }

    /// Signals every worker to stop, then waits for all of them to exit.
    /// Any tasks left in a worker's local queue or timer heap at that point
    /// are simply dropped.
    pub fn remove_threads(&self) {
        for worker in self.short.iter().chain(self.blocking.iter()) {
            worker.stop.store(true, Ordering::Release);
        }
        let mut joins = self.joins.lock();
        for join in joins.drain(..) {
            let _ = join.join();
        }
        tracing::debug!("task thread pool stopped");
    }

    pub(crate) fn worker(&self, id: WorkerId) -> &Arc<WorkerHandle> {
        match id.class {
            WorkerClass::Short => &self.short[id.index],
            WorkerClass::Blocking => &self.blocking[id.index],
        }
    }

    /// Picks the next worker of `class` via that class's independent
    /// round-robin counter.
    pub(crate) fn pick(&self, class: WorkerClass) -> WorkerId {
        let (picker, len) = match class {
            WorkerClass::Short => (&self.short_picker, self.short.len()),
            WorkerClass::Blocking => (&self.blocking_picker, self.blocking.len()),
        };
        let index = picker.fetch_add(1, Ordering::Relaxed) % len;
        WorkerId { class, index }
    }
}

fn spawn_worker(id: WorkerId) -> InitResult<(Arc<WorkerHandle>, JoinHandle<()>)> {
    let queue = Arc::new(BlockingQueue::new());
    let stop = Arc::new(AtomicBool::new(false));

    let thread_queue = queue.clone();
    let thread_stop = stop.clone();
    let join = std::thread::Builder::new()
        .name(format!("{:?}-worker-{}", id.class, id.index))
        .spawn(move || thread::run_worker(id, thread_queue, thread_stop))
        .map_err(|source| InitError::ThreadSpawn {
            role: "task thread",
            source,
        })?;

    Ok((
        Arc::new(WorkerHandle { id, queue, stop }),
        join,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picker_round_robins_independently_per_class() {
        let pool = TaskThreadPool::add_threads(3, 2).unwrap();

        let picks: Vec<_> = (0..6).map(|_| pool.pick(WorkerClass::Short).index).collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);

        let picks: Vec<_> = (0..4)
            .map(|_| pool.pick(WorkerClass::Blocking).index)
            .collect();
        assert_eq!(picks, vec![0, 1, 0, 1]);

        pool.remove_threads();
    }

    #[test]
    fn zero_is_normalized_to_one_worker() {
        let pool = TaskThreadPool::add_threads(0, 0).unwrap();
        assert_eq!(pool.num_short_task_threads(), 1);
        assert_eq!(pool.num_blocking_task_threads(), 1);
        pool.remove_threads();
    }
}
