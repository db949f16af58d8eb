//! The worker main loop: pulls tasks off a [`BlockingQueue`], runs them, and
//! owns a per-thread local timer [`Heap`] for tasks that asked to be
//! re-invoked after a delay.
//!
//! Each worker's timer heap is unsynchronized — it is only ever touched by
//! the thread that owns it, unlike the shared heap behind
//! [`crate::idle::dispatcher`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::intrusive::{BlockingQueue, Heap, UpdateHint};
use crate::task::core::{Task, IDLE};
use crate::task::pool::WorkerId;
use crate::time;

/// Upper bound on how long a worker blocks waiting for its queue before
/// re-checking the shutdown flag and any due timers. Keeps shutdown latency
/// bounded even when nothing has been scheduled.
const SHUTDOWN_POLL_MS: u64 = 250;

thread_local! {
    static CURRENT_WORKER: std::cell::Cell<Option<WorkerId>> = const { std::cell::Cell::new(None) };
}

/// The [`WorkerId`] of the worker executing on the calling OS thread, if
/// any. Used by [`Task::force_same_thread`].
pub(crate) fn current_worker() -> Option<WorkerId> {
    CURRENT_WORKER.with(|cell| cell.get())
}

pub(crate) fn run_worker(id: WorkerId, queue: Arc<BlockingQueue<Arc<Task>>>, stop: Arc<AtomicBool>) {
    CURRENT_WORKER.with(|cell| cell.set(Some(id)));
    let mut timers: Heap<Arc<Task>> = Heap::new();

    loop {
        if stop.load(Ordering::Acquire) && queue.is_empty() {
            break;
        }

        match queue.dequeue_blocking(next_wait(&timers)) {
            Some(task) => {
                // The task may already be sitting in this worker's local
                // timer heap from an earlier `d > 0` return. If it arrived
                // here via an external signal before that timer fired,
                // cancel the stale heap entry so the timer doesn't also
                // fire later for a run that already happened — one
                // coalesced run instead of two.
                if timers.contains(&task) {
                    timers.remove(&task);
                }
                run_task(&task, &mut timers)
            }
            None => fire_due_timers(&mut timers),
        }
    }

    tracing::debug!(?id, "worker thread exiting");
}

/// How long to block on the queue: until the next due timer, capped at
/// [`SHUTDOWN_POLL_MS`] so shutdown and newly-armed timers are both
/// noticed promptly.
fn next_wait(timers: &Heap<Arc<Task>>) -> Duration {
    let cap = SHUTDOWN_POLL_MS;
    let ms = match timers.peek_min() {
        Some(task) => {
            let deadline = task.timer_node().value();
            let remaining = deadline.saturating_sub(time::now_ms()).max(0) as u64;
            remaining.min(cap)
        }
        None => cap,
    };
    Duration::from_millis(ms)
}

fn fire_due_timers(timers: &mut Heap<Arc<Task>>) {
    let now = time::now_ms();
    loop {
        match timers.peek_min() {
            Some(task) if task.timer_node().value() <= now => {
                let task = timers.extract_min().expect("peeked non-empty heap");
                task.signal(IDLE);
            }
            _ => break,
        }
    }
}

/// Runs `task` to completion, including the no-lost-signal retry loop: if a
/// `signal` races in new event bits while `run()` is executing, this
/// invokes `run()` again rather than letting the task go quiescent with
/// unseen events.
fn run_task(task: &Arc<Task>, timers: &mut Heap<Arc<Task>>) {
    loop {
        let delay = task.invoke_run();

        if delay < 0 {
            if timers.contains(task) {
                timers.remove(task);
            }
            task.clear_use_this_thread();
            return;
        }

        if delay > 0 {
            let deadline = time::deadline_ms(delay);
            if timers.contains(task) {
                timers.update(task, deadline, UpdateHint::None);
            } else {
                timers.insert(task.clone(), deadline);
            }
        }

        if task.try_clear_alive() {
            return;
        }
        // New bits arrived after `get_events` during this run: loop and
        // invoke `run()` again instead of re-enqueueing onto a queue,
        // since this thread already owns the task.
    }
}
