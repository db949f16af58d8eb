//! [`Task`]: the latched-event-mask scheduling unit, and the [`TaskBody`]
//! customization point applications implement.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::intrusive::{HeapItem, HeapNode};
use crate::task::pool::{TaskThreadPool, WorkerClass, WorkerId};
use crate::task::thread;

/// A bitmask of events a [`Task`] can be signaled with.
pub type EventMask = u32;

pub const KILL: EventMask = 1 << 0;
pub const IDLE: EventMask = 1 << 1;
pub const START: EventMask = 1 << 2;
pub const TIMEOUT: EventMask = 1 << 3;
pub const READ: EventMask = 1 << 4;
pub const WRITE: EventMask = 1 << 5;
pub const UPDATE: EventMask = 1 << 6;

/// The high bit of the event word: set exactly while the task is linked
/// into some worker's event queue (including while `run()` is executing).
const ALIVE: EventMask = 1 << 31;
const EVENT_MASK: EventMask = !ALIVE;

const MAX_NAME_LEN: usize = 47;

/// The customization point a task implements: its scheduled work.
///
/// `run` must call [`Task::get_events`] at least once before returning —
/// otherwise the worker invokes `run` again immediately, since the event
/// word is still non-zero while `ALIVE` remains set. The return value
/// tells the worker what to do next:
///
/// - `0`: quiescent; wait for the next `signal`.
/// - `d > 0`: re-invoke after `d` ms, with [`TIMEOUT`] added to the event
///   mask for that invocation.
/// - a negative value: delete this task.
pub trait TaskBody: Send + Sync {
    fn run(&self, task: &Task) -> i64;
}

/// A schedulable unit of work: a latched event mask plus thread-affinity
/// state, driven by a [`TaskBody`].
///
/// A task's `run()` is invoked by exactly one [`crate::task::thread::TaskThread`]
/// at a time; two invocations never overlap (see the crate's concurrency
/// model). Tasks are always held behind `Arc`, since they are shared
/// between the application, the worker that currently owns them, and
/// (transiently) whichever queue or timer heap they're linked into.
pub struct Task {
    events: AtomicU32,
    use_this_thread: Mutex<Option<WorkerId>>,
    default_thread: Mutex<Option<WorkerId>>,
    write_lock: AtomicBool,
    picker_class: Mutex<WorkerClass>,
    timer_node: HeapNode,
    name: Mutex<String>,
    in_run_count: AtomicU64,
    pool: Arc<TaskThreadPool>,
    body: Box<dyn TaskBody>,
}

impl HeapItem for Arc<Task> {
    fn heap_node(&self) -> &HeapNode {
        &self.timer_node
    }
}

impl Task {
    /// Creates a new, unlinked, dead task. It becomes live on its first
    /// `signal`.
    pub fn new(pool: Arc<TaskThreadPool>, body: impl TaskBody + 'static) -> Arc<Task> {
        Arc::new(Task {
            events: AtomicU32::new(0),
            use_this_thread: Mutex::new(None),
            default_thread: Mutex::new(None),
            write_lock: AtomicBool::new(false),
            picker_class: Mutex::new(WorkerClass::Short),
            timer_node: HeapNode::new(),
            name: Mutex::new(String::new()),
            in_run_count: AtomicU64::new(0),
            pool,
            body: Box::new(body),
        })
    }

    pub(crate) fn timer_node(&self) -> &HeapNode {
        &self.timer_node
    }

    /// Sends `mask` to this task. If the task was not already alive (linked
    /// into some worker's event queue), it is enqueued onto exactly one
    /// worker now: the pinned worker if set, else the default worker if
    /// set, else the next worker from this task's class picker.
    ///
    /// If the task *was* already alive, the bits are merged into the event
    /// word and no enqueue happens — the owning worker will observe the
    /// new bits when it next tries to clear `ALIVE` (see
    /// [`crate::task::thread::run_task`]) and re-enqueue itself. This is
    /// the coalescing property: two signals on an alive task never produce
    /// two dispatches.
    pub fn signal(self: &Arc<Task>, mask: EventMask) {
        let prev = self.events.fetch_or(mask | ALIVE, Ordering::AcqRel);
        if prev & ALIVE == 0 {
            self.enqueue_onto_chosen_worker();
        }
    }

    fn enqueue_onto_chosen_worker(self: &Arc<Task>) {
        let worker_id = self
            .use_this_thread
            .lock()
            .or(*self.default_thread.lock())
            .unwrap_or_else(|| self.pool.pick(*self.picker_class.lock()));

        self.pool.worker(worker_id).queue.enqueue(self.clone());
    }

    /// Reads and atomically clears all non-`ALIVE` bits of the event word.
    /// Must only be called from within this task's own `run()`.
    pub fn get_events(&self) -> EventMask {
        let prev = self.events.fetch_and(ALIVE, Ordering::AcqRel);
        prev & EVENT_MASK
    }

    /// Pins this task to the worker currently executing its `run()`, for
    /// exactly the next invocation. No-op (but logged) if called outside a
    /// `run()`.
    pub fn force_same_thread(&self) {
        match thread::current_worker() {
            Some(id) => *self.use_this_thread.lock() = Some(id),
            None => tracing::warn!("force_same_thread called outside of run()"),
        }
    }

    /// Equivalent to [`Task::force_same_thread`] plus latching
    /// [`Task::write_lock`], so the *next* invocation after this one also
    /// stays pinned. Returns the minimum re-invocation delay (10 ms) a
    /// `run()` body should return alongside taking this lock.
    pub fn call_locked(&self) -> i64 {
        self.force_same_thread();
        self.write_lock.store(true, Ordering::Release);
        10
    }

    pub(crate) fn write_lock(&self) -> bool {
        self.write_lock.load(Ordering::Acquire)
    }

    /// Sets the worker this task defaults to when neither `use_this_thread`
    /// nor a picker choice is in play.
    pub fn set_default_thread(&self, worker: Option<WorkerId>) {
        *self.default_thread.lock() = worker;
    }

    /// Chooses which round-robin picker a freshly dispatched (unpinned)
    /// task is assigned through.
    pub fn set_worker_class(&self, class: WorkerClass) {
        *self.picker_class.lock() = class;
    }

    /// Copies up to 47 bytes of `name` in for debugging purposes.
    pub fn set_task_name(&self, name: &str) {
        let mut end = name.len().min(MAX_NAME_LEN);
        while end > 0 && !name.is_char_boundary(end) {
            end -= 1;
        }
        *self.name.lock() = name[..end].to_string();
    }

    pub fn task_name(&self) -> String {
        self.name.lock().clone()
    }

    /// Number of times `run()` has been invoked on this task so far.
    pub fn in_run_count(&self) -> u64 {
        self.in_run_count.load(Ordering::Relaxed)
    }

    pub(crate) fn invoke_run(&self) -> i64 {
        self.in_run_count.fetch_add(1, Ordering::Relaxed);
        let span = tracing::trace_span!("task_run", name = %self.task_name());
        let _enter = span.enter();
        self.body.run(self)
    }

    pub(crate) fn clear_use_this_thread(&self) {
        *self.use_this_thread.lock() = None;
    }

    /// Attempts to transition the event word from exactly `ALIVE` (no
    /// pending bits) to `0`, marking the task dead. Fails — returning
    /// `false` — if a `signal` raced in new bits after the last
    /// `get_events`, in which case the caller must invoke `run()` again
    /// rather than losing those bits.
    pub(crate) fn try_clear_alive(self: &Arc<Task>) -> bool {
        self.events
            .compare_exchange(ALIVE, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Noop;
    impl TaskBody for Noop {
        fn run(&self, task: &Task) -> i64 {
            task.get_events();
            0
        }
    }

    #[test]
    fn name_is_truncated_to_47_bytes() {
        let pool = TaskThreadPool::add_threads(1, 1).unwrap();
        let task = Task::new(pool.clone(), Noop);
        let long = "x".repeat(100);
        task.set_task_name(&long);
        assert_eq!(task.task_name().len(), 47);
        pool.remove_threads();
    }

    #[test]
    fn get_events_clears_bits_but_keeps_alive() {
        let pool = TaskThreadPool::add_threads(1, 1).unwrap();
        let task = Task::new(pool.clone(), Noop);
        task.signal(READ);
        // Don't let the worker race us: just check the bitmask semantics
        // directly through get_events, which is what run() would do.
        let seen = task.get_events();
        assert_eq!(seen & READ, READ);
        assert_eq!(task.get_events(), 0);
        pool.remove_threads();
    }
}
