//! The process-wide idle dispatcher: a single dedicated thread and a shared
//! min-heap, guarded by a mutex and condition variable rather than owned
//! unsynchronized the way a [`crate::task::thread`] worker owns its local
//! timer heap.
//!
//! This is the one place in the crate where a single background thread
//! serves every [`IdleTask`] in the process, regardless of which worker
//! class or pool the underlying task belongs to.

use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::idle::task::IdleTask;
use crate::intrusive::{Heap, UpdateHint};
use crate::time;

struct Inner {
    heap: Mutex<Heap<Arc<IdleTask>>>,
    condvar: Condvar,
}

/// Handle to the process-wide idle-dispatcher thread and its shared heap.
pub struct IdleDispatcher {
    inner: Arc<Inner>,
}

static GLOBAL: OnceLock<IdleDispatcher> = OnceLock::new();

impl IdleDispatcher {
    /// Returns the process-wide dispatcher, spawning its background thread
    /// the first time this is called.
    pub fn global() -> &'static IdleDispatcher {
        GLOBAL.get_or_init(|| {
            let inner = Arc::new(Inner {
                heap: Mutex::new(Heap::new()),
                condvar: Condvar::new(),
            });
            let thread_inner = inner.clone();
            thread::Builder::new()
                .name("idle-dispatcher".into())
                .spawn(move || run(thread_inner))
                .expect("failed to spawn idle dispatcher thread");
            IdleDispatcher { inner }
        })
    }

    /// Brings up the process-wide dispatcher. A second call after the first
    /// is a no-op, same as any other lifecycle entry point in this crate.
    pub fn initialize() -> &'static IdleDispatcher {
        Self::global()
    }

    /// No-op: the dispatcher's background thread and shared heap live for
    /// the process's lifetime once started, kept for symmetry with
    /// `initialize`.
    pub fn release() {}

    pub(crate) fn arm(&self, idle: Arc<IdleTask>, deadline_ms: i64) {
        let mut heap = self.inner.heap.lock();
        if heap.contains(&idle) {
            // The re-arm case covered by the crate's own update-hint
            // resolution: a later `set_idle_timer` call often *increases*
            // the deadline relative to a pending one, even though we pass
            // `ExpectUp` here. `Heap::update` restores heap order
            // correctly either way.
            heap.update(&idle, deadline_ms, UpdateHint::ExpectUp);
        } else {
            heap.insert(idle, deadline_ms);
        }
        drop(heap);
        self.inner.condvar.notify_one();
    }

    pub(crate) fn disarm(&self, idle: &Arc<IdleTask>) {
        let mut heap = self.inner.heap.lock();
        if heap.contains(idle) {
            heap.remove(idle);
        }
    }
}

fn run(inner: Arc<Inner>) {
    loop {
        let mut heap = inner.heap.lock();

        match heap.peek_min() {
            Some(idle) => {
                let remaining = (idle.deadline() - time::now_ms()).max(0) as u64;
                let _ = inner.condvar.wait_for(&mut heap, Duration::from_millis(remaining));
            }
            None => {
                inner.condvar.wait(&mut heap);
            }
        }

        let now = time::now_ms();
        let mut due = Vec::new();
        while let Some(idle) = heap.peek_min() {
            if idle.deadline() > now {
                break;
            }
            due.push(heap.extract_min().expect("peeked non-empty heap"));
        }
        drop(heap);

        for idle in due {
            idle.fire();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::core::{Task, TaskBody, IDLE};
    use crate::task::pool::TaskThreadPool;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct SawIdle(Arc<AtomicBool>);
    impl TaskBody for SawIdle {
        fn run(&self, task: &Task) -> i64 {
            if task.get_events() & IDLE != 0 {
                self.0.store(true, Ordering::SeqCst);
            }
            0
        }
    }

    #[test]
    fn s4_idle_timer_fires_and_delivers_idle_event() {
        let pool = TaskThreadPool::add_threads(1, 1).unwrap();
        let flag = Arc::new(AtomicBool::new(false));
        let task = Task::new(pool.clone(), SawIdle(flag.clone()));
        let idle = IdleTask::new(task);

        idle.set_idle_timer(20);
        std::thread::sleep(Duration::from_millis(150));

        assert!(flag.load(Ordering::SeqCst));
        pool.remove_threads();
    }

    #[test]
    fn cancel_before_fire_suppresses_delivery() {
        let pool = TaskThreadPool::add_threads(1, 1).unwrap();
        let flag = Arc::new(AtomicBool::new(false));
        let task = Task::new(pool.clone(), SawIdle(flag.clone()));
        let idle = IdleTask::new(task);

        idle.set_idle_timer(200);
        idle.cancel_timeout();
        std::thread::sleep(Duration::from_millis(300));

        assert!(!flag.load(Ordering::SeqCst));
        pool.remove_threads();
    }
}
