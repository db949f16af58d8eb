//! [`TimeoutTask`]: a refresh-on-activity timeout built on top of
//! [`IdleTask`], for long-lived connections that want to stay alive as long
//! as *something* touches them periodically.
//!
//! Unlike a plain [`IdleTask`], which fires once per `set_idle_timer` call,
//! a `TimeoutTask` rearms itself every time its idle timer fires, checking
//! whether activity has been seen since the last firing. Only once a full
//! `duration` has elapsed with no [`TimeoutTask::refresh_timeout`] call does
//! it deliver [`crate::task::core::TIMEOUT`] to the consumer task.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::idle::task::IdleTask;
use crate::task::core::{Task, TaskBody, TIMEOUT};
use crate::task::pool::TaskThreadPool;
use crate::time;

struct Shared {
    last_activity_ms: AtomicI64,
    duration_ms: AtomicI64,
    consumer: Arc<Task>,
    idle: Mutex<Option<Weak<IdleTask>>>,
}

struct TimeoutBody(Arc<Shared>);

impl TaskBody for TimeoutBody {
    fn run(&self, task: &Task) -> i64 {
        task.get_events();

        let elapsed = time::now_ms() - self.0.last_activity_ms.load(Ordering::Acquire);
        let duration = self.0.duration_ms.load(Ordering::Acquire);

        if elapsed >= duration {
            self.0.consumer.signal(TIMEOUT);
        } else if let Some(idle) = self.0.idle.lock().as_ref().and_then(Weak::upgrade) {
            // Activity was refreshed since this timer was armed: not
            // enough idle time has actually passed, so rearm for whatever
            // remains of the duration instead of firing early.
            idle.set_idle_timer(duration - elapsed);
        }
        0
    }
}

/// A timeout that resets every time [`TimeoutTask::refresh_timeout`] is
/// called, delivering [`TIMEOUT`] to a designated consumer task once
/// `duration_ms` elapses with no refresh.
pub struct TimeoutTask {
    idle: Arc<IdleTask>,
    shared: Arc<Shared>,
}

impl TimeoutTask {
    /// Starts a timeout of `duration_ms`, signaling `consumer` with
    /// [`TIMEOUT`] if `duration_ms` passes without a
    /// [`TimeoutTask::refresh_timeout`] call. Runs its own bookkeeping task
    /// on `pool`'s short-task class.
    pub fn new(pool: Arc<TaskThreadPool>, consumer: Arc<Task>, duration_ms: i64) -> Arc<TimeoutTask> {
        let shared = Arc::new(Shared {
            last_activity_ms: AtomicI64::new(time::now_ms()),
            duration_ms: AtomicI64::new(duration_ms),
            consumer,
            idle: Mutex::new(None),
        });

        let task = Task::new(pool, TimeoutBody(shared.clone()));
        task.set_task_name("timeout-task");
        let idle = IdleTask::new(task);
        *shared.idle.lock() = Some(Arc::downgrade(&idle));
        idle.set_idle_timer(duration_ms);

        Arc::new(TimeoutTask { idle, shared })
    }

    /// Marks activity now, postponing the timeout. Takes effect the next
    /// time the idle timer fires and recomputes the elapsed time; no
    /// immediate rearm is needed.
    pub fn refresh_timeout(&self) {
        self.shared
            .last_activity_ms
            .store(time::now_ms(), Ordering::Release);
    }

    /// Changes the duration used for future expiry checks.
    pub fn set_timeout_duration(&self, duration_ms: i64) {
        self.shared.duration_ms.store(duration_ms, Ordering::Release);
    }

    /// Cancels the underlying idle timer. A no-op if it already fired.
    pub fn cancel_timeout(&self) {
        self.idle.cancel_timeout();
    }

    pub fn task(&self) -> &Arc<Task> {
        self.idle.task()
    }
}
