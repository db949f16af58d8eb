//! [`EventThread`]: the dedicated thread that polls the OS readiness
//! backend (via `mio`) and turns readiness notifications into `signal`
//! calls on registered [`EventContext`]s.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use mio::unix::SourceFd;
use mio::{Events, Poll, Token};
use parking_lot::{Mutex, RwLock};

use crate::error::{InitError, InitResult};
use crate::event::context::EventContext;

const EVENTS_CAPACITY: usize = 1024;
const POLL_TIMEOUT: Duration = Duration::from_millis(250);
/// Backoff applied after a non-`Interrupted` `poll()` error, so a sustained
/// failure doesn't spin the event thread in a tight retry loop.
const POLL_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Owns the process's `mio::Poll` instance and the table mapping live
/// tokens back to their [`EventContext`]. Registration is looked up by
/// weak reference: a context dropped without deregistering just stops
/// delivering instead of leaking a strong reference into this table.
pub struct EventThread {
    registry: mio::Registry,
    contexts: RwLock<HashMap<Token, Weak<EventContext>>>,
    stop: Arc<AtomicBool>,
    join: Mutex<Option<thread::JoinHandle<()>>>,
}

impl EventThread {
    /// Creates the backend poller and spawns its dedicated thread.
    pub fn start() -> InitResult<Arc<EventThread>> {
        let poll = Poll::new().map_err(InitError::ReadinessBackend)?;
        let registry = poll
            .registry()
            .try_clone()
            .map_err(InitError::ReadinessBackend)?;

        let stop = Arc::new(AtomicBool::new(false));
        let event_thread = Arc::new(EventThread {
            registry,
            contexts: RwLock::new(HashMap::new()),
            stop,
            join: Mutex::new(None),
        });

        let loop_thread = event_thread.clone();
        let join = thread::Builder::new()
            .name("event-thread".into())
            .spawn(move || run(poll, loop_thread))
            .map_err(|source| InitError::ThreadSpawn {
                role: "event thread",
                source,
            })?;
        *event_thread.join.lock() = Some(join);

        tracing::debug!("event thread started");
        Ok(event_thread)
    }

    /// Registers `ctx` for the readiness interest currently set on it.
    /// Re-registering an already-registered context (to change interest,
    /// e.g. re-arming a level-triggered read after draining a socket) is
    /// done through [`EventThread::reregister`].
    pub fn register(&self, ctx: &Arc<EventContext>) -> io::Result<()> {
        let fd = ctx.fd();
        self.registry
            .register(&mut SourceFd(&fd), ctx.token(), ctx.mio_interest())?;
        ctx.mark_registered(true);
        self.contexts
            .write()
            .insert(ctx.token(), Arc::downgrade(ctx));
        Ok(())
    }

    /// Updates the backend's interest set for an already-registered
    /// context to match its current `set_want_read`/`set_want_write` state.
    pub fn reregister(&self, ctx: &Arc<EventContext>) -> io::Result<()> {
        let fd = ctx.fd();
        self.registry
            .reregister(&mut SourceFd(&fd), ctx.token(), ctx.mio_interest())
    }

    pub fn deregister(&self, ctx: &Arc<EventContext>) -> io::Result<()> {
        let fd = ctx.fd();
        self.registry.deregister(&mut SourceFd(&fd))?;
        ctx.mark_registered(false);
        self.contexts.write().remove(&ctx.token());
        Ok(())
    }

    /// Asks the poll loop to exit. Does not join it; call this before
    /// dropping the last handle if an orderly shutdown matters.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }
}

fn run(mut poll: Poll, event_thread: Arc<EventThread>) {
    let mut events = Events::with_capacity(EVENTS_CAPACITY);

    loop {
        if event_thread.stop.load(Ordering::Acquire) {
            break;
        }

        match poll.poll(&mut events, Some(POLL_TIMEOUT)) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                // Not a condition this thread panics over: nothing past
                // initialization is fatal from the scheduler's point of
                // view (see the crate's error-tier model), so a sustained
                // non-interrupted poll failure is logged and retried after
                // a short backoff rather than escalated to `error!`.
                tracing::warn!(error = %e, "event thread poll failed, retrying");
                thread::sleep(POLL_ERROR_BACKOFF);
                continue;
            }
        }

        for event in events.iter() {
            let ctx = {
                let table = event_thread.contexts.read();
                table.get(&event.token()).and_then(Weak::upgrade)
            };
            let Some(ctx) = ctx else { continue };
            ctx.deliver(event.is_readable(), event.is_writable());

            // Level-triggered registration is one-shot: the task must call
            // `request_event` again from `run()` to keep receiving
            // notifications. Edge-triggered registration persists.
            if !ctx.is_edge_triggered() {
                if let Err(e) = event_thread.deregister(&ctx) {
                    tracing::warn!(error = %e, "failed to deregister one-shot context");
                }
            }
        }
    }

    tracing::debug!("event thread exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::context::EventContext;
    use crate::task::core::{Task, TaskBody, READ};
    use crate::task::pool::TaskThreadPool;
    use std::io::Write;
    use std::os::unix::io::AsRawFd;
    use std::os::unix::net::UnixStream;
    use std::sync::atomic::AtomicBool;

    struct SawRead(Arc<AtomicBool>);
    impl TaskBody for SawRead {
        fn run(&self, task: &Task) -> i64 {
            if task.get_events() & READ != 0 {
                self.0.store(true, Ordering::SeqCst);
            }
            0
        }
    }

    #[test]
    fn level_triggered_fd_readiness_signals_task_and_rearms_one_shot() {
        let pool = TaskThreadPool::add_threads(1, 1).unwrap();
        let events = EventThread::start().unwrap();

        let (mut writer, reader) = UnixStream::pair().unwrap();
        let fd = reader.as_raw_fd();

        let saw_read = Arc::new(AtomicBool::new(false));
        let task = Task::new(pool.clone(), SawRead(saw_read.clone()));
        let ctx = EventContext::new(fd, task, false);
        ctx.request_event(&events, READ).unwrap();

        writer.write_all(b"x").unwrap();
        std::thread::sleep(Duration::from_millis(200));

        assert!(saw_read.load(Ordering::SeqCst));
        // One-shot: the context was deregistered after firing.
        assert!(!ctx.is_registered());

        events.stop();
        pool.remove_threads();
    }
}
