//! [`EventContext`]: one registered file descriptor's readiness state,
//! bound to the [`Task`] it wakes.

use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;

use mio::Token;

use crate::event::thread::EventThread;
use crate::task::core::{EventMask, Task, READ, WRITE};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

const WANT_READ: u8 = 1 << 0;
const WANT_WRITE: u8 = 1 << 1;

/// A registered `fd`'s readiness state and the task it signals.
///
/// Contexts are identified to the OS poller by a process-wide unique id
/// rather than by the raw fd number: fds are recycled by the OS as soon as
/// they're closed, so keying registration bookkeeping on the fd itself
/// would let a stale event meant for a closed fd get delivered to whatever
/// new fd the OS handed out with the same number. Keying on `id` instead
/// means a stale [`mio::Token`] simply fails to resolve to a live context.
pub struct EventContext {
    id: u64,
    fd: RawFd,
    task: Arc<Task>,
    edge_triggered: AtomicBool,
    registered: AtomicBool,
    interest: AtomicU8,
}

impl EventContext {
    pub fn new(fd: RawFd, task: Arc<Task>, edge_triggered: bool) -> Arc<EventContext> {
        Arc::new(EventContext {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            fd,
            task,
            edge_triggered: AtomicBool::new(edge_triggered),
            registered: AtomicBool::new(false),
            interest: AtomicU8::new(WANT_READ),
        })
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    pub fn is_edge_triggered(&self) -> bool {
        self.edge_triggered.load(Ordering::Acquire)
    }

    /// Switches between edge-triggered (persistent registration) and
    /// level-triggered (one-shot; `run()` must call `request_event` again
    /// to keep receiving notifications) delivery. Takes effect from the
    /// next notification onward.
    pub fn set_mode(&self, edge_triggered: bool) {
        self.edge_triggered.store(edge_triggered, Ordering::Release);
    }

    pub(crate) fn token(&self) -> Token {
        Token(self.id as usize)
    }

    pub fn set_want_read(&self, want: bool) {
        self.set_bit(WANT_READ, want);
    }

    pub fn set_want_write(&self, want: bool) {
        self.set_bit(WANT_WRITE, want);
    }

    fn set_bit(&self, bit: u8, on: bool) {
        if on {
            self.interest.fetch_or(bit, Ordering::AcqRel);
        } else {
            self.interest.fetch_and(!bit, Ordering::AcqRel);
        }
    }

    /// Asks `events` to report the next transition matching `mask`
    /// (`READ`/`WRITE`). For a level-triggered context this is a one-shot
    /// arm: after the next notification fires, `run()` must call
    /// `request_event` again to keep receiving them. For an edge-triggered
    /// context the registration persists across notifications until
    /// `set_mode(false)` switches it back.
    pub fn request_event(self: &Arc<Self>, events: &EventThread, mask: EventMask) -> io::Result<()> {
        let mut bits = 0u8;
        if mask & READ != 0 {
            bits |= WANT_READ;
        }
        if mask & WRITE != 0 {
            bits |= WANT_WRITE;
        }
        self.interest.store(bits, Ordering::Release);

        if self.is_registered() {
            events.reregister(self)
        } else {
            events.register(self)
        }
    }

    pub(crate) fn mio_interest(&self) -> mio::Interest {
        let bits = self.interest.load(Ordering::Acquire);
        match (bits & WANT_READ != 0, bits & WANT_WRITE != 0) {
            (true, true) => mio::Interest::READABLE | mio::Interest::WRITABLE,
            (true, false) => mio::Interest::READABLE,
            (false, true) => mio::Interest::WRITABLE,
            (false, false) => mio::Interest::READABLE,
        }
    }

    pub(crate) fn mark_registered(&self, registered: bool) {
        self.registered.store(registered, Ordering::Release);
    }

    pub(crate) fn is_registered(&self) -> bool {
        self.registered.load(Ordering::Acquire)
    }

    /// Translates a readiness notification into the `READ`/`WRITE` task
    /// event bits and signals them, unless this context has since been
    /// deregistered (closing a race between an in-flight event and a
    /// concurrent `deregister`).
    pub(crate) fn deliver(&self, readable: bool, writable: bool) {
        if !self.is_registered() {
            return;
        }
        let mut mask = 0;
        if readable {
            mask |= READ;
        }
        if writable {
            mask |= WRITE;
        }
        if mask != 0 {
            self.task.signal(mask);
        }
    }
}
