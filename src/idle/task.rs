//! [`IdleTask`]: delayed delivery of [`IDLE`] into the normal task-signal
//! path, arranged through the shared [`IdleDispatcher`].

use std::sync::Arc;

use crate::idle::dispatcher::IdleDispatcher;
use crate::intrusive::{HeapItem, HeapNode};
use crate::task::core::{Task, IDLE};
use crate::time;

/// Wraps a [`Task`] with its own heap node for the shared idle-dispatcher
/// heap.
///
/// This node is deliberately separate from the wrapped `Task`'s own
/// per-worker timer node: the same underlying task can be linked into its
/// owning worker's local timer heap (via a plain timed reschedule from
/// `run()`) *and* the shared idle heap (via an `IdleTask`) at once, since
/// each `HeapNode` only ever belongs to one heap at a time.
pub struct IdleTask {
    task: Arc<Task>,
    idle_node: HeapNode,
}

impl HeapItem for Arc<IdleTask> {
    fn heap_node(&self) -> &HeapNode {
        &self.idle_node
    }
}

impl IdleTask {
    pub fn new(task: Arc<Task>) -> Arc<IdleTask> {
        Arc::new(IdleTask {
            task,
            idle_node: HeapNode::new(),
        })
    }

    /// The task this idle timer delivers `IDLE` signals to.
    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    pub(crate) fn deadline(&self) -> i64 {
        self.idle_node.value()
    }

    /// Arms (or re-arms) delivery of a single `IDLE` signal after
    /// `delay_ms`. Re-arming before a previous timer fires replaces it —
    /// only the latest call's deadline takes effect.
    pub fn set_idle_timer(self: &Arc<Self>, delay_ms: i64) {
        let deadline = time::deadline_ms(delay_ms.max(0));
        IdleDispatcher::global().arm(self.clone(), deadline);
    }

    /// Cancels a pending idle timer. A no-op if none is armed, or if it has
    /// already fired.
    pub fn cancel_timeout(self: &Arc<Self>) {
        IdleDispatcher::global().disarm(self);
    }

    pub(crate) fn fire(self: Arc<Self>) {
        self.task.signal(IDLE);
    }
}
