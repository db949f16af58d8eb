//! An intrusive doubly-linked FIFO queue, and a blocking variant built on a
//! condition variable.
//!
//! The original C++ source backing this crate links nodes directly into
//! sentinel-headed linked lists with raw back-pointers. Rust's ownership
//! model makes raw intrusive pointers unpleasant to hold onto safely, so
//! this is reimplemented as an arena: a `Vec` of slots addressed by stable
//! index, which gives the same O(1) enqueue/dequeue/remove characteristics
//! without unsafe code. See `DESIGN.md` for the rationale (this is the
//! "arena + stable indices" substitution the spec's own design notes call
//! for).
//!
//! Enqueue inserts at the head; dequeue removes from the tail — so this is
//! a FIFO, oldest-in-first-out. Iteration walks tail-to-head, matching the
//! original's `Prev()`-based iterator.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

const NIL: usize = usize::MAX;

struct Slot<T> {
    prev: usize,
    next: usize,
    item: Option<T>,
    generation: u64,
}

/// A handle to a node previously placed into a [`Queue`], usable with
/// [`Queue::remove`]. Handles from one queue are meaningless (and safely
/// ignored) when passed to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeHandle {
    queue_id: u64,
    index: usize,
    generation: u64,
}

/// A plain (non-blocking) intrusive FIFO queue.
pub struct Queue<T> {
    id: u64,
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    head: usize,
    tail: usize,
    len: usize,
}

static NEXT_QUEUE_ID: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(1);

impl<T> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Queue<T> {
    pub fn new() -> Self {
        Queue {
            id: NEXT_QUEUE_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
            slots: Vec::new(),
            free: Vec::new(),
            head: NIL,
            tail: NIL,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Pushes `item` at the head of the queue, returning a handle that can
    /// later be passed to [`Queue::remove`].
    pub fn enqueue(&mut self, item: T) -> NodeHandle {
        let generation = 0;
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Slot {
                    prev: NIL,
                    next: NIL,
                    item: Some(item),
                    generation: self.slots[index].generation.wrapping_add(1),
                };
                index
            }
            None => {
                self.slots.push(Slot {
                    prev: NIL,
                    next: NIL,
                    item: Some(item),
                    generation,
                });
                self.slots.len() - 1
            }
        };

        if let Some(old_head) = self.head_index() {
            self.slots[old_head].prev = index;
            self.slots[index].next = old_head;
        } else {
            self.tail = index;
        }
        self.head = index;
        self.len += 1;

        NodeHandle {
            queue_id: self.id,
            index,
            generation: self.slots[index].generation,
        }
    }

    /// Pops the oldest element (FIFO order).
    pub fn dequeue(&mut self) -> Option<T> {
        let index = self.tail_index()?;
        Some(self.unlink(index))
    }

    /// Removes the node identified by `handle`, if it is still linked into
    /// this queue. A no-op returning `None` if the handle is stale (already
    /// dequeued/removed) or belongs to a different queue.
    pub fn remove(&mut self, handle: NodeHandle) -> Option<T> {
        if handle.queue_id != self.id {
            return None;
        }
        let slot = self.slots.get(handle.index)?;
        if slot.generation != handle.generation || slot.item.is_none() {
            return None;
        }
        Some(self.unlink(handle.index))
    }

    /// Iterates head-to-tail, i.e. most-recently-enqueued element first.
    /// This matches the original implementation's `Prev()`-based walk.
    /// Concretely, for `enqueue(A); enqueue(B); enqueue(C)`, iteration
    /// yields `C, B, A`.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            queue: self,
            current: self.head_index(),
        }
    }

    fn head_index(&self) -> Option<usize> {
        (self.head != NIL).then_some(self.head)
    }

    fn tail_index(&self) -> Option<usize> {
        (self.tail != NIL).then_some(self.tail)
    }

    fn unlink(&mut self, index: usize) -> T {
        let (prev, next) = {
            let slot = &self.slots[index];
            (slot.prev, slot.next)
        };

        match prev {
            NIL => self.head = next,
            p => self.slots[p].next = next,
        }
        match next {
            NIL => self.tail = prev,
            n => self.slots[n].prev = prev,
        }

        let item = self.slots[index].item.take().expect("node was linked");
        self.free.push(index);
        self.len -= 1;
        item
    }
}

/// Iterator over a [`Queue`], walking from the most-recently-enqueued
/// element to the oldest (see [`Queue::iter`]).
pub struct Iter<'a, T> {
    queue: &'a Queue<T>,
    current: Option<usize>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        let index = self.current?;
        let slot = &self.queue.slots[index];
        self.current = (slot.next != NIL).then_some(slot.next);
        slot.item.as_ref()
    }
}

/// A [`Queue`] guarded by a mutex and condition variable, supporting a
/// timed blocking dequeue.
pub struct BlockingQueue<T> {
    mutex: Mutex<Queue<T>>,
    condvar: Condvar,
}

impl<T> Default for BlockingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BlockingQueue<T> {
    pub fn new() -> Self {
        BlockingQueue {
            mutex: Mutex::new(Queue::new()),
            condvar: Condvar::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.mutex.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.mutex.lock().is_empty()
    }

    /// Enqueues `item`, then wakes exactly one waiter (if any) after
    /// releasing the lock.
    pub fn enqueue(&self, item: T) -> NodeHandle {
        let handle = {
            let mut guard = self.mutex.lock();
            guard.enqueue(item)
        };
        self.condvar.notify_one();
        handle
    }

    /// Non-blocking dequeue.
    pub fn dequeue(&self) -> Option<T> {
        self.mutex.lock().dequeue()
    }

    pub fn remove(&self, handle: NodeHandle) -> Option<T> {
        self.mutex.lock().remove(handle)
    }

    /// Waits up to `timeout` for an element to become available, then
    /// attempts one dequeue. Returns `None` on timeout *or* on a spurious
    /// wakeup that finds the queue still empty — callers cannot distinguish
    /// the two and must treat both as "recompute and continue", per the
    /// scheduler's main loop contract.
    pub fn dequeue_blocking(&self, timeout: Duration) -> Option<T> {
        let mut guard = self.mutex.lock();
        if guard.is_empty() {
            let _ = self.condvar.wait_for(&mut guard, timeout);
        }
        guard.dequeue()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s2_queue_fifo_and_iteration_order() {
        let mut q: Queue<&'static str> = Queue::new();
        q.enqueue("A");
        q.enqueue("B");
        q.enqueue("C");

        let order: Vec<_> = q.iter().copied().collect();
        assert_eq!(order, vec!["C", "B", "A"]);

        assert_eq!(q.dequeue(), Some("A"));
        assert_eq!(q.dequeue(), Some("B"));
        assert_eq!(q.dequeue(), Some("C"));
        assert_eq!(q.dequeue(), None);
    }

    #[test]
    fn enqueue_then_dequeue_is_empty() {
        let mut q: Queue<i32> = Queue::new();
        q.enqueue(1);
        assert_eq!(q.dequeue(), Some(1));
        assert!(q.is_empty());
    }

    #[test]
    fn remove_by_handle_is_o1_and_foreign_handle_is_noop() {
        let mut q: Queue<i32> = Queue::new();
        q.enqueue(1);
        let h2 = q.enqueue(2);
        q.enqueue(3);

        assert_eq!(q.remove(h2), Some(2));
        let order: Vec<_> = q.iter().copied().collect();
        assert_eq!(order, vec![3, 1]);

        let mut other: Queue<i32> = Queue::new();
        let foreign = other.enqueue(42);
        assert_eq!(q.remove(foreign), None);
    }

    #[test]
    fn blocking_dequeue_times_out_on_empty_queue() {
        let q: BlockingQueue<i32> = BlockingQueue::new();
        let start = std::time::Instant::now();
        let result = q.dequeue_blocking(Duration::from_millis(20));
        assert!(result.is_none());
        assert!(start.elapsed() >= Duration::from_millis(15));
    }

    #[test]
    fn blocking_dequeue_wakes_on_enqueue() {
        use std::sync::Arc;
        use std::thread;

        let q = Arc::new(BlockingQueue::new());
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.dequeue_blocking(Duration::from_secs(5)));

        thread::sleep(Duration::from_millis(20));
        q.enqueue(7);

        assert_eq!(handle.join().unwrap(), Some(7));
    }
}
