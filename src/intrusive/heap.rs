//! An intrusive, array-backed min-heap keyed by a signed 64-bit priority.
//!
//! This is the timer primitive underneath both a [`TaskThread`](crate::task::thread::TaskThread)'s
//! local timer heap and the shared idle-dispatcher heap. "Intrusive" here
//! means the ownership bookkeeping (which heap, if any, a value currently
//! belongs to) lives on the value itself via [`HeapNode`], rather than in a
//! side table — so removing a value the caller already holds a handle to is
//! O(log n), not a linear scan.
//!
//! Every heap instance gets a unique id at construction time. A node
//! remembers the id of the heap that owns it, which is how [`Heap::remove`]
//! can safely no-op when handed a node that belongs to some *other* heap
//! (or no heap at all) instead of corrupting this heap's array.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};

static NEXT_HEAP_ID: AtomicU64 = AtomicU64::new(1);

/// Embedded heap-membership state for a value stored in a [`Heap`].
///
/// `owner` is `0` when the node is not a member of any heap, otherwise the
/// id of the owning heap. `index` is the node's 1-based array position,
/// meaningful only while `owner != 0`.
#[derive(Debug, Default)]
pub struct HeapNode {
    value: AtomicI64,
    owner: AtomicU64,
    index: AtomicUsize,
}

impl HeapNode {
    pub const fn new() -> Self {
        HeapNode {
            value: AtomicI64::new(0),
            owner: AtomicU64::new(0),
            index: AtomicUsize::new(0),
        }
    }

    /// The node's current priority key.
    pub fn value(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Whether the node is currently linked into *any* heap.
    pub fn is_linked(&self) -> bool {
        self.owner.load(Ordering::Acquire) != 0
    }

    fn owner_id(&self) -> u64 {
        self.owner.load(Ordering::Acquire)
    }

    fn set_owner(&self, id: u64, index: usize) {
        self.index.store(index, Ordering::Relaxed);
        self.owner.store(id, Ordering::Release);
    }

    fn clear_owner(&self) {
        self.owner.store(0, Ordering::Release);
        self.index.store(0, Ordering::Relaxed);
    }

    fn index(&self) -> usize {
        self.index.load(Ordering::Relaxed)
    }
}

/// Trait implemented by values stored in a [`Heap`], exposing their embedded
/// [`HeapNode`].
pub trait HeapItem {
    fn heap_node(&self) -> &HeapNode;
}

/// Controls how much work [`Heap::update`] does to restore heap order.
///
/// The hint is purely an optimization: `None` always restores heap order
/// correctly regardless of which way the key moved. `ExpectUp` and
/// `ExpectDown` skip the unneeded direction in the common case, but this
/// implementation still falls back to the other direction when the fast
/// path doesn't actually move the node, so a mistaken hint degrades
/// performance, never correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateHint {
    None,
    /// The key decreased (or the caller otherwise expects the node to move
    /// toward the root).
    ExpectUp,
    /// The key increased (or the caller otherwise expects the node to move
    /// toward the leaves).
    ExpectDown,
}

/// An intrusive min-heap over values of type `T`.
///
/// Not thread-safe by itself: callers needing concurrent access wrap a
/// `Heap` in a mutex (as [`crate::idle::dispatcher`] does for the shared
/// idle heap); a [`crate::task::thread::TaskThread`]'s local heap is used
/// unsynchronized because it is only ever touched by its owning thread.
pub struct Heap<T> {
    id: u64,
    items: Vec<T>,
}

impl<T: HeapItem> Default for Heap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: HeapItem> Heap<T> {
    pub fn new() -> Self {
        Heap {
            id: NEXT_HEAP_ID.fetch_add(1, Ordering::Relaxed),
            items: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the minimum element without removing it.
    pub fn peek_min(&self) -> Option<&T> {
        self.items.first()
    }

    /// Inserts `item` with the given priority key.
    ///
    /// # Panics
    ///
    /// Panics if `item` is already linked into a heap (this one or another).
    /// Double-linking a node is a programmer error the framework never
    /// recovers from, per the crate's error-handling policy.
    pub fn insert(&mut self, item: T, value: i64) {
        assert!(
            !item.heap_node().is_linked(),
            "Heap::insert: node is already a member of a heap"
        );
        item.heap_node().value.store(value, Ordering::Relaxed);
        let index = self.items.len() + 1;
        item.heap_node().set_owner(self.id, index);
        self.items.push(item);
        self.shift_up(index);
    }

    /// Removes and returns the minimum element, or `None` if empty.
    pub fn extract_min(&mut self) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        Some(self.extract_at(1))
    }

    /// Whether `item` is currently linked into *this* heap specifically (as
    /// opposed to some other heap, or none).
    pub(crate) fn contains(&self, item: &T) -> bool {
        item.heap_node().owner_id() == self.id
    }

    /// Removes `item` from the heap if it is currently a member of *this*
    /// heap. A no-op (returns `None`) if the node belongs to a different
    /// heap or to none at all — this mirrors the original queue/heap
    /// ownership check and lets callers probe membership defensively.
    pub fn remove(&mut self, item: &T) -> Option<T> {
        if item.heap_node().owner_id() != self.id {
            return None;
        }
        let index = item.heap_node().index();
        Some(self.extract_at(index))
    }

    /// Changes `item`'s priority key in place and restores heap order.
    ///
    /// # Panics
    ///
    /// Panics if `item` is not a member of this heap.
    pub fn update(&mut self, item: &T, new_value: i64, hint: UpdateHint) {
        assert_eq!(
            item.heap_node().owner_id(),
            self.id,
            "Heap::update: node is not a member of this heap"
        );
        let index = item.heap_node().index();
        item.heap_node().value.store(new_value, Ordering::Relaxed);

        let moved_up = if hint != UpdateHint::ExpectDown {
            self.shift_up(index) != index
        } else {
            false
        };

        if !moved_up {
            // Either the hint asked for a downward move, or the upward
            // attempt found the node already in place — in both cases we
            // must still check the downward direction, because a node
            // whose key increased can violate the heap property against
            // its children even though it never needed to move toward the
            // root. This keeps `update` correct even when a caller passes
            // `ExpectUp` for a key that did not actually decrease (see
            // DESIGN.md for why `IdleTaskThread::set_idle_timer` relies on
            // exactly this fallback).
            let current = item.heap_node().index();
            self.shift_down(current);
        }
    }

    fn extract_at(&mut self, index: usize) -> T {
        let last = self.items.len();
        self.items.swap(index - 1, last - 1);
        let removed = self.items.pop().expect("heap non-empty");
        removed.heap_node().clear_owner();

        if index <= self.items.len() {
            self.fix_index(index);
            let moved = self.shift_up(index);
            self.shift_down(moved);
        }

        removed
    }

    fn fix_index(&self, index: usize) {
        self.items[index - 1].heap_node().set_owner(self.id, index);
    }

    fn key_at(&self, index: usize) -> i64 {
        self.items[index - 1].heap_node().value()
    }

    /// Moves the element at `index` up toward the root while it is smaller
    /// than its parent. Returns the element's final index.
    fn shift_up(&mut self, mut index: usize) -> usize {
        while index > 1 {
            let parent = index / 2;
            if self.key_at(index) < self.key_at(parent) {
                self.items.swap(index - 1, parent - 1);
                self.fix_index(index);
                self.fix_index(parent);
                index = parent;
            } else {
                break;
            }
        }
        index
    }

    /// Moves the element at `index` down toward the leaves while it is
    /// larger than its smallest child. Returns the element's final index.
    fn shift_down(&mut self, mut index: usize) -> usize {
        let len = self.items.len();
        loop {
            let left = index * 2;
            let right = left + 1;
            let mut smallest = index;

            if left <= len && self.key_at(left) < self.key_at(smallest) {
                smallest = left;
            }
            if right <= len && self.key_at(right) < self.key_at(smallest) {
                smallest = right;
            }
            if smallest == index {
                break;
            }
            self.items.swap(index - 1, smallest - 1);
            self.fix_index(index);
            self.fix_index(smallest);
            index = smallest;
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Entry {
        node: HeapNode,
        label: i32,
    }

    impl Entry {
        fn new(label: i32) -> Arc<Entry> {
            Arc::new(Entry {
                node: HeapNode::new(),
                label,
            })
        }
    }

    impl HeapItem for Arc<Entry> {
        fn heap_node(&self) -> &HeapNode {
            &self.node
        }
    }

    #[test]
    fn s1_heap_sort() {
        let mut heap: Heap<Arc<Entry>> = Heap::new();
        for key in [5, 3, 8, 1, 9, 2, 7, 4, 6] {
            heap.insert(Entry::new(key), key as i64);
        }

        let mut out = Vec::new();
        while let Some(e) = heap.extract_min() {
            out.push(e.label);
        }

        assert_eq!(out, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(heap.len(), 0);
    }

    #[test]
    fn insert_then_remove_is_idempotent() {
        let mut heap: Heap<Arc<Entry>> = Heap::new();
        let a = Entry::new(1);
        let b = Entry::new(2);
        heap.insert(a.clone(), 10);
        heap.insert(b.clone(), 5);

        assert!(heap.remove(&a).is_some());
        assert_eq!(heap.len(), 1);
        assert_eq!(heap.peek_min().unwrap().label, b.label);
    }

    #[test]
    fn remove_from_foreign_heap_is_noop() {
        let mut heap_a: Heap<Arc<Entry>> = Heap::new();
        let mut heap_b: Heap<Arc<Entry>> = Heap::new();
        let x = Entry::new(1);
        heap_a.insert(x.clone(), 1);

        assert!(heap_b.remove(&x).is_none());
        assert_eq!(heap_a.len(), 1);
    }

    #[test]
    #[should_panic(expected = "already a member")]
    fn double_insert_panics() {
        let mut heap: Heap<Arc<Entry>> = Heap::new();
        let x = Entry::new(1);
        heap.insert(x.clone(), 1);
        heap.insert(x, 2);
    }

    #[test]
    fn update_with_increased_key_preserves_heap_property() {
        // Regression test for the EXPECT_UP-on-increase re-arm case used by
        // the idle dispatcher: even though the hint claims the node is
        // moving toward the root, an increase must still sift down.
        let mut heap: Heap<Arc<Entry>> = Heap::new();
        let root = Entry::new(0);
        let left = Entry::new(1);
        let right = Entry::new(2);
        heap.insert(root.clone(), 1);
        heap.insert(left, 5);
        heap.insert(right, 6);

        heap.update(&root, 100, UpdateHint::ExpectUp);

        // The heap must still extract in non-decreasing order.
        let mut out = Vec::new();
        while let Some(e) = heap.extract_min() {
            out.push(e.node.value());
        }
        assert_eq!(out, vec![5, 6, 100]);
    }

    #[test]
    fn timer_monotonicity() {
        let mut heap: Heap<Arc<Entry>> = Heap::new();
        for key in [50, 10, 30, 20, 40] {
            heap.insert(Entry::new(key), key as i64);
        }
        let mut last = i64::MIN;
        while let Some(e) = heap.extract_min() {
            let v = e.node.value();
            assert!(v >= last);
            last = v;
        }
    }
}
