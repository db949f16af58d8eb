//! Lock-free-adjacent building blocks shared by the rest of the crate: an
//! intrusive min-heap (timers) and an intrusive FIFO queue (event
//! dispatch), the latter in plain and condvar-backed blocking flavors.

pub mod heap;
pub mod queue;

pub use heap::{Heap, HeapItem, HeapNode, UpdateHint};
pub use queue::{BlockingQueue, NodeHandle, Queue};
