//! Debug-only scheduler counters. Not a full metrics/observability surface
//! (that's out of scope, same as in the Non-goals this crate inherits) —
//! just the handful of numbers useful when diagnosing a stuck scheduler.

use crate::task::pool::TaskThreadPool;

/// A point-in-time snapshot of a [`TaskThreadPool`]'s shape. Thread counts
/// are fixed after construction, so this is really just a read-only view,
/// not a sampled metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolMetrics {
    pub short_task_threads: usize,
    pub blocking_threads: usize,
}

impl PoolMetrics {
    pub fn snapshot(pool: &TaskThreadPool) -> PoolMetrics {
        PoolMetrics {
            short_task_threads: pool.num_short_task_threads(),
            blocking_threads: pool.num_blocking_task_threads(),
        }
    }
}
