//! Monotonic milliseconds since an arbitrary process-wide epoch.
//!
//! Every deadline in this crate (timer heap keys, idle-dispatcher deadlines)
//! is an absolute value returned by [`now_ms`]. Using a fixed epoch rather
//! than system time keeps deadlines comparable even if the wall clock is
//! adjusted underneath the process.

use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Milliseconds elapsed since the first call to any time function in this
/// process. Always non-negative and monotonically non-decreasing.
pub fn now_ms() -> i64 {
    let epoch = EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_millis() as i64
}

/// `deadline_ms` for an event `delay_ms` milliseconds from now.
pub fn deadline_ms(delay_ms: i64) -> i64 {
    now_ms() + delay_ms
}
