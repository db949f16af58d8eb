//! A scheduling core for long-running network services.
//!
//! A [`builder::Scheduler`] owns a fixed pool of worker threads
//! ([`task::TaskThreadPool`]), split into a short-task class and a blocking
//! class, plus a dedicated [`event::EventThread`] that turns socket
//! readiness into task signals. A single process-wide
//! [`idle::IdleDispatcher`] delivers delayed wakeups the same way.
//!
//! The scheduling unit is [`task::Task`]: an atomically-latched event mask
//! driven by an application-supplied [`task::TaskBody`]. Two invocations of
//! the same task's `run()` never overlap; signals that arrive while a task
//! is already alive coalesce into its in-flight dispatch instead of
//! queuing a second one (see [`task::Task::signal`]).
//!
//! This crate intentionally does not do: preemption, priority
//! inheritance, work stealing or fairness across tasks within a worker
//! class, cross-process scheduling, persistence across restarts, or
//! resizing a pool after construction. Callers who need those should look
//! elsewhere; this is a single fixed-shape scheduling primitive, not a
//! general-purpose async runtime.

pub mod builder;
pub mod error;
pub mod event;
pub mod idle;
pub mod intrusive;
pub mod metrics;
pub mod task;
pub mod time;

pub use builder::{Builder, Scheduler};
pub use error::{InitError, InitResult};
pub use task::{Task, TaskBody};
