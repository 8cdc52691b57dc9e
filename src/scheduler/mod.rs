//! Task scheduling — persisted queue, cycle engine, and follow-up pass.
//!
//! - [`store`] — SQLite-backed task rows with forward-only transitions
//! - [`runner`] — injected action executor (noop / log / webhook built in)
//! - [`followup`] — in-memory, best-effort follow-up queue
//! - [`engine`] — the cycle façade gluing the two passes together

pub mod engine;
pub mod followup;
pub mod runner;
pub mod store;

// Convenience re-exports.
pub use engine::{run_scheduler_job, CycleReport, SchedulerEngine};
pub use followup::{Followup, FollowupQueue, FollowupSink, LogSink, SharedFollowupQueue};
pub use runner::{BuiltinRunner, TaskRunner};
pub use store::{NewTask, ScheduledTask, TaskStatus, TaskStore};
