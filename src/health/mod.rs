// SPDX-License-Identifier: MIT
//! Agent health evaluation.
//!
//! Provides [`HealthEvaluator`], which judges per-agent responsiveness from
//! the heartbeat store and aggregates a whole-system [`HealthReport`] over
//! the full agent catalog, plus the background monitor loop that runs the
//! check on a cadence and kicks off auto-recovery.
//!
//! An agent is responsive when all three hold:
//! - a heartbeat record exists for it,
//! - the reported status is not `offline`/`error`,
//! - the heartbeat is younger than the staleness window.
//!
//! Agents that never reported still count toward the denominator of the
//! health score — a fleet that never started is not a healthy fleet.

pub mod evaluator;
pub mod monitor;

// Convenience re-exports.
pub use evaluator::{AgentHealth, HealthEvaluator, HealthReport, SharedHealthEvaluator};
pub use monitor::run_health_monitor;
