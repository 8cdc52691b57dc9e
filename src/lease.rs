// SPDX-License-Identifier: MIT
//! Cycle lease — at most one in-flight execution per cycle type.
//!
//! Every periodic pass (scheduler, health, fallback, briefing) can be fired
//! by two invokers: the daemon's own interval loop and the HTTP trigger.
//! The gate hands out one lease per cycle kind; whoever holds it runs, every
//! other invoker gets [`CycleBusy`] and backs off (HTTP 409, or a skipped
//! tick). The engines themselves stay lock-free — taking the lease is the
//! invoking layer's job.

use std::fmt;
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

/// The gated cycle types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleKind {
    Scheduler,
    Health,
    Fallback,
    Briefing,
}

impl CycleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduler => "scheduler",
            Self::Health => "health",
            Self::Fallback => "fallback",
            Self::Briefing => "briefing",
        }
    }
}

impl fmt::Display for CycleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returned when the lease for the same cycle type is already held.
#[derive(Debug, Error)]
#[error("a {0} cycle is already running")]
pub struct CycleBusy(pub CycleKind);

/// One mutex per cycle type. Acquisition never waits; a held lease means
/// the caller skips this round.
#[derive(Default)]
pub struct CycleGate {
    scheduler: Mutex<()>,
    health: Mutex<()>,
    fallback: Mutex<()>,
    briefing: Mutex<()>,
}

impl CycleGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take the lease for `kind` without waiting. The returned guard
    /// releases the lease on drop.
    pub fn try_acquire(&self, kind: CycleKind) -> Result<CycleGuard<'_>, CycleBusy> {
        let slot = match kind {
            CycleKind::Scheduler => &self.scheduler,
            CycleKind::Health => &self.health,
            CycleKind::Fallback => &self.fallback,
            CycleKind::Briefing => &self.briefing,
        };
        match slot.try_lock() {
            Ok(guard) => Ok(CycleGuard { _guard: guard, kind }),
            Err(_) => Err(CycleBusy(kind)),
        }
    }
}

/// Held for the duration of one cycle.
#[derive(Debug)]
pub struct CycleGuard<'a> {
    _guard: MutexGuard<'a, ()>,
    kind: CycleKind,
}

impl CycleGuard<'_> {
    pub fn kind(&self) -> CycleKind {
        self.kind
    }
}
