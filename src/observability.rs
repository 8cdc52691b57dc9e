// SPDX-License-Identifier: MIT
//! Cycle timing — wall-clock measurement for the periodic passes.
//!
//! Every cycle (scheduler, health, fallback, briefing) is timed; slow cycles
//! are promoted from debug to info so they show up in default logs without
//! turning the cadence itself into noise.

use std::time::Instant;
use tracing::{debug, info};

use crate::lease::CycleKind;

/// Cycles slower than this are logged at info level.
const SLOW_CYCLE_MS: u128 = 1_000;

/// Measures one cycle from construction to [`finish`](CycleTimer::finish).
pub struct CycleTimer {
    kind: CycleKind,
    started: Instant,
}

impl CycleTimer {
    pub fn start(kind: CycleKind) -> Self {
        Self {
            kind,
            started: Instant::now(),
        }
    }

    /// Log the elapsed time and return it in milliseconds.
    pub fn finish(self) -> u64 {
        let elapsed = self.started.elapsed().as_millis();
        if elapsed > SLOW_CYCLE_MS {
            info!(cycle = %self.kind, elapsed_ms = elapsed as u64, "slow cycle");
        } else {
            debug!(cycle = %self.kind, elapsed_ms = elapsed as u64, "cycle complete");
        }
        elapsed as u64
    }
}
