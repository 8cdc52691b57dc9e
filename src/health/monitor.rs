// SPDX-License-Identifier: MIT
//! Background health monitor — periodic evaluation plus auto-recovery.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::fallback::FallbackController;
use crate::health::HealthEvaluator;
use crate::lease::{CycleGate, CycleKind};
use crate::observability::CycleTimer;

/// Run the health check every `interval_secs`, logging each unresponsive
/// agent. When `auto_recover` is set and a critical agent is down, a
/// fallback pass is kicked off under its own lease.
///
/// Ticks that land while another invoker holds the health lease are skipped.
pub async fn run_health_monitor(
    evaluator: Arc<HealthEvaluator>,
    fallback: Arc<FallbackController>,
    gate: Arc<CycleGate>,
    interval_secs: u64,
    auto_recover: bool,
) {
    let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        ticker.tick().await;

        let needs_recovery = {
            let _lease = match gate.try_acquire(CycleKind::Health) {
                Ok(guard) => guard,
                Err(busy) => {
                    debug!(err = %busy, "health tick skipped");
                    continue;
                }
            };
            let timer = CycleTimer::start(CycleKind::Health);
            let report = evaluator.system_health_check().await;
            for agent in report.agents.iter().filter(|a| !a.is_responsive) {
                warn!(
                    agent_id = %agent.id,
                    critical = agent.critical,
                    has_heartbeat = agent.has_heartbeat,
                    "agent unresponsive"
                );
            }
            info!(
                status = %report.status,
                score = ?report.health_score,
                online = report.online_count,
                total = report.total_agents,
                "health check complete"
            );
            timer.finish();
            auto_recover
                && report
                    .agents
                    .iter()
                    .any(|a| a.critical && !a.is_responsive)
        };

        if needs_recovery {
            match gate.try_acquire(CycleKind::Fallback) {
                Ok(_lease) => {
                    let timer = CycleTimer::start(CycleKind::Fallback);
                    let outcome = fallback.run().await;
                    timer.finish();
                    info!(
                        recovered = outcome.recovered.len(),
                        failed = outcome.failed.len(),
                        "auto-recovery complete"
                    );
                }
                Err(busy) => debug!(err = %busy, "auto-recovery skipped"),
            }
        }
    }
}
