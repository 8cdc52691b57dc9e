//! Task action execution — the seam between the queue and real work.

use anyhow::{anyhow, bail, Context as _, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::info;

use crate::scheduler::store::ScheduledTask;

/// Executes one task's action. The engine captures any error into the task
/// row; implementations never touch the queue themselves.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: &ScheduledTask) -> Result<()>;
}

/// Timeout for the `webhook` kind's outbound request, so a dead endpoint
/// cannot stall the batch.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

/// Default runner with the built-in kinds:
///
/// - `noop` — succeeds without doing anything
/// - `log` — emits the payload at info level
/// - `webhook` — POSTs the payload's `body` JSON to `payload.url`
///
/// Unknown kinds fail the task with a captured message.
pub struct BuiltinRunner {
    http: reqwest::Client,
}

impl BuiltinRunner {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    fn parse_payload(task: &ScheduledTask) -> Result<Value> {
        match &task.payload {
            Some(raw) => serde_json::from_str(raw)
                .with_context(|| format!("invalid JSON payload for task {}", task.id)),
            None => Ok(Value::Null),
        }
    }
}

impl Default for BuiltinRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskRunner for BuiltinRunner {
    async fn run(&self, task: &ScheduledTask) -> Result<()> {
        match task.kind.as_str() {
            "noop" => Ok(()),
            "log" => {
                let payload = Self::parse_payload(task)?;
                info!(
                    task_id = %task.id,
                    title = %task.title,
                    payload = %payload,
                    "task log entry"
                );
                Ok(())
            }
            "webhook" => {
                let payload = Self::parse_payload(task)?;
                let url = payload
                    .get("url")
                    .and_then(Value::as_str)
                    .ok_or_else(|| anyhow!("webhook task requires a payload.url string"))?;
                let body = payload.get("body").cloned().unwrap_or(Value::Null);
                let resp = self
                    .http
                    .post(url)
                    .timeout(WEBHOOK_TIMEOUT)
                    .json(&body)
                    .send()
                    .await
                    .with_context(|| format!("webhook POST to {url} failed"))?;
                if !resp.status().is_success() {
                    bail!("webhook POST to {url} returned {}", resp.status());
                }
                Ok(())
            }
            other => bail!("unknown task kind: {other}"),
        }
    }
}
