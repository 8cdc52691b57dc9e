// rest/routes/heartbeat.rs — POST /api/v1/heartbeat.

use axum::{extract::State, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::heartbeat::{AgentStatus, HeartbeatError, HeartbeatMetrics};
use crate::AppContext;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    pub agent_id: String,
    pub status: AgentStatus,
    #[serde(default)]
    pub metrics: Option<HeartbeatMetrics>,
}

/// Agent check-in. No bearer required — unknown agent ids are rejected, so
/// the registry itself is the gate.
pub async fn ingest(
    State(ctx): State<Arc<AppContext>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    // Parse by hand so malformed bodies come back as a JSON 400 instead of
    // axum's plain-text rejection.
    let req: HeartbeatRequest = serde_json::from_value(body).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("invalid heartbeat payload: {e}") })),
        )
    })?;

    match ctx.heartbeats.record(&req.agent_id, req.status, req.metrics).await {
        Ok(record) => Ok(Json(json!({
            "agentId": record.agent_id,
            "status": record.status,
            "receivedAt": record.last_heartbeat.to_rfc3339(),
        }))),
        Err(e @ HeartbeatError::UnknownAgent(_)) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": e.to_string() })),
        )),
    }
}
