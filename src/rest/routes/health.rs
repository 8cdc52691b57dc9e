// rest/routes/health.rs — liveness probe and the full system health report.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::rest::auth::require_bearer;
use crate::AppContext;

/// GET /health — open liveness probe.
pub async fn liveness(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    let uptime = ctx.started_at.elapsed().as_secs();
    Json(json!({
        "status": "ok",
        "uptimeSecs": uptime,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /api/v1/health/system — per-agent health plus the aggregate score.
pub async fn system_report(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    require_bearer(&headers, ctx.config.api_token.as_deref())?;
    let report = ctx.evaluator.system_health_check().await;
    Ok(Json(json!(report)))
}
