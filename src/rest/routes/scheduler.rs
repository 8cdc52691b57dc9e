// rest/routes/scheduler.rs — POST /api/v1/scheduler/cycle.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::lease::CycleKind;
use crate::rest::auth::require_bearer;
use crate::AppContext;

/// Drive one scheduler cycle. Guarded by `cycle_secret` (not the operator
/// token) so an external cron can hold a narrower credential.
pub async fn cycle(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    require_bearer(&headers, ctx.config.cycle_secret.as_deref())?;

    let _lease = ctx.gate.try_acquire(CycleKind::Scheduler).map_err(|busy| {
        (
            StatusCode::CONFLICT,
            Json(json!({ "error": busy.to_string() })),
        )
    })?;

    match ctx.engine.run_cycle().await {
        Ok(report) => Ok(Json(json!(report))),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )),
    }
}
