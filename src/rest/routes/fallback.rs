// rest/routes/fallback.rs — POST /api/v1/fallback/run.

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

/// Trigger a recovery pass over unresponsive critical agents. Held under the
/// fallback lease so the background monitor and the operator cannot run two
/// passes at once.
pub async fn run(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    require_bearer(&headers, ctx.config.api_token.as_deref())?;

    let _lease = ctx.gate.try_acquire(CycleKind::Fallback).map_err(|busy| {
        (
            StatusCode::CONFLICT,
            Json(json!({ "error": busy.to_string() })),
        )
    })?;

    let report = ctx.fallback.run().await;
    Ok(Json(json!(report)))
}
