// rest/routes/briefing.rs — manual briefing trigger and today's stored row.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::lease::CycleKind;
use crate::rest::auth::require_bearer;
use crate::AppContext;

/// POST /api/v1/briefing/run — regenerate today's briefing on demand.
pub async fn run(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    require_bearer(&headers, ctx.config.api_token.as_deref())?;

    let _lease = ctx.gate.try_acquire(CycleKind::Briefing).map_err(|busy| {
        (
            StatusCode::CONFLICT,
            Json(json!({ "error": busy.to_string() })),
        )
    })?;

    match ctx.briefing.generate_and_store().await {
        Ok(briefing) => Ok(Json(json!(briefing))),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )),
    }
}

/// GET /api/v1/briefing/today — today's row, if one has been generated.
pub async fn today(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    require_bearer(&headers, ctx.config.api_token.as_deref())?;

    let date = Utc::now().format("%Y-%m-%d").to_string();
    match ctx.briefing.store().get(&date).await {
        Ok(Some(briefing)) => Ok(Json(json!(briefing))),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("no briefing stored for {date}") })),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )),
    }
}
