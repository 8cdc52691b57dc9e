// rest/mod.rs — Public REST API server.
//
// Axum HTTP server bridging agents and operators to the health, fallback,
// scheduler, and briefing cores.
//
// Endpoints:
//   GET  /health                    (liveness, no auth)
//   POST /api/v1/heartbeat          (agent check-in, no auth)
//   GET  /api/v1/health/system      (bearer: api_token)
//   POST /api/v1/fallback/run       (bearer: api_token)
//   POST /api/v1/briefing/run       (bearer: api_token)
//   GET  /api/v1/briefing/today     (bearer: api_token)
//   POST /api/v1/scheduler/cycle    (bearer: cycle_secret)

pub mod auth;
pub mod routes;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::AppContext;

pub async fn start_rest_server(ctx: Arc<AppContext>) -> Result<()> {
    let bind = format!("{}:{}", ctx.config.bind_address, ctx.config.port);
    let addr: SocketAddr = bind.parse()?;

    let router = build_router(ctx);

    info!("REST API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        // Liveness (no auth)
        .route("/health", get(routes::health::liveness))
        // Agent heartbeat ingestion (no auth — unknown ids are rejected)
        .route("/api/v1/heartbeat", post(routes::heartbeat::ingest))
        // Operator surface
        .route("/api/v1/health/system", get(routes::health::system_report))
        .route("/api/v1/fallback/run", post(routes::fallback::run))
        .route("/api/v1/briefing/run", post(routes::briefing::run))
        .route("/api/v1/briefing/today", get(routes::briefing::today))
        // External cycle trigger
        .route("/api/v1/scheduler/cycle", post(routes::scheduler::cycle))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}
