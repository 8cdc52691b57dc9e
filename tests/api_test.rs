//! End-to-end tests against the REST surface: a real daemon context on a
//! temp data dir, a real listener on a free port, raw HTTP over TcpStream.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use wardend::config::WardenConfig;
use wardend::lease::CycleKind;
use wardend::{rest, AppContext};

fn find_free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

/// Boot a daemon context on a temp dir and serve it on a free port.
/// Tokens are set explicitly so ambient env vars cannot leak in.
async fn start_daemon(
    dir: &TempDir,
    api_token: Option<&str>,
    cycle_secret: Option<&str>,
) -> (u16, Arc<AppContext>) {
    let port = find_free_port();
    let mut config = WardenConfig::new(
        Some(port),
        Some(dir.path().to_path_buf()),
        Some("error".to_string()),
        Some("127.0.0.1".to_string()),
    );
    config.api_token = api_token.map(|s| s.to_string());
    config.cycle_secret = cycle_secret.map(|s| s.to_string());

    let ctx = AppContext::init(config).await.unwrap();
    let server_ctx = ctx.clone();
    tokio::spawn(async move {
        let _ = rest::start_rest_server(server_ctx).await;
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    (port, ctx)
}

fn get_request(path: &str, bearer: Option<&str>) -> String {
    let auth = bearer
        .map(|t| format!("Authorization: Bearer {t}\r\n"))
        .unwrap_or_default();
    format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n{auth}Connection: close\r\n\r\n")
}

fn post_request(path: &str, bearer: Option<&str>, body: &str) -> String {
    let auth = bearer
        .map(|t| format!("Authorization: Bearer {t}\r\n"))
        .unwrap_or_default();
    format!(
        "POST {path} HTTP/1.1\r\nHost: localhost\r\n{auth}Content-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    )
}

/// Send a raw request, return (status code, parsed JSON body).
async fn send(port: u16, raw: &str) -> (u16, Value) {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();

    let response = String::from_utf8_lossy(&buf).to_string();
    let status: u16 = response
        .split_whitespace()
        .nth(1)
        .expect("response has a status line")
        .parse()
        .expect("status code is numeric");
    let body = response.split("\r\n\r\n").nth(1).unwrap_or("").trim();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_str(body).unwrap_or(Value::Null)
    };
    (status, json)
}

// ── Liveness ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_liveness_endpoint_is_open_and_reports_version() {
    let dir = TempDir::new().unwrap();
    // Tokens set: /health must stay reachable regardless.
    let (port, _ctx) = start_daemon(&dir, Some("secret"), Some("cron")).await;

    let (status, body) = send(port, &get_request("/health", None)).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(
        body["uptimeSecs"].is_u64(),
        "uptimeSecs should be a number, got: {body}"
    );
}

// ── Operator auth ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_system_health_requires_bearer_token() {
    let dir = TempDir::new().unwrap();
    let (port, _ctx) = start_daemon(&dir, Some("letmein"), None).await;

    let (status, body) = send(port, &get_request("/api/v1/health/system", None)).await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = send(port, &get_request("/api/v1/health/system", Some("wrong"))).await;
    assert_eq!(status, 401, "a wrong token is as bad as none");

    let (status, body) = send(port, &get_request("/api/v1/health/system", Some("letmein"))).await;
    assert_eq!(status, 200);
    assert_eq!(body["totalAgents"], 5);
    assert_eq!(body["agents"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_system_health_open_when_no_token_configured() {
    let dir = TempDir::new().unwrap();
    let (port, _ctx) = start_daemon(&dir, None, None).await;

    let (status, body) = send(port, &get_request("/api/v1/health/system", None)).await;
    assert_eq!(status, 200, "unset token disables the check");
    assert_eq!(body["criticalTotal"], 3);
}

#[tokio::test]
async fn test_cycle_secret_is_separate_from_api_token() {
    let dir = TempDir::new().unwrap();
    let (port, _ctx) = start_daemon(&dir, Some("admin"), Some("cron")).await;

    // The operator token does not open the scheduler trigger...
    let (status, _) = send(
        port,
        &post_request("/api/v1/scheduler/cycle", Some("admin"), ""),
    )
    .await;
    assert_eq!(status, 401);

    // ...and the cycle secret does not open operator endpoints.
    let (status, _) = send(port, &get_request("/api/v1/health/system", Some("cron"))).await;
    assert_eq!(status, 401);

    let (status, body) = send(
        port,
        &post_request("/api/v1/scheduler/cycle", Some("cron"), ""),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["due"], 0);
    assert_eq!(body["processed"], 0);
    assert!(body["durationMs"].is_u64(), "got: {body}");
}

// ── Heartbeat ingestion ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_heartbeat_from_unknown_agent_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (port, _ctx) = start_daemon(&dir, None, None).await;

    let body = r#"{"agentId":"ghost-agent","status":"online"}"#;
    let (status, json) = send(port, &post_request("/api/v1/heartbeat", None, body)).await;
    assert_eq!(status, 404);
    assert!(
        json["error"].as_str().unwrap().contains("ghost-agent"),
        "error names the unknown agent: {json}"
    );
}

#[tokio::test]
async fn test_heartbeat_with_invalid_status_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (port, _ctx) = start_daemon(&dir, None, None).await;

    let body = r#"{"agentId":"billing-agent","status":"rebooting"}"#;
    let (status, json) = send(port, &post_request("/api/v1/heartbeat", None, body)).await;
    assert_eq!(status, 400);
    assert!(json["error"].is_string(), "got: {json}");
}

#[tokio::test]
async fn test_heartbeat_roundtrip_shows_in_system_report() {
    let dir = TempDir::new().unwrap();
    let (port, _ctx) = start_daemon(&dir, None, None).await;

    let body = r#"{"agentId":"billing-agent","status":"online","metrics":{"tasksCompleted":7,"errorCount":1,"version":"2.4.0"}}"#;
    let (status, ack) = send(port, &post_request("/api/v1/heartbeat", None, body)).await;
    assert_eq!(status, 200);
    assert_eq!(ack["agentId"], "billing-agent");
    assert_eq!(ack["status"], "online");
    assert!(ack["receivedAt"].is_string(), "got: {ack}");

    let (status, report) = send(port, &get_request("/api/v1/health/system", None)).await;
    assert_eq!(status, 200);
    assert_eq!(report["onlineCount"], 1);
    assert_eq!(report["healthScore"], 20);
    // Four of five silent, two criticals among them.
    assert_eq!(report["status"], "critical");

    let agents = report["agents"].as_array().unwrap();
    let billing = agents
        .iter()
        .find(|a| a["id"] == "billing-agent")
        .expect("billing-agent in report");
    assert_eq!(billing["isResponsive"], true);
    assert_eq!(billing["tasksCompleted"], 7);
    assert_eq!(billing["errorCount"], 1);
}

// ── Fallback trigger ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_fallback_run_recovers_silent_critical_agents() {
    let dir = TempDir::new().unwrap();
    let (port, _ctx) = start_daemon(&dir, Some("ops"), None).await;

    let (status, _) = send(port, &post_request("/api/v1/fallback/run", None, "")).await;
    assert_eq!(status, 401, "fallback trigger is operator-only");

    let (status, report) = send(port, &post_request("/api/v1/fallback/run", Some("ops"), "")).await;
    assert_eq!(status, 200);
    let recovered: Vec<&str> = report["recovered"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap())
        .collect();
    assert_eq!(
        recovered,
        vec!["billing-agent", "master-orchestrator", "scheduling-agent"],
        "all three critical agents get a restart signal"
    );
    assert!(report["failed"].as_array().unwrap().is_empty());

    // The restart signal seeded fresh heartbeats, so nothing is left to do.
    let (_, second) = send(port, &post_request("/api/v1/fallback/run", Some("ops"), "")).await;
    assert!(second["recovered"].as_array().unwrap().is_empty());
}

// ── Cycle leases ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_busy_cycle_lease_maps_to_conflict() {
    let dir = TempDir::new().unwrap();
    let (port, ctx) = start_daemon(&dir, Some("admin"), Some("cron")).await;

    // Hold both leases, as the interval loops would mid-pass.
    let scheduler_lease = ctx.gate.try_acquire(CycleKind::Scheduler).unwrap();
    let fallback_lease = ctx.gate.try_acquire(CycleKind::Fallback).unwrap();

    let (status, body) = send(
        port,
        &post_request("/api/v1/scheduler/cycle", Some("cron"), ""),
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(body["error"], "a scheduler cycle is already running");

    let (status, body) = send(port, &post_request("/api/v1/fallback/run", Some("admin"), "")).await;
    assert_eq!(status, 409);
    assert_eq!(body["error"], "a fallback cycle is already running");

    // Released leases clear the conflict.
    drop(scheduler_lease);
    drop(fallback_lease);
    let (status, _) = send(
        port,
        &post_request("/api/v1/scheduler/cycle", Some("cron"), ""),
    )
    .await;
    assert_eq!(status, 200);
}

// ── Briefing endpoints ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_briefing_today_before_any_run_is_404() {
    let dir = TempDir::new().unwrap();
    let (port, _ctx) = start_daemon(&dir, None, None).await;

    let (status, body) = send(port, &get_request("/api/v1/briefing/today", None)).await;
    assert_eq!(status, 404);
    assert!(body["error"].is_string(), "got: {body}");
}

#[tokio::test]
async fn test_briefing_run_then_today_roundtrip() {
    let dir = TempDir::new().unwrap();
    let (port, _ctx) = start_daemon(&dir, Some("ops"), None).await;

    let (status, generated) = send(
        port,
        &post_request("/api/v1/briefing/run", Some("ops"), ""),
    )
    .await;
    assert_eq!(status, 200);
    let date = generated["date"].as_str().unwrap().to_string();
    assert_eq!(generated["agentsTotal"], 5);
    // No heartbeats at all: every critical agent raises a concern.
    assert_eq!(generated["healthStatus"], "critical");

    let (status, today) = send(port, &get_request("/api/v1/briefing/today", Some("ops"))).await;
    assert_eq!(status, 200);
    assert_eq!(today["date"], date.as_str());
    assert_eq!(today["agentsOnline"], 0);
}
