//! API Regression Tests
//!
//! In-process tests that build the Axum app via `create_app()` and exercise
//! the /api/v1/* endpoints using `tower::ServiceExt::oneshot()`.
//! No binary spawn, no network port.

use fab_sentinel::api::{create_app, ApiState};
use fab_sentinel::config::SentinelConfig;
use fab_sentinel::safety::MemorySafetyLog;
use fab_sentinel::storage::{InMemoryQuarantineStore, InMemoryTelemetryStore};
use fab_sentinel::ToolHealthPipeline;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    telemetry: Arc<InMemoryTelemetryStore>,
    safety_log: Arc<MemorySafetyLog>,
}

fn create_test_app() -> TestApp {
    let telemetry = Arc::new(InMemoryTelemetryStore::new());
    let safety_log = Arc::new(MemorySafetyLog::new());
    let pipeline = ToolHealthPipeline::new(
        telemetry.clone(),
        Arc::new(InMemoryQuarantineStore::new()),
        safety_log.clone(),
        &SentinelConfig::default(),
    );
    TestApp {
        router: create_app(ApiState::new(Arc::new(pipeline), "ETCH-001")),
        telemetry,
        safety_log,
    }
}

fn reading(tool_id: &str, wafer_id: &str, temperature: f64) -> Value {
    json!({
        "timestamp": Utc::now().to_rfc3339(),
        "tool_id": tool_id,
        "wafer_id": wafer_id,
        "metrics": { "temperature": temperature, "pressure": 10.02 },
        "status": "NOMINAL",
        "location": "Greenfield-Line1"
    })
}

async fn send(app: &TestApp, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.router.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

async fn get(app: &TestApp, uri: &str) -> (StatusCode, Value) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

async fn post(app: &TestApp, uri: &str, body: &Value) -> (StatusCode, Value) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, req).await
}

#[tokio::test]
async fn test_root_banner() {
    let app = create_test_app();
    let (status, body) = get(&app, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["message"], "Fab Sentinel API is operational");
    assert_eq!(body["meta"]["version"], "1");
}

#[tokio::test]
async fn test_nominal_reading_is_processed() {
    let app = create_test_app();
    let (status, body) = post(&app, "/api/v1/telemetry", &reading("ETCH-001", "WFR-0001", 181.2)).await;

    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["status"], "processed");
    assert_eq!(data["wafer_id"], "WFR-0001");
    assert_eq!(data["interlock_active"], false);
    assert_eq!(data["quarantine"]["outcome"], "not_required");
    assert_eq!(data["health"]["is_drifting"], false);
    assert_eq!(data["health"]["reason"], "Stable");
    assert_eq!(data["health"]["recommended_action"], "MONITOR");
    assert!(data["health_error"].is_null());
    assert!(app.safety_log.is_empty());
}

#[tokio::test]
async fn test_repeated_breach_quarantines_once() {
    let app = create_test_app();

    let (_, first) = post(&app, "/api/v1/telemetry", &reading("ETCH-001", "WFR-0001", 188.5)).await;
    let (_, second) = post(&app, "/api/v1/telemetry", &reading("ETCH-001", "WFR-0001", 189.0)).await;

    assert_eq!(first["data"]["interlock_active"], true);
    assert_eq!(first["data"]["quarantine"]["outcome"], "created");
    assert_eq!(first["data"]["safety_logged"], true);
    assert_eq!(second["data"]["interlock_active"], true);
    assert_eq!(second["data"]["quarantine"]["outcome"], "already_quarantined");
    assert_eq!(
        first["data"]["quarantine"]["detail"],
        second["data"]["quarantine"]["detail"]
    );

    let (status, body) = get(&app, "/api/v1/quarantine").await;
    assert_eq!(status, StatusCode::OK);
    let records = body["data"].as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["tool_id"], "ETCH-001");
    assert_eq!(records[0]["metric_name"], "temperature");
    assert_eq!(records[0]["violation_value"], 188.5);
    assert_eq!(records[0]["threshold_limit"], 188.0);
    assert_eq!(records[0]["is_cleared"], false);

    assert_eq!(app.safety_log.len(), 2);
}

#[tokio::test]
async fn test_threshold_is_strict() {
    let app = create_test_app();
    let (_, body) = post(&app, "/api/v1/telemetry", &reading("ETCH-001", "WFR-0001", 188.0)).await;
    assert_eq!(body["data"]["interlock_active"], false);
}

#[tokio::test]
async fn test_unknown_metric_is_rejected() {
    let app = create_test_app();
    let mut body = reading("ETCH-001", "WFR-0001", 181.0);
    body["metrics"]["humidity"] = json!(40.0);

    let (status, resp) = post(&app, "/api/v1/telemetry", &body).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(resp["error"]["code"], "UNPROCESSABLE_ENTITY");

    let (_, history) = get(&app, "/api/v1/history").await;
    assert!(history["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_field_and_malformed_json() {
    let app = create_test_app();
    let mut body = reading("ETCH-001", "WFR-0001", 181.0);
    body.as_object_mut().unwrap().remove("wafer_id");
    let (status, _) = post(&app, "/api/v1/telemetry", &body).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/telemetry")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, resp) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(resp["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_history_and_latest() {
    let app = create_test_app();
    for i in 1..=5 {
        let wafer = format!("WFR-{:04}", i);
        post(&app, "/api/v1/telemetry", &reading("ETCH-001", &wafer, 180.0 + i as f64 * 0.1)).await;
    }
    post(&app, "/api/v1/telemetry", &reading("ETCH-002", "WFR-0100", 175.0)).await;

    let (status, body) = get(&app, "/api/v1/history?tool_id=ETCH-001&metric=temperature&limit=3").await;
    assert_eq!(status, StatusCode::OK);
    let records = body["data"].as_array().unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r["metric"] == "temperature"));
    assert_eq!(records[2]["wafer_id"], "WFR-0005");

    let (_, all) = get(&app, "/api/v1/history").await;
    // 6 readings x 2 metrics
    assert_eq!(all["data"].as_array().unwrap().len(), 12);

    let (status, _) = get(&app, "/api/v1/history?metric=humidity").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, latest) = get(&app, "/api/v1/latest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest["data"]["wafer_id"], "WFR-0005");

    let (_, other) = get(&app, "/api/v1/latest?tool_id=ETCH-002").await;
    assert_eq!(other["data"]["wafer_id"], "WFR-0100");

    let (status, _) = get(&app, "/api/v1/latest?tool_id=CVD-404").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_spc_endpoint() {
    let app = create_test_app();
    let (status, body) = get(&app, "/api/v1/telemetry/spc/ETCH-001").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    for (i, t) in [180.0, 180.4, 179.8, 180.1, 180.3].iter().enumerate() {
        let wafer = format!("WFR-{:04}", i + 1);
        post(&app, "/api/v1/telemetry", &reading("ETCH-001", &wafer, *t)).await;
    }

    let (status, body) = get(&app, "/api/v1/telemetry/spc/ETCH-001").await;
    assert_eq!(status, StatusCode::OK);
    let chart = &body["data"];
    assert_eq!(chart["points"].as_array().unwrap().len(), 5);
    let ucl = chart["limits"]["ucl"].as_f64().unwrap();
    let lcl = chart["limits"]["lcl"].as_f64().unwrap();
    let mean = chart["limits"]["mean"].as_f64().unwrap();
    assert!(ucl >= mean && mean >= lcl);

    let (status, body) = get(&app, "/api/v1/telemetry/spc/ETCH-001?metric=pressure").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["limits"]["std_dev"], 0.0);
}

#[tokio::test]
async fn test_tool_health_endpoint() {
    let app = create_test_app();
    let (status, _) = get(&app, "/api/v1/health/ETCH-001").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    post(&app, "/api/v1/telemetry", &reading("ETCH-001", "WFR-0001", 180.0)).await;
    let (status, body) = get(&app, "/api/v1/health/ETCH-001").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["root_cause"], "NORMAL");
}

#[tokio::test]
async fn test_quarantine_reset() {
    let app = create_test_app();
    post(&app, "/api/v1/telemetry", &reading("ETCH-001", "WFR-0001", 190.0)).await;
    post(&app, "/api/v1/telemetry", &reading("ETCH-001", "WFR-0002", 190.0)).await;

    let (status, body) = post(&app, "/api/v1/quarantine/reset", &Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cleared"], 2);

    let (_, body) = get(&app, "/api/v1/quarantine").await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let entries = app.safety_log.entries();
    assert_eq!(entries.len(), 3);
    assert!(entries[2].message.starts_with("SYSTEM RESET | Action: Manual Override | State: Cleared"));

    // Reset on an empty set is still logged
    let (_, body) = post(&app, "/api/v1/quarantine/reset", &Value::Null).await;
    assert_eq!(body["data"]["cleared"], 0);
    assert_eq!(app.safety_log.len(), 4);
}

#[tokio::test]
async fn test_history_outage_keeps_interlock() {
    let app = create_test_app();
    app.telemetry.set_unavailable(true);

    let (status, body) = post(&app, "/api/v1/telemetry", &reading("ETCH-001", "WFR-0009", 191.0)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["interlock_active"], true);
    assert_eq!(body["data"]["quarantine"]["outcome"], "created");
    assert!(body["data"]["health"].is_null());
    assert!(body["data"]["health_error"].as_str().unwrap().contains("offline"));

    let (status, _) = get(&app, "/api/v1/history").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_status_counters() {
    let app = create_test_app();
    post(&app, "/api/v1/telemetry", &reading("ETCH-001", "WFR-0001", 181.0)).await;
    post(&app, "/api/v1/telemetry", &reading("ETCH-001", "WFR-0002", 189.0)).await;

    let (status, body) = get(&app, "/api/v1/status").await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["service"], "fab-sentinel");
    assert_eq!(data["interlock_threshold"], 188.0);
    assert_eq!(data["readings_processed"], 2);
    assert_eq!(data["interlocks_fired"], 1);
    assert_eq!(data["audit_failures"], 0);
    assert_eq!(data["safety_log_failures"], 0);
}
