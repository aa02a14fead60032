//! API handlers
//!
//! All handlers return `Response` via [`ApiResponse::ok`] or [`ApiErrorResponse`].
//! Writes (ingest, reset) fsync the safety log and the database, so they run
//! on the blocking pool.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::config::defaults;
use crate::pipeline::{PipelineStats, ToolHealthPipeline};
use crate::types::{AuditOutcome, HealthVerdict, HistoryQuery, Metric, Reading};

/// Upper bound on `?limit=` for history queries
pub const MAX_HISTORY_LIMIT: usize = 1000;

/// Shared state for all handlers
#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<ToolHealthPipeline>,
    /// Tool used when `/latest` is called without `tool_id`
    pub default_tool_id: String,
    pub started_at: Instant,
}

impl ApiState {
    pub fn new(pipeline: Arc<ToolHealthPipeline>, default_tool_id: impl Into<String>) -> Self {
        Self {
            pipeline,
            default_tool_id: default_tool_id.into(),
            started_at: Instant::now(),
        }
    }
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct TelemetryAck {
    pub status: &'static str,
    pub wafer_id: String,
    pub interlock_active: bool,
    pub quarantine: AuditOutcome,
    pub safety_logged: bool,
    pub health: Option<HealthVerdict>,
    pub health_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResetAck {
    pub cleared: usize,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub interlock_threshold: f64,
    #[serde(flatten)]
    pub stats: PipelineStats,
}

#[derive(Debug, Serialize)]
pub struct Banner {
    pub message: &'static str,
    pub version: &'static str,
}

// ============================================================================
// Query types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    #[serde(default)]
    pub tool_id: Option<String>,
    #[serde(default)]
    pub metric: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ToolParams {
    #[serde(default)]
    pub tool_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MetricParams {
    #[serde(default)]
    pub metric: Option<String>,
}

fn parse_metric(raw: Option<&str>) -> Result<Option<Metric>, Response> {
    raw.map(|m| m.parse::<Metric>())
        .transpose()
        .map_err(|e| ApiErrorResponse::bad_request(e.to_string()))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /
pub async fn root() -> Response {
    ApiResponse::ok(Banner {
        message: "Fab Sentinel API is operational",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// POST /api/v1/telemetry
pub async fn post_telemetry(
    State(state): State<ApiState>,
    payload: Result<Json<Reading>, JsonRejection>,
) -> Response {
    let reading = match payload {
        Ok(Json(reading)) => reading,
        Err(rejection) if rejection.status() == StatusCode::UNPROCESSABLE_ENTITY => {
            return ApiErrorResponse::unprocessable(rejection.body_text());
        }
        Err(rejection) => return ApiErrorResponse::bad_request(rejection.body_text()),
    };

    let pipeline = Arc::clone(&state.pipeline);
    let outcome = match tokio::task::spawn_blocking(move || {
        let outcome = pipeline.ingest(&reading);
        (reading.wafer_id, outcome)
    })
    .await
    {
        Ok(result) => result,
        Err(e) => return ApiErrorResponse::internal(format!("Ingest task failed: {e}")),
    };
    let (wafer_id, outcome) = outcome;

    let (health, health_error) = match outcome.health {
        Ok(verdict) => (Some(verdict), None),
        Err(e) => (None, Some(e.to_string())),
    };

    ApiResponse::ok(TelemetryAck {
        status: "processed",
        wafer_id,
        interlock_active: outcome.interlock.active,
        quarantine: outcome.interlock.audit,
        safety_logged: outcome.interlock.safety_logged,
        health,
        health_error,
    })
}

/// GET /api/v1/history?tool_id=ETCH-001&metric=temperature&limit=50
pub async fn get_history(State(state): State<ApiState>, Query(q): Query<HistoryParams>) -> Response {
    let metric = match parse_metric(q.metric.as_deref()) {
        Ok(metric) => metric,
        Err(resp) => return resp,
    };
    let query = HistoryQuery {
        tool_id: q.tool_id,
        metric,
        limit: q.limit.unwrap_or(defaults::HISTORY_API_LIMIT).min(MAX_HISTORY_LIMIT),
        since: None,
    };

    match state.pipeline.history(&query) {
        Ok(records) => ApiResponse::ok(records),
        Err(e) => ApiErrorResponse::service_unavailable(e.to_string()),
    }
}

/// GET /api/v1/latest?tool_id=ETCH-001
pub async fn get_latest(State(state): State<ApiState>, Query(q): Query<ToolParams>) -> Response {
    let tool_id = q.tool_id.unwrap_or_else(|| state.default_tool_id.clone());
    match state.pipeline.latest_reading(&tool_id) {
        Ok(Some(reading)) => ApiResponse::ok(reading),
        Ok(None) => ApiErrorResponse::not_found(format!("No readings for tool {tool_id}")),
        Err(e) => ApiErrorResponse::service_unavailable(e.to_string()),
    }
}

/// GET /api/v1/quarantine
pub async fn get_quarantine(State(state): State<ApiState>) -> Response {
    match state.pipeline.quarantine_records() {
        Ok(records) => ApiResponse::ok(records),
        Err(e) => ApiErrorResponse::service_unavailable(e.to_string()),
    }
}

/// POST /api/v1/quarantine/reset
pub async fn reset_quarantine(State(state): State<ApiState>) -> Response {
    let pipeline = Arc::clone(&state.pipeline);
    match tokio::task::spawn_blocking(move || pipeline.reset_quarantine()).await {
        Ok(Ok(cleared)) => ApiResponse::ok(ResetAck { cleared }),
        Ok(Err(e)) => ApiErrorResponse::service_unavailable(e.to_string()),
        Err(e) => ApiErrorResponse::internal(format!("Reset task failed: {e}")),
    }
}

/// GET /api/v1/telemetry/spc/:tool_id?metric=temperature
pub async fn get_spc(
    State(state): State<ApiState>,
    Path(tool_id): Path<String>,
    Query(q): Query<MetricParams>,
) -> Response {
    let metric = match parse_metric(q.metric.as_deref()) {
        Ok(metric) => metric.unwrap_or(Metric::PRIMARY),
        Err(resp) => return resp,
    };

    match state.pipeline.spc_chart(&tool_id, metric) {
        Ok(chart) if chart.is_empty() => {
            ApiErrorResponse::not_found(format!("No {metric} telemetry for tool {tool_id}"))
        }
        Ok(chart) => ApiResponse::ok(chart),
        Err(e) => ApiErrorResponse::service_unavailable(e.to_string()),
    }
}

/// GET /api/v1/health/:tool_id
pub async fn get_tool_health(State(state): State<ApiState>, Path(tool_id): Path<String>) -> Response {
    match state.pipeline.assess_tool(&tool_id) {
        Ok(Some(verdict)) => ApiResponse::ok(verdict),
        Ok(None) => ApiErrorResponse::not_found(format!("No readings for tool {tool_id}")),
        Err(e) => ApiErrorResponse::service_unavailable(e.to_string()),
    }
}

/// GET /api/v1/status
pub async fn get_status(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(StatusResponse {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        interlock_threshold: state.pipeline.interlock_threshold(),
        stats: state.pipeline.stats(),
    })
}
