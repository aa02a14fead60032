//! API route definitions
//!
//! - POST /api/v1/telemetry - ingest one reading (interlock + health)
//! - GET  /api/v1/history - flattened recent readings
//! - GET  /api/v1/latest - newest reading of a tool
//! - GET  /api/v1/quarantine - audit records, newest first
//! - POST /api/v1/quarantine/reset - operator reset
//! - GET  /api/v1/telemetry/spc/:tool_id - control chart
//! - GET  /api/v1/health/:tool_id - health verdict for the latest reading
//! - GET  /api/v1/status - pipeline counters

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{self, ApiState};

pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/telemetry", post(handlers::post_telemetry))
        .route("/telemetry/spc/:tool_id", get(handlers::get_spc))
        .route("/history", get(handlers::get_history))
        .route("/latest", get(handlers::get_latest))
        .route("/quarantine", get(handlers::get_quarantine))
        .route("/quarantine/reset", post(handlers::reset_quarantine))
        .route("/health/:tool_id", get(handlers::get_tool_health))
        .route("/status", get(handlers::get_status))
        .with_state(state)
}
