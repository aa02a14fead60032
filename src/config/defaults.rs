//! System-wide default constants.
//!
//! Grouped by subsystem. `SentinelConfig` uses these as serde defaults, so a
//! missing `sentinel.toml` reproduces exactly this behavior.

// ============================================================================
// Safety interlock
// ============================================================================

/// Hard thermal limit (°C). Strictly exceeding it fires the interlock.
pub const INTERLOCK_THRESHOLD: f64 = 188.0;

// ============================================================================
// Remaining useful life
// ============================================================================

/// Failure threshold the RUL forecast extrapolates toward (°C).
pub const RUL_FAILURE_THRESHOLD: f64 = 188.0;

/// Minimum observations before a trend is fitted.
pub const RUL_MIN_SAMPLES: usize = 10;

/// A tool whose last sample is older than this is not actively monitored (seconds).
pub const RUL_FRESHNESS_SECS: f64 = 10.0;

/// Slopes at or below this rate (units/second) are not failures in progress.
pub const RUL_CONCERNING_SLOPE: f64 = 0.005;

// ============================================================================
// Adaptive baseline / root cause / countermeasures
// ============================================================================

/// EMA smoothing factor.
pub const BASELINE_ALPHA: f64 = 0.15;

/// |r| must exceed this for a metric to count as a contributing factor.
pub const CORRELATION_THRESHOLD: f64 = 0.7;

/// RUL below this (seconds) demands an emergency stop.
pub const EMERGENCY_RUL_SECS: f64 = 30.0;

/// Deviation from baseline above which coolant is increased.
pub const COOLANT_SEVERITY: f64 = 5.0;

// ============================================================================
// History window
// ============================================================================

/// Readings fetched per tool for health analysis.
pub const HISTORY_WINDOW: usize = 100;

/// Readings older than this are ignored by history queries (seconds).
pub const HISTORY_LOOKBACK_SECS: i64 = 3_600;

/// Upper bound accepted for `history.lookback_secs` (30 days).
pub const MAX_HISTORY_LOOKBACK_SECS: i64 = 30 * 24 * 3_600;

/// Default record limit for the history endpoint.
pub const HISTORY_API_LIMIT: usize = 50;

// ============================================================================
// Storage / server
// ============================================================================

pub const DATA_DIR: &str = "./data";

pub const SAFETY_LOG_DIR: &str = "./logs";

pub const SERVER_ADDR: &str = "0.0.0.0:8000";

/// Tool served by `/latest` when no `tool_id` is given.
pub const DEFAULT_TOOL_ID: &str = "ETCH-001";
