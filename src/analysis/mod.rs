//! Tool health analytics
//!
//! Pure functions over metric series; no I/O. The orchestrator composes the
//! building blocks into a per-reading [`crate::types::HealthVerdict`].

pub mod baseline;
pub mod countermeasure;
pub mod orchestrator;
pub mod root_cause;
pub mod rul;
pub mod spc;

pub use baseline::adaptive_baseline;
pub use countermeasure::{recommend, CountermeasureParams};
pub use orchestrator::{assess_health, assess_health_at, build_telemetry_map, AnalysisParams, TelemetryMap};
pub use root_cause::{identify_root_cause, identify_root_cause_default, pearson};
pub use rul::{fit_trend, predict_remaining_life, RulParams, Trend};
pub use spc::{control_limits, evaluate as evaluate_spc};
