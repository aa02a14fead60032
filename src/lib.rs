//! Fab Sentinel: Tool Health Analysis Pipeline
//!
//! Streaming telemetry from fab process tools in, two answers out per reading:
//!
//! - **Safety interlock**: hard stop when the primary thermal metric exceeds
//!   its limit, with a fail-safe log entry and an idempotent quarantine record
//! - **Health verdict**: remaining useful life, root cause and recommended
//!   countermeasure derived from the tool's recent history
//!
//! ## Layout
//!
//! - [`analysis`]: SPC, EMA baseline, RUL, root cause, countermeasures, orchestrator
//! - [`safety`]: interlock controller and fail-safe log sinks
//! - [`storage`]: telemetry and quarantine stores (sled, in-memory)
//! - [`pipeline`]: per-reading flow wiring the above together
//! - [`api`]: Axum transport

pub mod analysis;
pub mod api;
pub mod config;
pub mod pipeline;
pub mod safety;
pub mod storage;
pub mod types;

pub use config::SentinelConfig;
pub use pipeline::{IngestOutcome, PipelineError, PipelineStats, ToolHealthPipeline};
pub use safety::{FileSafetyLog, InterlockController, SafetyLogSink};
pub use storage::{QuarantineStore, StorageError, TelemetryStore};
pub use types::{Action, HealthVerdict, Metric, QuarantineRecord, Reading, RootCause};
