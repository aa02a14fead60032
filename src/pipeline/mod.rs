//! Processing Pipeline Module
//!
//! ```text
//! Reading ──► Interlock (threshold, fail-safe log, quarantine audit)
//!        └──► Telemetry store ──► recent history ──► Health orchestrator
//! ```
//!
//! The interlock never waits on, or fails because of, the analysis branch.

mod service;

pub use service::{IngestOutcome, PipelineError, PipelineStats, ToolHealthPipeline};
