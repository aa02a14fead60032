//! Shared data structures for the tool health analysis pipeline
//!
//! - Telemetry: Metric vocabulary, Reading, history records
//! - Analysis: SPC chart, root-cause verdict, countermeasure action, health verdict
//! - Safety: quarantine audit records and interlock decisions

mod analysis;
mod safety;
mod telemetry;

pub use analysis::*;
pub use safety::*;
pub use telemetry::*;
