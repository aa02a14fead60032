//! Safety layer: hard interlock and the fail-safe log it writes to

mod interlock;
mod safety_log;

pub use interlock::{InterlockController, InterlockCounters, InterlockCountersSnapshot};
pub use safety_log::{FileSafetyLog, MemorySafetyLog, SafetyLevel, SafetyLogEntry, SafetyLogError, SafetyLogSink};
