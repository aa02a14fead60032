//! Safety types: QuarantineRecord, NewQuarantine, InterlockDecision, AuditOutcome

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Metric;

/// Persistent audit entry for one interlock episode of a (tool, wafer) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineRecord {
    /// Store-assigned identifier
    pub id: u64,
    pub wafer_id: String,
    pub tool_id: String,
    pub metric_name: Metric,
    pub violation_value: f64,
    pub threshold_limit: f64,
    /// Creation time (assigned by the store)
    pub timestamp: DateTime<Utc>,
    /// Set later by an operator clearance workflow
    #[serde(default)]
    pub is_cleared: bool,
}

/// Insert payload for `QuarantineStore::insert_quarantine`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewQuarantine {
    pub wafer_id: String,
    pub tool_id: String,
    pub metric_name: Metric,
    pub violation_value: f64,
    pub threshold_limit: f64,
}

impl NewQuarantine {
    /// Materialize the record with a store-assigned id and creation time.
    pub fn into_record(self, id: u64, timestamp: DateTime<Utc>) -> QuarantineRecord {
        QuarantineRecord {
            id,
            wafer_id: self.wafer_id,
            tool_id: self.tool_id,
            metric_name: self.metric_name,
            violation_value: self.violation_value,
            threshold_limit: self.threshold_limit,
            timestamp,
            is_cleared: false,
        }
    }
}

/// What happened to the audit trail when the interlock fired.
///
/// Audit failures are recoverable: they are reported here and never
/// propagate as errors out of the interlock controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum AuditOutcome {
    /// Interlock did not fire
    NotRequired,
    /// New quarantine record created (id)
    Created(u64),
    /// Record for this (tool, wafer) already existed (id)
    AlreadyQuarantined(u64),
    /// Audit store write failed and was rolled back (reason)
    Failed(String),
}

/// Result of the hard interlock check for one reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterlockDecision {
    pub active: bool,
    pub audit: AuditOutcome,
    /// Whether the fail-safe log accepted the shutdown entry
    pub safety_logged: bool,
}

impl InterlockDecision {
    pub fn inactive() -> Self {
        Self {
            active: false,
            audit: AuditOutcome::NotRequired,
            safety_logged: false,
        }
    }
}
