//! Safety Interlock Controller
//!
//! Hard stop on the primary thermal metric, evaluated before (and
//! independently of) any predictive analysis. On activation:
//!
//! 1. the fail-safe log gets a CRITICAL entry, before anything touches the
//!    audit database
//! 2. a quarantine record is created for the (tool, wafer) pair unless one
//!    already exists; the check and the insert run under a per-pair lock, and
//!    the store itself refuses a second record for a pair
//! 3. audit failures are absorbed into [`AuditOutcome::Failed`]; the caller
//!    always learns that the interlock is active

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{error, info, warn};

use super::safety_log::{SafetyLevel, SafetyLogEntry, SafetyLogSink};
use crate::storage::{QuarantineStore, StorageError};
use crate::types::{AuditOutcome, InterlockDecision, Metric, NewQuarantine, Reading};

/// Counters exposed on the status endpoint.
#[derive(Debug, Default)]
pub struct InterlockCounters {
    activations: AtomicU64,
    audit_failures: AtomicU64,
    safety_log_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InterlockCountersSnapshot {
    pub activations: u64,
    pub audit_failures: u64,
    pub safety_log_failures: u64,
}

impl InterlockCounters {
    pub fn snapshot(&self) -> InterlockCountersSnapshot {
        InterlockCountersSnapshot {
            activations: self.activations.load(Ordering::Relaxed),
            audit_failures: self.audit_failures.load(Ordering::Relaxed),
            safety_log_failures: self.safety_log_failures.load(Ordering::Relaxed),
        }
    }
}

type PairKey = (String, String);

pub struct InterlockController {
    quarantine: Arc<dyn QuarantineStore>,
    safety_log: Arc<dyn SafetyLogSink>,
    threshold: f64,
    /// Held only while a pair is being audited; entries are pruned afterwards
    pair_locks: DashMap<PairKey, Arc<Mutex<()>>>,
    /// Audits take the read side, `reset` the write side
    reset_gate: RwLock<()>,
    counters: InterlockCounters,
}

impl InterlockController {
    pub fn new(quarantine: Arc<dyn QuarantineStore>, safety_log: Arc<dyn SafetyLogSink>, threshold: f64) -> Self {
        Self {
            quarantine,
            safety_log,
            threshold,
            pair_locks: DashMap::new(),
            reset_gate: RwLock::new(()),
            counters: InterlockCounters::default(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn counters(&self) -> InterlockCountersSnapshot {
        self.counters.snapshot()
    }

    /// Strictly above the threshold trips the interlock.
    pub fn is_breach(&self, reading: &Reading) -> bool {
        reading.primary_value() > self.threshold
    }

    /// Run the interlock for one reading. Never fails.
    pub fn evaluate(&self, reading: &Reading) -> InterlockDecision {
        if !self.is_breach(reading) {
            return InterlockDecision::inactive();
        }
        self.counters.activations.fetch_add(1, Ordering::Relaxed);

        let value = reading.primary_value();
        let entry = SafetyLogEntry::shutdown(&reading.tool_id, &reading.wafer_id, Metric::PRIMARY, value, self.threshold);
        let safety_logged = self.write_safety_log(&entry);

        let audit = self.record_quarantine(reading, value);

        InterlockDecision {
            active: true,
            audit,
            safety_logged,
        }
    }

    /// Clear every quarantine record and log the reset.
    ///
    /// A failed delete leaves the store untouched and is returned; the reset
    /// is logged only once it has happened.
    pub fn reset(&self) -> Result<usize, StorageError> {
        let cleared = {
            let _gate = self.reset_gate.write().unwrap_or_else(PoisonError::into_inner);
            self.quarantine.delete_all_quarantine()?
        };
        self.write_safety_log(&SafetyLogEntry::reset(cleared));
        Ok(cleared)
    }

    fn record_quarantine(&self, reading: &Reading, value: f64) -> AuditOutcome {
        let result = {
            let _gate = self.reset_gate.read().unwrap_or_else(PoisonError::into_inner);
            let key = (reading.tool_id.clone(), reading.wafer_id.clone());
            let lock = self.pair_locks.entry(key.clone()).or_default().clone();
            let result = {
                let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
                self.find_or_insert(reading, value)
            };
            drop(lock);
            // Nobody else holds or waits on it once only the map's handle is left
            self.pair_locks.remove_if(&key, |_, l| Arc::strong_count(l) == 1);
            result
        };

        match result {
            Ok(outcome) => {
                if let AuditOutcome::Created(id) = outcome {
                    info!(id, tool_id = %reading.tool_id, wafer_id = %reading.wafer_id, "Wafer quarantined");
                }
                outcome
            }
            Err(e) => {
                self.counters.audit_failures.fetch_add(1, Ordering::Relaxed);
                warn!(
                    tool_id = %reading.tool_id,
                    wafer_id = %reading.wafer_id,
                    backend = self.quarantine.backend_name(),
                    error = %e,
                    "Quarantine audit failed; interlock remains active"
                );
                AuditOutcome::Failed(e.to_string())
            }
        }
    }

    fn find_or_insert(&self, reading: &Reading, value: f64) -> Result<AuditOutcome, StorageError> {
        self.quarantine
            .find_quarantine(&reading.tool_id, &reading.wafer_id)
            .and_then(|existing| match existing {
                Some(record) => Ok(AuditOutcome::AlreadyQuarantined(record.id)),
                None => self
                    .quarantine
                    .insert_quarantine(NewQuarantine {
                        wafer_id: reading.wafer_id.clone(),
                        tool_id: reading.tool_id.clone(),
                        metric_name: Metric::PRIMARY,
                        violation_value: value,
                        threshold_limit: self.threshold,
                    })
                    .map(|record| AuditOutcome::Created(record.id))
                    .or_else(|e| match e {
                        StorageError::Duplicate(id) => Ok(AuditOutcome::AlreadyQuarantined(id)),
                        other => Err(other),
                    }),
            })
    }

    /// Write to the fail-safe sink and mirror to tracing. Returns whether the
    /// sink accepted the entry.
    fn write_safety_log(&self, entry: &SafetyLogEntry) -> bool {
        match entry.level {
            SafetyLevel::Critical => error!(target: "safety", "{}", entry.message),
            SafetyLevel::Info => info!(target: "safety", "{}", entry.message),
        }

        match self.safety_log.append(entry) {
            Ok(()) => true,
            Err(e) => {
                self.counters.safety_log_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    target: "safety",
                    escalate = true,
                    sink = %self.safety_log.describe(),
                    error = %e,
                    "SAFETY LOG WRITE FAILED: {}",
                    entry.message
                );
                false
            }
        }
    }
}
