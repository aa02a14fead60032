//! Reading time-series storage
//!
//! Key layout of the sled tree: `tool_id ‖ 0xFF ‖ timestamp (µs, order-preserving
//! big-endian) ‖ sequence`. One prefix scan per tool yields its readings in
//! chronological order; 0xFF never occurs in UTF-8 so tool prefixes never
//! overlap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use super::StorageError;
use crate::types::{HistoryQuery, HistoryRecord, Reading};

const READINGS_TREE: &str = "readings";
const TOOL_SEPARATOR: u8 = 0xFF;

/// Time-series collaborator of the pipeline.
pub trait TelemetryStore: Send + Sync {
    /// Durably record one reading
    fn append_reading(&self, reading: &Reading) -> Result<(), StorageError>;

    /// Most recent `query.limit` readings matching the filter, flattened to one
    /// record per metric, oldest first
    fn recent_readings(&self, query: &HistoryQuery) -> Result<Vec<HistoryRecord>, StorageError>;

    /// Newest reading of a tool
    fn latest_reading(&self, tool_id: &str) -> Result<Option<Reading>, StorageError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

fn matches(reading: &Reading, query: &HistoryQuery) -> bool {
    if let Some(tool_id) = &query.tool_id {
        if &reading.tool_id != tool_id {
            return false;
        }
    }
    if let Some(metric) = query.metric {
        if reading.metric(metric).is_none() {
            return false;
        }
    }
    query.since.map_or(true, |since| reading.timestamp >= since)
}

/// Flatten chronological readings, keeping only the queried metric if any.
fn flatten(readings: &[Reading], query: &HistoryQuery) -> Vec<HistoryRecord> {
    readings
        .iter()
        .flat_map(HistoryRecord::from_reading)
        .filter(|record| {
            query
                .metric
                .map_or(true, |metric| record.metric == metric.as_str())
        })
        .collect()
}

// ============================================================================
// Sled backend
// ============================================================================

/// Sled-backed reading store
#[derive(Clone)]
pub struct SledTelemetryStore {
    db: Arc<sled::Db>,
    tree: sled::Tree,
}

impl SledTelemetryStore {
    pub fn new(db: Arc<sled::Db>) -> Result<Self, StorageError> {
        let tree = db.open_tree(READINGS_TREE)?;
        Ok(Self { db, tree })
    }

    fn tool_prefix(tool_id: &str) -> Vec<u8> {
        let mut prefix = Vec::with_capacity(tool_id.len() + 1);
        prefix.extend_from_slice(tool_id.as_bytes());
        prefix.push(TOOL_SEPARATOR);
        prefix
    }

    fn key(&self, reading: &Reading) -> Result<Vec<u8>, StorageError> {
        // Flip the sign bit so negative epochs still sort before positive ones
        let micros = (reading.timestamp.timestamp_micros() as u64) ^ (1 << 63);
        let seq = self.db.generate_id()?;

        let mut key = Self::tool_prefix(&reading.tool_id);
        key.extend_from_slice(&micros.to_be_bytes());
        key.extend_from_slice(&seq.to_be_bytes());
        Ok(key)
    }

    /// Number of stored readings across all tools
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

impl TelemetryStore for SledTelemetryStore {
    fn append_reading(&self, reading: &Reading) -> Result<(), StorageError> {
        let key = self.key(reading)?;
        let value = serde_json::to_vec(reading)?;
        self.tree.insert(key, value)?;
        // Durable before the caller moves on to analysis
        self.tree.flush()?;
        Ok(())
    }

    fn recent_readings(&self, query: &HistoryQuery) -> Result<Vec<HistoryRecord>, StorageError> {
        if query.limit == 0 {
            return Ok(Vec::new());
        }

        let mut selected = Vec::with_capacity(query.limit);
        match &query.tool_id {
            Some(tool_id) => {
                // Newest first within the tool; stop at the lookback horizon
                for item in self.tree.scan_prefix(Self::tool_prefix(tool_id)).rev() {
                    let (_key, value) = item?;
                    let reading: Reading = serde_json::from_slice(&value)?;
                    if query.since.is_some_and(|since| reading.timestamp < since) {
                        break;
                    }
                    if matches(&reading, query) {
                        selected.push(reading);
                        if selected.len() >= query.limit {
                            break;
                        }
                    }
                }
                selected.reverse();
            }
            None => {
                for item in self.tree.iter() {
                    let (_key, value) = item?;
                    let reading: Reading = serde_json::from_slice(&value)?;
                    if matches(&reading, query) {
                        selected.push(reading);
                    }
                }
                selected.sort_by_key(|r| r.timestamp);
                let skip = selected.len().saturating_sub(query.limit);
                selected.drain(..skip);
            }
        }

        Ok(flatten(&selected, query))
    }

    fn latest_reading(&self, tool_id: &str) -> Result<Option<Reading>, StorageError> {
        match self.tree.scan_prefix(Self::tool_prefix(tool_id)).next_back() {
            Some(item) => {
                let (_key, value) = item?;
                Ok(Some(serde_json::from_slice(&value)?))
            }
            None => Ok(None),
        }
    }

    fn backend_name(&self) -> &'static str {
        "Sled"
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// In-memory reading store for tests and minimal deployments
///
/// Thread-safe via `RwLock`. Not durable. `set_unavailable(true)` makes every
/// call fail, simulating an outage of the time-series database.
#[derive(Default)]
pub struct InMemoryTelemetryStore {
    readings: RwLock<Vec<Reading>>,
    unavailable: AtomicBool,
}

impl InMemoryTelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("telemetry store offline".to_string()));
        }
        Ok(())
    }
}

impl TelemetryStore for InMemoryTelemetryStore {
    fn append_reading(&self, reading: &Reading) -> Result<(), StorageError> {
        self.check_available()?;
        let mut store = self
            .readings
            .write()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        store.push(reading.clone());
        Ok(())
    }

    fn recent_readings(&self, query: &HistoryQuery) -> Result<Vec<HistoryRecord>, StorageError> {
        self.check_available()?;
        let store = self
            .readings
            .read()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        let mut selected: Vec<Reading> = store.iter().filter(|r| matches(r, query)).cloned().collect();
        selected.sort_by_key(|r| r.timestamp);
        let skip = selected.len().saturating_sub(query.limit);
        selected.drain(..skip);

        Ok(flatten(&selected, query))
    }

    fn latest_reading(&self, tool_id: &str) -> Result<Option<Reading>, StorageError> {
        self.check_available()?;
        let store = self
            .readings
            .read()
            .map_err(|e| StorageError::Database(e.to_string()))?;

        // max_by_key keeps the last of equal timestamps, i.e. the latest arrival
        Ok(store
            .iter()
            .filter(|r| r.tool_id == tool_id)
            .max_by_key(|r| r.timestamp)
            .cloned())
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}
