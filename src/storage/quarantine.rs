//! Quarantine audit trail
//!
//! Sled layout: `quarantine` tree holds JSON records under big-endian ids
//! (newest last); `quarantine_index` maps `tool_id ‖ 0xFF ‖ wafer_id` to the
//! record id. Both trees change together inside one sled transaction, so a
//! failed write leaves neither behind. The index is checked inside the same
//! transaction: at most one record per pair, whatever the caller does.

use chrono::Utc;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionResult};
use sled::Transactional;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use super::StorageError;
use crate::types::{NewQuarantine, QuarantineRecord};

const RECORDS_TREE: &str = "quarantine";
const INDEX_TREE: &str = "quarantine_index";

/// Audit collaborator of the interlock controller.
pub trait QuarantineStore: Send + Sync {
    /// Record for this (tool, wafer) pair, if one exists
    fn find_quarantine(&self, tool_id: &str, wafer_id: &str) -> Result<Option<QuarantineRecord>, StorageError>;

    /// Persist a new record; assigns id and creation time.
    /// Fails with [`StorageError::Duplicate`] if the pair already has one.
    fn insert_quarantine(&self, record: NewQuarantine) -> Result<QuarantineRecord, StorageError>;

    /// Remove every record, returning how many were removed
    fn delete_all_quarantine(&self) -> Result<usize, StorageError>;

    /// All records, newest first
    fn list_quarantine(&self) -> Result<Vec<QuarantineRecord>, StorageError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

fn pair_key(tool_id: &str, wafer_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(tool_id.len() + wafer_id.len() + 1);
    key.extend_from_slice(tool_id.as_bytes());
    key.push(0xFF);
    key.extend_from_slice(wafer_id.as_bytes());
    key
}

fn id_from_bytes(bytes: &[u8]) -> Result<u64, StorageError> {
    <[u8; 8]>::try_from(bytes)
        .map(u64::from_be_bytes)
        .map_err(|_| StorageError::Database(format!("corrupt quarantine id ({} bytes)", bytes.len())))
}

fn transaction_error(err: TransactionError<()>) -> StorageError {
    match err {
        TransactionError::Storage(e) => StorageError::Database(e.to_string()),
        TransactionError::Abort(()) => StorageError::Transaction("aborted".to_string()),
    }
}

// ============================================================================
// Sled backend
// ============================================================================

/// Sled-backed quarantine store
#[derive(Clone)]
pub struct SledQuarantineStore {
    db: Arc<sled::Db>,
    records: sled::Tree,
    index: sled::Tree,
}

impl SledQuarantineStore {
    pub fn new(db: Arc<sled::Db>) -> Result<Self, StorageError> {
        let records = db.open_tree(RECORDS_TREE)?;
        let index = db.open_tree(INDEX_TREE)?;
        Ok(Self { db, records, index })
    }
}

impl QuarantineStore for SledQuarantineStore {
    fn find_quarantine(&self, tool_id: &str, wafer_id: &str) -> Result<Option<QuarantineRecord>, StorageError> {
        let Some(id) = self.index.get(pair_key(tool_id, wafer_id))? else {
            return Ok(None);
        };
        match self.records.get(id)? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn insert_quarantine(&self, record: NewQuarantine) -> Result<QuarantineRecord, StorageError> {
        let id = self.db.generate_id()?;
        let pair = pair_key(&record.tool_id, &record.wafer_id);
        let record = record.into_record(id, Utc::now());
        let value = serde_json::to_vec(&record)?;
        let id_key = id.to_be_bytes();

        let result: TransactionResult<(), Vec<u8>> = (&self.records, &self.index).transaction(|(records, index)| {
            if let Some(existing) = index.get(pair.as_slice())? {
                return Err(ConflictableTransactionError::Abort(existing.to_vec()));
            }
            records.insert(&id_key[..], value.as_slice())?;
            index.insert(pair.as_slice(), &id_key[..])?;
            Ok(())
        });
        match result {
            Ok(()) => {}
            Err(TransactionError::Abort(existing)) => {
                return Err(StorageError::Duplicate(id_from_bytes(&existing)?));
            }
            Err(TransactionError::Storage(e)) => return Err(e.into()),
        }
        self.db.flush()?;

        tracing::debug!(id, tool_id = %record.tool_id, wafer_id = %record.wafer_id, "Quarantine record stored");
        Ok(record)
    }

    fn delete_all_quarantine(&self) -> Result<usize, StorageError> {
        let ids = self
            .records
            .iter()
            .keys()
            .collect::<Result<Vec<_>, _>>()?;
        let pairs = self
            .index
            .iter()
            .keys()
            .collect::<Result<Vec<_>, _>>()?;

        let result: TransactionResult<(), ()> = (&self.records, &self.index).transaction(|(records, index)| {
            for id in &ids {
                records.remove(&id[..])?;
            }
            for pair in &pairs {
                index.remove(&pair[..])?;
            }
            Ok(())
        });
        result.map_err(transaction_error)?;
        self.db.flush()?;

        Ok(ids.len())
    }

    fn list_quarantine(&self) -> Result<Vec<QuarantineRecord>, StorageError> {
        self.records
            .iter()
            .rev()
            .map(|item| -> Result<QuarantineRecord, StorageError> {
                let (_key, value) = item?;
                Ok(serde_json::from_slice(&value)?)
            })
            .collect()
    }

    fn backend_name(&self) -> &'static str {
        "Sled"
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// In-memory quarantine store
///
/// `set_unavailable(true)` simulates an audit database outage: every call
/// fails with [`StorageError::Unavailable`]. `set_insert_failing(true)` fails
/// only inserts, so lookups still succeed.
#[derive(Default)]
pub struct InMemoryQuarantineStore {
    records: RwLock<Vec<QuarantineRecord>>,
    next_id: AtomicU64,
    unavailable: AtomicBool,
    insert_failing: AtomicBool,
}

impl InMemoryQuarantineStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn set_insert_failing(&self, failing: bool) {
        self.insert_failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable("audit store offline".to_string()));
        }
        Ok(())
    }
}

impl QuarantineStore for InMemoryQuarantineStore {
    fn find_quarantine(&self, tool_id: &str, wafer_id: &str) -> Result<Option<QuarantineRecord>, StorageError> {
        self.check_available()?;
        let store = self
            .records
            .read()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(store
            .iter()
            .find(|r| r.tool_id == tool_id && r.wafer_id == wafer_id)
            .cloned())
    }

    fn insert_quarantine(&self, record: NewQuarantine) -> Result<QuarantineRecord, StorageError> {
        self.check_available()?;
        if self.insert_failing.load(Ordering::SeqCst) {
            return Err(StorageError::Transaction("insert rejected, rolled back".to_string()));
        }
        let mut store = self
            .records
            .write()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        if let Some(existing) = store
            .iter()
            .find(|r| r.tool_id == record.tool_id && r.wafer_id == record.wafer_id)
        {
            return Err(StorageError::Duplicate(existing.id));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = record.into_record(id, Utc::now());
        store.push(record.clone());
        Ok(record)
    }

    fn delete_all_quarantine(&self) -> Result<usize, StorageError> {
        self.check_available()?;
        let mut store = self
            .records
            .write()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        let removed = store.len();
        store.clear();
        Ok(removed)
    }

    fn list_quarantine(&self) -> Result<Vec<QuarantineRecord>, StorageError> {
        self.check_available()?;
        let store = self
            .records
            .read()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        Ok(store.iter().rev().cloned().collect())
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}
