//! In-memory record storage for testing and development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::StoreResult;
use crate::traits::store::RecordStore;
use crate::types::record::{Record, RecordUpsert, SyncStatus, UpsertAction};

/// In-memory record store.
///
/// Useful for testing and development. Not suitable for production
/// as data is lost on restart.
pub struct MemoryStore {
    records: RwLock<HashMap<String, Record>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    /// Clear all stored records.
    pub fn clear(&self) {
        self.records.write().unwrap().clear();
    }

    /// Get the number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All records, ordered by external id.
    pub fn records(&self) -> Vec<Record> {
        let mut records: Vec<_> = self.records.read().unwrap().values().cloned().collect();
        records.sort_by(|a, b| a.external_id.cmp(&b.external_id));
        records
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn upsert_record(&self, record: &RecordUpsert) -> StoreResult<UpsertAction> {
        let mut records = self.records.write().unwrap();
        let existing = records.get(&record.external_id);
        let action = if existing.is_some() {
            UpsertAction::Updated
        } else {
            UpsertAction::Inserted
        };

        let merged = record.apply_to(existing);
        records.insert(record.external_id.clone(), merged);
        Ok(action)
    }

    async fn get_record(&self, external_id: &str) -> StoreResult<Option<Record>> {
        Ok(self.records.read().unwrap().get(external_id).cloned())
    }

    async fn mark_failed(&self, external_id: &str) -> StoreResult<()> {
        if let Some(record) = self.records.write().unwrap().get_mut(external_id) {
            record.sync_status = SyncStatus::Failed;
        }
        Ok(())
    }

    async fn count_records(&self, category: Option<&str>) -> StoreResult<usize> {
        let records = self.records.read().unwrap();
        Ok(match category {
            Some(category) => records.values().filter(|r| r.category == category).count(),
            None => records.len(),
        })
    }
}
