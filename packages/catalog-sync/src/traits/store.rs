//! Destination store trait.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::record::{Record, RecordUpsert, UpsertAction};

/// Relational-style record store keyed by external id.
///
/// Implementations must make `upsert_record` atomic and safe under
/// concurrent writers (workers share the store and take no locks of their
/// own), and must preserve `resources`/`columns` when the write leaves them
/// as `None`. See [`RecordUpsert::apply_to`] for the reference semantics.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert or update one record.
    async fn upsert_record(&self, record: &RecordUpsert) -> StoreResult<UpsertAction>;

    /// Get a record by external id.
    async fn get_record(&self, external_id: &str) -> StoreResult<Option<Record>>;

    /// Flag an existing record as failed. Unknown ids are ignored.
    async fn mark_failed(&self, external_id: &str) -> StoreResult<()>;

    /// Count records, optionally within one category.
    async fn count_records(&self, category: Option<&str>) -> StoreResult<usize>;
}
