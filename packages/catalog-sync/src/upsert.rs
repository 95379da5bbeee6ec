//! Idempotent record persistence.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::traits::store::RecordStore;
use crate::types::record::{non_blank, RecordPayload, RecordUpsert, SyncStatus, UpsertAction};

/// Normalizes upstream payloads and upserts them keyed by external id.
///
/// Listing and detail payloads arrive on separate passes, so a payload that
/// carries no resources never blanks out resources written earlier by
/// enrichment. An empty resource list counts as "not supplied".
pub struct RecordUpserter<R: RecordStore> {
    store: Arc<R>,
    record_url_template: Option<String>,
}

impl<R: RecordStore> Clone for RecordUpserter<R> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            record_url_template: self.record_url_template.clone(),
        }
    }
}

impl<R: RecordStore> RecordUpserter<R> {
    pub fn new(store: Arc<R>) -> Self {
        Self {
            store,
            record_url_template: None,
        }
    }

    /// Build missing source URLs from a template with an `{id}` placeholder.
    pub fn with_record_url_template(mut self, template: impl Into<String>) -> Self {
        self.record_url_template = Some(template.into());
        self
    }

    /// Apply the name fallback chain and decide which fields the payload supplies.
    ///
    /// Fields the payload leaves blank stay `None`, so an update never
    /// replaces stored values with placeholders.
    pub fn normalize(&self, payload: &RecordPayload, category: &str) -> StoreResult<RecordUpsert> {
        let external_id = payload.external_id.trim();
        if external_id.is_empty() {
            return Err(StoreError::MissingExternalId);
        }

        let name = non_blank(payload.name.as_deref());
        let localized = non_blank(payload.name_localized.as_deref());

        let resources = payload.to_resources();
        let columns = payload.infer_columns();

        let source_url = match (non_blank(payload.source_url.as_deref()), &self.record_url_template) {
            (Some(url), _) => Some(url.to_string()),
            (None, Some(template)) => Some(template.replace("{id}", external_id)),
            (None, None) => None,
        };

        Ok(RecordUpsert {
            external_id: external_id.to_string(),
            name: name.or(localized).map(str::to_string),
            name_localized: localized.or(name).map(str::to_string),
            description: non_blank(payload.description.as_deref()).map(str::to_string),
            category: category.to_string(),
            source_url,
            resources: (!resources.is_empty()).then_some(resources),
            columns: (!columns.is_empty()).then_some(columns),
            sync_status: SyncStatus::Synced,
            synced_at: Utc::now(),
        })
    }

    /// Upsert one payload.
    ///
    /// A store failure is returned to the caller after a best-effort attempt
    /// to flag the record as failed; it never aborts the run.
    pub async fn upsert(&self, payload: &RecordPayload, category: &str) -> StoreResult<UpsertAction> {
        let record = self.normalize(payload, category)?;

        match self.store.upsert_record(&record).await {
            Ok(action) => {
                debug!(external_id = %record.external_id, ?action, "Record upserted");
                Ok(action)
            }
            Err(e) => {
                warn!(external_id = %record.external_id, error = %e, "Record upsert failed");
                if let Err(mark_err) = self.store.mark_failed(&record.external_id).await {
                    debug!(external_id = %record.external_id, error = %mark_err, "Could not mark record failed");
                }
                Err(e)
            }
        }
    }
}
