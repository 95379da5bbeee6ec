//! Per-record detail fetch trait.

use async_trait::async_trait;

use crate::error::FetchResult;
use crate::types::{record::RecordPayload, session::SessionContext};

/// Fetches the full record, including resources and inferred schema.
#[async_trait]
pub trait DetailSource: Send + Sync {
    async fn fetch_detail(
        &self,
        session: &SessionContext,
        external_id: &str,
    ) -> FetchResult<RecordPayload>;
}
