//! Listing page fetch trait.

use async_trait::async_trait;

use crate::error::FetchResult;
use crate::types::{page::PageResult, session::SessionContext};

/// Stateless paginated listing fetch for one category.
///
/// Implementations perform no retries; retry policy is layered on top by
/// [`SessionRefresher`](crate::refresher::SessionRefresher).
#[async_trait]
pub trait CategoryPager: Send + Sync {
    /// Fetch one zero-based page of a category.
    async fn fetch_page(
        &self,
        session: &SessionContext,
        category_id: &str,
        page: u32,
    ) -> FetchResult<PageResult>;

    /// Records requested per page. Fixed for the whole run.
    fn page_size(&self) -> u32;
}
