//! Listing page types.

use serde::{Deserialize, Serialize};

use super::record::RecordPayload;

/// The listing endpoint's response envelope.
///
/// A body that does not parse into this shape is a block page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingEnvelope {
    pub total_elements: u64,
    pub content: Vec<RecordPayload>,
}

/// One successfully fetched listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageResult {
    /// Total records in the category, as reported by this page
    pub total_elements: u64,

    /// Records on this page
    pub records: Vec<RecordPayload>,
}

impl PageResult {
    pub fn new(total_elements: u64, records: Vec<RecordPayload>) -> Self {
        Self {
            total_elements,
            records,
        }
    }

    /// Number of pages needed for `total_elements` at `page_size`.
    pub fn total_pages(&self, page_size: u32) -> u32 {
        total_pages(self.total_elements, page_size)
    }
}

impl From<ListingEnvelope> for PageResult {
    fn from(envelope: ListingEnvelope) -> Self {
        Self::new(envelope.total_elements, envelope.content)
    }
}

/// `ceil(total_elements / page_size)`, saturating at `u32::MAX`.
pub fn total_pages(total_elements: u64, page_size: u32) -> u32 {
    if page_size == 0 {
        return 0;
    }
    let pages = total_elements.div_ceil(u64::from(page_size));
    u32::try_from(pages).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_pages() {
        assert_eq!(total_pages(250, 100), 3);
        assert_eq!(total_pages(200, 100), 2);
        assert_eq!(total_pages(1, 100), 1);
        assert_eq!(total_pages(0, 100), 0);
        assert_eq!(total_pages(10, 0), 0);
    }
}
