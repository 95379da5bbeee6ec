//! Catalog categories - the static unit of partitioning.

use serde::{Deserialize, Serialize};

/// One category of the upstream catalog.
///
/// Categories are static configuration: the list is fixed at worker start
/// and never discovered mid-run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    /// Upstream category identifier used as the listing filter
    pub id: String,

    /// Human-readable name, for logs and reports
    pub display_name: String,

    /// Record count the category is expected to hold, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_count: Option<u64>,
}

impl Category {
    /// Create a new category.
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            expected_count: None,
        }
    }

    /// Set the expected record count.
    pub fn with_expected_count(mut self, count: u64) -> Self {
        self.expected_count = Some(count);
        self
    }

    /// Parse a category list from a JSON array.
    pub fn list_from_json(json: &str) -> serde_json::Result<Vec<Category>> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_category_list() {
        let json = r#"[
            {"id": "economy", "displayName": "Economy", "expectedCount": 250},
            {"id": "health", "displayName": "Health"}
        ]"#;

        let categories = Category::list_from_json(json).unwrap();

        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].expected_count, Some(250));
        assert_eq!(categories[1].display_name, "Health");
        assert!(categories[1].expected_count.is_none());
    }
}
