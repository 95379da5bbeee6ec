//! Record types - stored records, their resources, and the upstream payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Resource formats whose schema can supply a record's column names.
pub const TABULAR_FORMATS: &[&str] = &["csv", "tsv", "xls", "xlsx", "ods"];

/// Sync state of a stored record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Pending,
    Synced,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Synced => "synced",
            SyncStatus::Failed => "failed",
        }
    }

    /// Parse a stored status, treating unknown values as pending.
    pub fn parse(value: &str) -> Self {
        match value {
            "synced" => SyncStatus::Synced,
            "failed" => SyncStatus::Failed,
            _ => SyncStatus::Pending,
        }
    }
}

/// A downloadable attachment of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub external_id: String,
    pub url: String,
    pub display_name: String,
    pub format: String,

    #[serde(default)]
    pub columns: Vec<String>,
}

impl Resource {
    /// Create a new resource with no known columns.
    pub fn new(
        external_id: impl Into<String>,
        url: impl Into<String>,
        format: impl Into<String>,
    ) -> Self {
        let external_id = external_id.into();
        Self {
            display_name: external_id.clone(),
            external_id,
            url: url.into(),
            format: normalize_format(&format.into()),
            columns: Vec::new(),
        }
    }

    /// Set the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Set the column names.
    pub fn with_columns(mut self, columns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Whether this resource is a table whose schema describes columns.
    pub fn is_tabular(&self) -> bool {
        TABULAR_FORMATS.contains(&self.format.as_str())
    }
}

/// A catalog record as held by the destination store.
///
/// Identity is `external_id`; the store enforces its uniqueness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub external_id: String,
    pub name: String,
    pub name_localized: String,
    pub description: String,
    pub category: String,
    pub source_url: String,
    pub resources: Vec<Resource>,
    pub columns: Vec<String>,
    pub sync_status: SyncStatus,
    pub last_synced_at: Option<DateTime<Utc>>,
}

/// A normalized write to the store.
///
/// Every `Option` field is `None` when the payload did not supply a value;
/// an update then keeps what the store already has, and an insert falls
/// back to the external id (names) or an empty value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordUpsert {
    pub external_id: String,
    pub name: Option<String>,
    pub name_localized: Option<String>,
    pub description: Option<String>,
    pub category: String,
    pub source_url: Option<String>,
    pub resources: Option<Vec<Resource>>,
    pub columns: Option<Vec<String>>,
    pub sync_status: SyncStatus,
    pub synced_at: DateTime<Utc>,
}

impl RecordUpsert {
    /// Apply this write on top of an existing record (or none).
    ///
    /// Supplied fields are overwritten, the rest keep their stored values.
    /// SQL backends mirror this with `COALESCE($n, table.col)`.
    pub fn apply_to(&self, existing: Option<&Record>) -> Record {
        fn pick<T: Clone>(supplied: &Option<T>, stored: Option<&T>, fallback: impl FnOnce() -> T) -> T {
            supplied
                .clone()
                .or_else(|| stored.cloned())
                .unwrap_or_else(fallback)
        }

        Record {
            external_id: self.external_id.clone(),
            name: pick(&self.name, existing.map(|r| &r.name), || self.external_id.clone()),
            name_localized: pick(&self.name_localized, existing.map(|r| &r.name_localized), || {
                self.external_id.clone()
            }),
            description: pick(&self.description, existing.map(|r| &r.description), String::new),
            category: self.category.clone(),
            source_url: pick(&self.source_url, existing.map(|r| &r.source_url), String::new),
            resources: pick(&self.resources, existing.map(|r| &r.resources), Vec::new),
            columns: pick(&self.columns, existing.map(|r| &r.columns), Vec::new),
            sync_status: self.sync_status,
            last_synced_at: Some(self.synced_at),
        }
    }
}

/// What the store did with an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertAction {
    Inserted,
    Updated,
}

// ============================================================================
// Upstream payloads
// ============================================================================

/// A record as returned by the listing or detail endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPayload {
    /// A `null` id reads as empty and is rejected at upsert time.
    #[serde(alias = "id", deserialize_with = "id_string")]
    pub external_id: String,

    #[serde(default, alias = "title")]
    pub name: Option<String>,

    #[serde(default)]
    pub name_localized: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub source_url: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub resources: Vec<ResourcePayload>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub columns: Vec<String>,
}

impl RecordPayload {
    /// Create a payload with only an external id (a bare listing entry).
    pub fn new(external_id: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            ..Default::default()
        }
    }

    /// Set the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the localized name.
    pub fn with_name_localized(mut self, name: impl Into<String>) -> Self {
        self.name_localized = Some(name.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a resource.
    pub fn with_resource(mut self, resource: ResourcePayload) -> Self {
        self.resources.push(resource);
        self
    }

    /// Convert attached resources, dropping entries without an id or URL.
    pub fn to_resources(&self) -> Vec<Resource> {
        self.resources
            .iter()
            .filter_map(ResourcePayload::to_resource)
            .collect()
    }

    /// Column names: explicit `columns` first, else the first tabular resource's schema.
    pub fn infer_columns(&self) -> Vec<String> {
        if !self.columns.is_empty() {
            return self.columns.clone();
        }
        self.to_resources()
            .into_iter()
            .find(Resource::is_tabular)
            .map(|r| r.columns)
            .unwrap_or_default()
    }
}

/// A resource as returned by the detail endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourcePayload {
    #[serde(default, alias = "externalId", deserialize_with = "opt_id_string")]
    pub id: Option<String>,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default, alias = "displayName")]
    pub name: Option<String>,

    #[serde(default)]
    pub format: Option<String>,

    #[serde(default, deserialize_with = "null_as_default")]
    pub columns: Vec<String>,

    #[serde(default)]
    pub schema: Option<SchemaPayload>,
}

impl ResourcePayload {
    /// Create a resource payload.
    pub fn new(id: impl Into<String>, url: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            url: Some(url.into()),
            format: Some(format.into()),
            ..Default::default()
        }
    }

    /// Set the schema field names.
    pub fn with_schema_fields(mut self, fields: &[&str]) -> Self {
        self.schema = Some(SchemaPayload {
            fields: fields
                .iter()
                .map(|name| FieldPayload {
                    name: name.to_string(),
                })
                .collect(),
        });
        self
    }

    fn to_resource(&self) -> Option<Resource> {
        let id = self.id.as_deref().filter(|s| !s.trim().is_empty())?;
        let url = self.url.as_deref().filter(|s| !s.trim().is_empty())?;

        let columns = if self.columns.is_empty() {
            self.schema
                .as_ref()
                .map(|s| {
                    s.fields
                        .iter()
                        .filter(|f| !f.name.trim().is_empty())
                        .map(|f| f.name.clone())
                        .collect()
                })
                .unwrap_or_default()
        } else {
            self.columns.clone()
        };

        let resource = Resource::new(id, url, self.format.as_deref().unwrap_or_default())
            .with_columns(columns);

        Some(match non_blank(self.name.as_deref()) {
            Some(name) => resource.with_display_name(name),
            None => resource,
        })
    }
}

/// Inferred table schema of a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaPayload {
    #[serde(default, deserialize_with = "null_as_default")]
    pub fields: Vec<FieldPayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldPayload {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

/// Lowercase a format and strip a leading dot (".CSV" -> "csv").
pub fn normalize_format(format: &str) -> String {
    format.trim().trim_start_matches('.').to_ascii_lowercase()
}

/// Trimmed value, or `None` when missing or blank.
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Text(String),
    Number(i64),
}

impl From<IdRepr> for String {
    fn from(id: IdRepr) -> Self {
        match id {
            IdRepr::Text(s) => s,
            IdRepr::Number(n) => n.to_string(),
        }
    }
}

/// Upstream ids arrive as either strings or integers.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<IdRepr>::deserialize(deserializer).map(|id| id.map(String::from).unwrap_or_default())
}

/// Treat an explicit `null` like a missing key.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn opt_id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<IdRepr>::deserialize(deserializer).map(|id| id.map(String::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upsert(resources: Option<Vec<Resource>>) -> RecordUpsert {
        RecordUpsert {
            external_id: "x1".into(),
            name: Some("Name".into()),
            name_localized: Some("Name".into()),
            description: None,
            category: "economy".into(),
            source_url: Some("https://catalog.example/dataset/x1".into()),
            columns: resources.as_ref().map(|_| vec!["year".to_string()]),
            resources,
            sync_status: SyncStatus::Synced,
            synced_at: Utc::now(),
        }
    }

    #[test]
    fn test_apply_keeps_resources_when_not_supplied() {
        let r1 = Resource::new("r1", "https://files.example/r1.csv", "CSV");
        let enriched = upsert(Some(vec![r1.clone()])).apply_to(None);

        let refreshed = upsert(None).apply_to(Some(&enriched));

        assert_eq!(refreshed.resources, vec![r1]);
        assert_eq!(refreshed.columns, vec!["year".to_string()]);
    }

    #[test]
    fn test_apply_replaces_resources_when_supplied() {
        let r1 = Resource::new("r1", "https://files.example/r1.csv", "csv");
        let r2 = Resource::new("r2", "https://files.example/r2.xlsx", "xlsx");
        let first = upsert(Some(vec![r1])).apply_to(None);

        let second = upsert(Some(vec![r2.clone()])).apply_to(Some(&first));

        assert_eq!(second.resources, vec![r2]);
    }

    #[test]
    fn test_apply_keeps_descriptive_fields_when_not_supplied() {
        let mut first = upsert(None);
        first.name = Some("GDP".into());
        first.description = Some("Annual GDP".into());
        let stored = first.apply_to(None);

        let mut bare = upsert(None);
        bare.name = None;
        bare.name_localized = None;
        bare.source_url = None;
        let refreshed = bare.apply_to(Some(&stored));

        assert_eq!(refreshed.name, "GDP");
        assert_eq!(refreshed.description, "Annual GDP");
        assert_eq!(refreshed.source_url, "https://catalog.example/dataset/x1");
    }

    #[test]
    fn test_apply_falls_back_on_insert() {
        let mut bare = upsert(None);
        bare.name = None;
        bare.name_localized = None;
        bare.source_url = None;

        let record = bare.apply_to(None);

        assert_eq!(record.name, "x1");
        assert_eq!(record.name_localized, "x1");
        assert_eq!(record.description, "");
        assert_eq!(record.source_url, "");
    }

    #[test]
    fn test_payload_tolerates_null_arrays() {
        let payload: RecordPayload = serde_json::from_str(
            r#"{"id": "x1", "resources": null, "columns": null}"#,
        )
        .unwrap();
        assert!(payload.resources.is_empty());
        assert!(payload.columns.is_empty());

        let resource: ResourcePayload = serde_json::from_str(
            r#"{"id": "r1", "url": "https://f/r1.csv", "format": "csv", "columns": null,
                "schema": {"fields": [{"name": null}, {"name": "year"}]}}"#,
        )
        .unwrap();
        let payload = RecordPayload::new("x1").with_resource(resource);
        assert_eq!(payload.infer_columns(), vec!["year"]);
    }

    #[test]
    fn test_payload_accepts_numeric_id() {
        let payload: RecordPayload =
            serde_json::from_str(r#"{"id": 4521, "title": "Budget"}"#).unwrap();

        assert_eq!(payload.external_id, "4521");
        assert_eq!(payload.name.as_deref(), Some("Budget"));
        assert!(payload.resources.is_empty());
    }

    #[test]
    fn test_columns_come_from_first_tabular_resource() {
        let payload = RecordPayload::new("x1")
            .with_resource(ResourcePayload::new("r0", "https://files.example/doc.pdf", "pdf"))
            .with_resource(
                ResourcePayload::new("r1", "https://files.example/a.csv", ".CSV")
                    .with_schema_fields(&["region", "amount"]),
            )
            .with_resource(
                ResourcePayload::new("r2", "https://files.example/b.xlsx", "xlsx")
                    .with_schema_fields(&["other"]),
            );

        assert_eq!(payload.infer_columns(), vec!["region", "amount"]);
    }

    #[test]
    fn test_resources_without_url_are_dropped() {
        let mut broken = ResourcePayload::new("r1", "", "csv");
        broken.url = None;
        let payload = RecordPayload::new("x1").with_resource(broken);

        assert!(payload.to_resources().is_empty());
    }

    #[test]
    fn test_resource_display_name_falls_back_to_id() {
        let payload = RecordPayload::new("x1")
            .with_resource(ResourcePayload::new("r1", "https://files.example/a.csv", "csv"));

        assert_eq!(payload.to_resources()[0].display_name, "r1");
    }
}
