//! Document-store boundary: the collaborator trait and the typed wire
//! shapes it speaks.
//!
//! Everything loosely-typed from the remote store is decoded into these
//! shapes at the client; nothing past this module handles raw JSON.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Failure reported by the remote document store.
///
/// Carries the store's own error code when one is known; rendered with an
/// identifying prefix, e.g. `Notion [object_not_found]: Could not find
/// database with ID: ...`. Transport failures without a code render as the
/// bare message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreError {
    pub code: Option<String>,
    pub message: String,
}

impl StoreError {
    /// Error with a store-assigned code.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// Error without a code (transport, decoding).
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.code {
            Some(code) => write!(f, "Notion [{}]: {}", code, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for StoreError {}

/// One chunk of remote text content. The store splits long values into
/// fragments; readers join them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFragment {
    #[serde(default)]
    pub plain_text: Option<String>,
}

/// External file reference inside an icon descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalFile {
    pub url: String,
}

/// Icon descriptor attached to a database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawIcon {
    Emoji { emoji: String },
    External { external: ExternalFile },
    #[serde(other)]
    Unknown,
}

/// Property descriptor as the store reports it. Every field is optional
/// because the store omits some of them in some responses; the classifier
/// fills in fallbacks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawProperty {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
}

/// Database descriptor returned by retrieve and search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDatabase {
    pub id: String,
    #[serde(default)]
    pub title: Vec<TextFragment>,
    #[serde(default)]
    pub icon: Option<RawIcon>,
    #[serde(default)]
    pub properties: BTreeMap<String, RawProperty>,
}

/// A property value on a queried record. Only the text-bearing shapes the
/// engine reads back (sync ids) are decoded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecordProperty {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: Option<Vec<TextFragment>>,
    #[serde(default)]
    pub rich_text: Option<Vec<TextFragment>>,
}

impl RawRecordProperty {
    /// Joined, trimmed plain text of the property's fragments.
    pub fn plain_text(&self) -> String {
        let fragments = if self.kind.as_deref() == Some("title") {
            self.title.as_deref()
        } else {
            self.rich_text.as_deref()
        };

        fragments
            .unwrap_or(&[])
            .iter()
            .map(|fragment| fragment.plain_text.as_deref().unwrap_or(""))
            .collect::<String>()
            .trim()
            .to_string()
    }
}

/// A record returned by a database query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub properties: BTreeMap<String, RawRecordProperty>,
}

/// One page of query results plus the continuation token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordPage {
    #[serde(default)]
    pub results: Vec<RawRecord>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// Typed value written into a record property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Title(String),
    RichText(String),
    Number(f64),
    /// ISO date or RFC3339 timestamp.
    Date(String),
}

/// Creation spec for a property the schema auditor provisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertySpec {
    /// Number column with a display format, e.g. `dollar`.
    Number { format: &'static str },
    Date,
    RichText,
}

/// Conjunctive date window used by duplicate detection: the mapped date
/// property must be on or after `start` and on or before `end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRangeFilter {
    pub property: String,
    pub start: String,
    pub end: String,
}

/// Remote document-store operations the engine depends on.
///
/// Methods take the API credential per call so one client instance serves
/// whatever key the caller currently holds. Every method is fallible and
/// rate-limit-agnostic; retry policy belongs to the implementation.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a database definition by id.
    async fn retrieve_database(
        &self,
        token: &str,
        database_id: &str,
    ) -> Result<RawDatabase, StoreError>;

    /// Create the given properties on a database definition.
    async fn update_database_properties(
        &self,
        token: &str,
        database_id: &str,
        properties: BTreeMap<String, PropertySpec>,
    ) -> Result<(), StoreError>;

    /// Fetch one page of records matching the date window. Continuation is
    /// driven by `cursor` from the previous page's `next_cursor`.
    async fn query_database(
        &self,
        token: &str,
        database_id: &str,
        filter: &DateRangeFilter,
        page_size: u32,
        cursor: Option<&str>,
    ) -> Result<RecordPage, StoreError>;

    /// Create one record with the given property values.
    async fn create_record(
        &self,
        token: &str,
        database_id: &str,
        properties: BTreeMap<String, PropertyValue>,
    ) -> Result<(), StoreError>;

    /// List databases the credential can reach.
    async fn search_databases(&self, token: &str) -> Result<Vec<RawDatabase>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_error_renders_code_prefix() {
        let with_code = StoreError::new("rate_limited", "Too many requests.");
        assert_eq!(with_code.to_string(), "Notion [rate_limited]: Too many requests.");

        let without_code = StoreError::message("connection reset");
        assert_eq!(without_code.to_string(), "connection reset");
    }

    #[test]
    fn record_property_plain_text_joins_fragments() {
        let property: RawRecordProperty = serde_json::from_str(
            r#"{"type":"rich_text","rich_text":[{"plain_text":"abc"},{"plain_text":"123 "}]}"#,
        )
        .expect("decode property");
        assert_eq!(property.plain_text(), "abc123");
    }

    #[test]
    fn record_property_plain_text_reads_title_fragments() {
        let property: RawRecordProperty = serde_json::from_str(
            r#"{"type":"title","title":[{"plain_text":"Coffee Shop"}]}"#,
        )
        .expect("decode property");
        assert_eq!(property.plain_text(), "Coffee Shop");
    }

    #[test]
    fn record_property_plain_text_handles_missing_fragments() {
        let property = RawRecordProperty::default();
        assert_eq!(property.plain_text(), "");
    }

    #[test]
    fn icon_decodes_known_and_unknown_variants() {
        let emoji: RawIcon = serde_json::from_str(r#"{"type":"emoji","emoji":"💸"}"#).expect("emoji");
        assert_eq!(
            emoji,
            RawIcon::Emoji {
                emoji: "💸".to_string()
            }
        );

        let file: RawIcon =
            serde_json::from_str(r#"{"type":"file","file":{"url":"https://x.test/a.png"}}"#)
                .expect("file icon");
        assert_eq!(file, RawIcon::Unknown);
    }
}
