//! Domain value objects shared across the sync engine.

use serde::{Deserialize, Serialize};

/// Property types the engine understands. Anything else the store reports
/// decodes as `Unknown` and is carried along untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Title,
    Date,
    Number,
    RichText,
    #[serde(other)]
    Unknown,
}

impl PropertyKind {
    /// Wire name as the store reports it.
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyKind::Title => "title",
            PropertyKind::Date => "date",
            PropertyKind::Number => "number",
            PropertyKind::RichText => "rich_text",
            PropertyKind::Unknown => "unknown",
        }
    }

    /// Decode a wire type string.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "title" => PropertyKind::Title,
            "date" => PropertyKind::Date,
            "number" => PropertyKind::Number,
            "rich_text" => PropertyKind::RichText,
            _ => PropertyKind::Unknown,
        }
    }
}

/// A typed column on a remote database. Identity is `id`; `name` is what
/// users see and rename.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseProperty {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: PropertyKind,
    pub display_hint: String,
}

/// Result of the latest schema reconciliation pass. `is_valid` holds iff
/// `missing_fields` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSchemaStatus {
    pub is_valid: bool,
    pub missing_fields: Vec<String>,
    pub auto_created_fields: Vec<String>,
    pub notes: Vec<String>,
}

/// Snapshot of a connected database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    pub id: String,
    pub title: String,
    pub icon: Option<String>,
    pub emoji: Option<String>,
    pub properties: Vec<DatabaseProperty>,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub schema_status: Option<DatabaseSchemaStatus>,
}

impl Database {
    /// First property with the given user-facing name.
    pub fn property_by_name(&self, name: &str) -> Option<&DatabaseProperty> {
        self.properties.iter().find(|property| property.name == name)
    }

    /// First property of the given type.
    pub fn property_by_kind(&self, kind: PropertyKind) -> Option<&DatabaseProperty> {
        self.properties.iter().find(move |property| property.kind == kind)
    }

    /// All properties of the given type, in schema order.
    pub fn properties_of_kind(
        &self,
        kind: PropertyKind,
    ) -> impl Iterator<Item = &DatabaseProperty> {
        self.properties
            .iter()
            .filter(move |property| property.kind == kind)
    }

    /// Whether the latest reconciliation pass left the schema usable.
    pub fn schema_is_valid(&self) -> bool {
        self.schema_status
            .as_ref()
            .is_some_and(|status| status.is_valid)
    }
}

/// Record category being synced, each with its own required fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseKind {
    Balance,
    Transactions,
}

/// User- or auto-selected correspondence from logical sync fields to
/// property names. Empty strings mean "not chosen yet".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionsFieldMapping {
    pub date_property: String,
    pub amount_property: String,
    pub merchant_property: String,
    pub account_name_property: String,
}

/// A scraped account balance row. The balance stays a raw display string
/// until sync time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub name: String,
    pub balance: String,
}

/// Debit/credit marker scraped off the amount cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionDirection {
    Credit,
    Debit,
    #[default]
    Unknown,
}

/// A scraped card transaction. Immutable input to the sync engine; its
/// identity is derived from content, never from the scrape key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Source row key, display only.
    #[serde(default)]
    pub key: String,
    /// ISO date, `YYYY-MM-DD`.
    pub date: String,
    #[serde(default)]
    pub amount_text: String,
    pub amount_value: f64,
    pub merchant: String,
    pub account_name: String,
    #[serde(default)]
    pub direction: TransactionDirection,
    #[serde(default)]
    pub category: String,
}
