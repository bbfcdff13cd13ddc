//! Boundary decoding.
//!
//! Raw store descriptors and previously-persisted settings values become
//! the closed `Database`/`DatabaseProperty` model here. Persisted data may
//! come from older builds or be partially malformed; it degrades into a
//! minimal well-typed structure instead of failing the settings load.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::model::{
    Database, DatabaseProperty, DatabaseSchemaStatus, PropertyKind, TransactionsFieldMapping,
};
use crate::store::{RawDatabase, RawIcon, RawProperty, TextFragment};

/// Fallback title for a database whose title fragments are empty.
const UNTITLED_DATABASE: &str = "Untitled database";

/// Display hint per property type, from a fixed table. Anything
/// unrecognized gets the muted default.
pub fn display_hint_for(kind: PropertyKind) -> &'static str {
    match kind {
        PropertyKind::Title => "blue",
        PropertyKind::Date => "pink",
        PropertyKind::Number => "green",
        PropertyKind::RichText => "amber",
        PropertyKind::Unknown => "gray",
    }
}

/// Classify one raw property descriptor.
///
/// Pure and total: the property's own mapping key doubles as the fallback
/// for a missing id or name, so neither is ever an empty string.
pub fn classify_property(key: &str, raw: &RawProperty) -> DatabaseProperty {
    let kind = raw
        .kind
        .as_deref()
        .map(PropertyKind::from_wire)
        .unwrap_or(PropertyKind::Unknown);

    DatabaseProperty {
        id: non_empty(raw.id.clone()).unwrap_or_else(|| key.to_string()),
        name: non_empty(raw.name.clone()).unwrap_or_else(|| key.to_string()),
        kind,
        display_hint: display_hint_for(kind).to_string(),
    }
}

/// Classify a full property map, in key order.
pub fn map_properties(raw: &BTreeMap<String, RawProperty>) -> Vec<DatabaseProperty> {
    raw.iter()
        .map(|(key, property)| classify_property(key, property))
        .collect()
}

/// Join a database's title fragments; an untitled database still gets a
/// label.
pub fn title_from_fragments(fragments: &[TextFragment]) -> String {
    let joined: String = fragments
        .iter()
        .map(|fragment| fragment.plain_text.as_deref().unwrap_or(""))
        .collect();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        UNTITLED_DATABASE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Decode a raw database descriptor into the typed model. The icon url
/// takes display precedence over the emoji; both are carried.
pub fn map_database(
    raw: &RawDatabase,
    link: &str,
    schema_status: Option<DatabaseSchemaStatus>,
) -> Database {
    let (icon, emoji) = match &raw.icon {
        Some(RawIcon::External { external }) => (Some(external.url.clone()), None),
        Some(RawIcon::Emoji { emoji }) => (None, Some(emoji.clone())),
        _ => (None, None),
    };

    Database {
        id: raw.id.clone(),
        title: title_from_fragments(&raw.title),
        icon,
        emoji,
        properties: map_properties(&raw.properties),
        link: link.to_string(),
        schema_status,
    }
}

/// Decode a persisted database value. `None` when the value is absent,
/// null, or unusable (no id); malformed nested shapes degrade field by
/// field.
pub fn normalize_persisted_database(value: &Value) -> Option<Database> {
    let object = value.as_object()?;
    let id = object.get("id").and_then(Value::as_str)?;

    Some(Database {
        id: id.to_string(),
        title: object
            .get("title")
            .and_then(Value::as_str)
            .filter(|title| !title.is_empty())
            .unwrap_or(UNTITLED_DATABASE)
            .to_string(),
        icon: object
            .get("icon")
            .and_then(Value::as_str)
            .map(str::to_string),
        emoji: object
            .get("emoji")
            .and_then(Value::as_str)
            .map(str::to_string),
        properties: normalize_persisted_properties(object.get("properties")),
        link: object
            .get("link")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        schema_status: object
            .get("schemaStatus")
            .and_then(|status| serde_json::from_value(status.clone()).ok()),
    })
}

/// Decode a persisted property list.
///
/// Two historical layouts are accepted: a list of property objects and a
/// name-keyed map. Entries without a recognizable shape are dropped (list
/// form) or defaulted to an unknown type (map form).
pub fn normalize_persisted_properties(value: Option<&Value>) -> Vec<DatabaseProperty> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| {
                let object = item.as_object()?;
                let kind = PropertyKind::from_wire(object.get("type").and_then(Value::as_str)?);
                let stored_id = object
                    .get("id")
                    .and_then(Value::as_str)
                    .filter(|id| !id.is_empty());

                Some(DatabaseProperty {
                    id: stored_id
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("property-{index}")),
                    name: object
                        .get("name")
                        .and_then(Value::as_str)
                        .filter(|name| !name.is_empty())
                        .or(stored_id)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("Property {}", index + 1)),
                    kind,
                    display_hint: persisted_display_hint(object, kind),
                })
            })
            .collect(),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(key, item)| {
                let object = item.as_object();
                let kind = object
                    .and_then(|o| o.get("type"))
                    .and_then(Value::as_str)
                    .map(PropertyKind::from_wire)
                    .unwrap_or(PropertyKind::Unknown);

                DatabaseProperty {
                    id: object
                        .and_then(|o| o.get("id"))
                        .and_then(Value::as_str)
                        .filter(|id| !id.is_empty())
                        .unwrap_or(key)
                        .to_string(),
                    name: object
                        .and_then(|o| o.get("name"))
                        .and_then(Value::as_str)
                        .filter(|name| !name.is_empty())
                        .unwrap_or(key)
                        .to_string(),
                    kind,
                    display_hint: object
                        .map(|o| persisted_display_hint(o, kind))
                        .unwrap_or_else(|| display_hint_for(kind).to_string()),
                }
            })
            .collect(),
        _ => Vec::new(),
    }
}

/// Decode a persisted field mapping; absent fields become empty strings.
pub fn normalize_persisted_mapping(value: Option<&Value>) -> Option<TransactionsFieldMapping> {
    let object = value?.as_object()?;
    let field = |key: &str| {
        object
            .get(key)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    Some(TransactionsFieldMapping {
        date_property: field("dateProperty"),
        amount_property: field("amountProperty"),
        merchant_property: field("merchantProperty"),
        account_name_property: field("accountNameProperty"),
    })
}

fn persisted_display_hint(object: &serde_json::Map<String, Value>, kind: PropertyKind) -> String {
    object
        .get("displayHint")
        .and_then(Value::as_str)
        .filter(|hint| !hint.is_empty())
        .unwrap_or(display_hint_for(kind))
        .to_string()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
