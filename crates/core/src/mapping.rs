//! Field mapping between logical sync fields and concrete database
//! properties: default suggestion on connect, validation of user edits.

use crate::model::{Database, DatabaseProperty, PropertyKind, TransactionsFieldMapping};

/// Error appended when two logical fields point at one property.
pub const DUPLICATE_MAPPING_ERROR: &str =
    "Each transactions field must map to a different Notion property.";

/// Pick a sensible default mapping from the database's current schema.
///
/// Preference order per field follows how users name their columns: an
/// exact name match first, then the first property of a compatible type.
/// The title property, when present, goes to the merchant; the account
/// name then takes a rich-text property distinct from it.
///
/// Returns `None` when any field cannot be resolved or the four picks are
/// not pairwise distinct: a degenerate schema where one property would
/// serve two roles is rejected outright rather than silently double-mapped.
pub fn suggest_mapping(database: &Database) -> Option<TransactionsFieldMapping> {
    let title_property = database.property_by_kind(PropertyKind::Title);
    let rich_text_properties: Vec<&DatabaseProperty> =
        database.properties_of_kind(PropertyKind::RichText).collect();

    let date = database
        .property_by_name("Date")
        .or_else(|| database.property_by_kind(PropertyKind::Date))?;
    let amount = database
        .property_by_name("Amount")
        .or_else(|| database.property_by_kind(PropertyKind::Number))?;
    let merchant = title_property
        .or_else(|| database.property_by_name("Merchant"))
        .or_else(|| database.property_by_name("Description"))
        .or_else(|| rich_text_properties.first().copied())?;
    let account_name = database.property_by_name("Account Name").or_else(|| {
        rich_text_properties
            .iter()
            .copied()
            .find(|property| property.name != merchant.name)
    })?;

    let names = [&date.name, &amount.name, &merchant.name, &account_name.name];
    let mut unique = names.to_vec();
    unique.sort();
    unique.dedup();
    if unique.len() != names.len() {
        return None;
    }

    Some(TransactionsFieldMapping {
        date_property: date.name.clone(),
        amount_property: amount.name.clone(),
        merchant_property: merchant.name.clone(),
        account_name_property: account_name.name.clone(),
    })
}

/// Validate a user-edited mapping against the live schema.
///
/// Per-field checks run in a fixed order (date, amount, merchant, account
/// name) so the error list is stable for display; the aggregate uniqueness
/// check runs last. No database means nothing to validate; a missing
/// mapping against a connected database is itself the error.
pub fn validate_mapping(
    mapping: Option<&TransactionsFieldMapping>,
    database: Option<&Database>,
) -> Vec<String> {
    let Some(database) = database else {
        return Vec::new();
    };
    let Some(mapping) = mapping else {
        return vec!["Field mapping is required for the transactions database.".to_string()];
    };

    let rules: [(&str, &str, &[PropertyKind]); 4] = [
        ("dateProperty", mapping.date_property.as_str(), &[PropertyKind::Date]),
        ("amountProperty", mapping.amount_property.as_str(), &[PropertyKind::Number]),
        (
            "merchantProperty",
            mapping.merchant_property.as_str(),
            &[PropertyKind::Title, PropertyKind::RichText],
        ),
        (
            "accountNameProperty",
            mapping.account_name_property.as_str(),
            &[PropertyKind::RichText],
        ),
    ];

    let mut errors = Vec::new();
    for (field, property_name, allowed) in rules {
        if property_name.is_empty() {
            errors.push(format!("{field} is required."));
            continue;
        }

        let Some(property) = database.property_by_name(property_name) else {
            errors.push(format!(
                "{property_name} is no longer available in the database."
            ));
            continue;
        };

        if !allowed.contains(&property.kind) {
            let expected = allowed
                .iter()
                .map(|kind| kind.as_str())
                .collect::<Vec<_>>()
                .join(" or ");
            errors.push(format!(
                "{} has type {}, expected {}.",
                property_name,
                property.kind.as_str(),
                expected
            ));
        }
    }

    let filled: Vec<&str> = [
        mapping.date_property.as_str(),
        mapping.amount_property.as_str(),
        mapping.merchant_property.as_str(),
        mapping.account_name_property.as_str(),
    ]
    .into_iter()
    .filter(|name| !name.is_empty())
    .collect();
    let mut unique = filled.clone();
    unique.sort_unstable();
    unique.dedup();
    if unique.len() != filled.len() {
        errors.push(DUPLICATE_MAPPING_ERROR.to_string());
    }

    errors
}

/// Properties usable for a given set of logical field types, for building
/// selection lists.
pub fn compatible_properties<'a>(
    database: Option<&'a Database>,
    kinds: &[PropertyKind],
) -> Vec<&'a DatabaseProperty> {
    let Some(database) = database else {
        return Vec::new();
    };
    database
        .properties
        .iter()
        .filter(|property| kinds.contains(&property.kind))
        .collect()
}
