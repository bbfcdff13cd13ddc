//! Schema reconciliation.
//!
//! One pass per (kind, database) pair: classify the remote properties,
//! work out what is missing for the kind, auto-create what the store
//! allows, re-fetch, and recompute the status against the final property
//! set. A failed property creation propagates; the schema is never
//! silently marked valid.

use log::debug;
use std::collections::BTreeMap;

use crate::decode::map_database;
use crate::error::{Result, SyncError};
use crate::ident::parse_database_id;
use crate::mapping::suggest_mapping;
use crate::model::{
    Database, DatabaseKind, DatabaseSchemaStatus, PropertyKind, TransactionsFieldMapping,
};
use crate::store::{DocumentStore, PropertySpec, RawDatabase};

/// Reserved property carrying the content fingerprint on every synced
/// transaction record.
pub const SYNC_ID_PROPERTY: &str = "Sync ID";

/// Display format for auto-created amount/balance columns.
const CURRENCY_FORMAT: &str = "dollar";

/// Required-field vocabulary per database kind, in display order.
pub fn required_fields_for(kind: DatabaseKind) -> &'static [&'static str] {
    match kind {
        DatabaseKind::Balance => &["Account Name", "Balance", "Date"],
        DatabaseKind::Transactions => &["Date", "Amount", "Merchant/Description", "Account Name"],
    }
}

/// Balance databases need the store's native title column plus one number
/// and one date column.
pub fn missing_balance_fields(database: &Database) -> Vec<String> {
    let mut missing = Vec::new();
    if database.property_by_kind(PropertyKind::Title).is_none() {
        missing.push("Account Name".to_string());
    }
    if database.property_by_kind(PropertyKind::Number).is_none() {
        missing.push("Balance".to_string());
    }
    if database.property_by_kind(PropertyKind::Date).is_none() {
        missing.push("Date".to_string());
    }
    missing
}

/// Transactions need a text-capable merchant column, a number, a date, and
/// a rich-text account-name column. The title column, when present, is
/// reserved for the merchant.
pub fn missing_transactions_fields(database: &Database) -> Vec<String> {
    let titles = database.properties_of_kind(PropertyKind::Title).count();
    let rich_texts = database.properties_of_kind(PropertyKind::RichText).count();
    let mut missing = Vec::new();

    if titles == 0 && rich_texts == 0 {
        missing.push("Merchant/Description".to_string());
    }
    if database.property_by_kind(PropertyKind::Number).is_none() {
        missing.push("Amount".to_string());
    }
    if database.property_by_kind(PropertyKind::Date).is_none() {
        missing.push("Date".to_string());
    }
    // With a title column the merchant takes it and one rich_text covers
    // the account name; without one the merchant consumes a rich_text, so
    // two are needed.
    let account_name_covered = if titles > 0 { rich_texts >= 1 } else { rich_texts >= 2 };
    if !account_name_covered {
        missing.push("Account Name".to_string());
    }
    missing
}

/// Recompute a schema status from the current property set.
pub fn build_schema_status(
    kind: DatabaseKind,
    database: &Database,
    auto_created_fields: Vec<String>,
    notes: Vec<String>,
) -> DatabaseSchemaStatus {
    let missing_fields = match kind {
        DatabaseKind::Balance => missing_balance_fields(database),
        DatabaseKind::Transactions => missing_transactions_fields(database),
    };

    DatabaseSchemaStatus {
        is_valid: missing_fields.is_empty(),
        missing_fields,
        auto_created_fields,
        notes,
    }
}

/// Balance reconciliation pass.
///
/// `Balance` and `Date` columns are created when absent by type. A missing
/// title column cannot be repaired remotely (title columns are structural
/// in the store) and is recorded as a note instead.
pub async fn ensure_balance_schema(
    store: &dyn DocumentStore,
    token: &str,
    link: &str,
    raw: RawDatabase,
) -> Result<Database> {
    let mut database = map_database(&raw, link, None);
    let mut to_create: BTreeMap<String, PropertySpec> = BTreeMap::new();
    let mut auto_created = Vec::new();
    let mut notes = Vec::new();

    if database.property_by_kind(PropertyKind::Title).is_none() {
        notes.push(
            "Notion database is missing a title property and cannot be used for balance sync."
                .to_string(),
        );
    }
    if database.property_by_kind(PropertyKind::Number).is_none() {
        to_create.insert(
            "Balance".to_string(),
            PropertySpec::Number {
                format: CURRENCY_FORMAT,
            },
        );
        auto_created.push("Balance".to_string());
    }
    if database.property_by_kind(PropertyKind::Date).is_none() {
        to_create.insert("Date".to_string(), PropertySpec::Date);
        auto_created.push("Date".to_string());
    }

    if !to_create.is_empty() {
        database = create_and_refetch(store, token, link, &database.id, to_create).await?;
    }

    database.schema_status = Some(build_schema_status(
        DatabaseKind::Balance,
        &database,
        auto_created,
        notes,
    ));
    Ok(database)
}

/// Transactions reconciliation pass.
///
/// `Amount`, `Date`, `Account Name`, and the reserved `Sync ID` columns
/// are created when absent by exact name.
pub async fn ensure_transactions_schema(
    store: &dyn DocumentStore,
    token: &str,
    link: &str,
    raw: RawDatabase,
) -> Result<Database> {
    let mut database = map_database(&raw, link, None);
    let mut to_create: BTreeMap<String, PropertySpec> = BTreeMap::new();
    let mut auto_created = Vec::new();

    if database.property_by_name("Amount").is_none() {
        to_create.insert(
            "Amount".to_string(),
            PropertySpec::Number {
                format: CURRENCY_FORMAT,
            },
        );
        auto_created.push("Amount".to_string());
    }
    if database.property_by_name("Date").is_none() {
        to_create.insert("Date".to_string(), PropertySpec::Date);
        auto_created.push("Date".to_string());
    }
    if database.property_by_name("Account Name").is_none() {
        to_create.insert("Account Name".to_string(), PropertySpec::RichText);
        auto_created.push("Account Name".to_string());
    }
    if database.property_by_name(SYNC_ID_PROPERTY).is_none() {
        to_create.insert(SYNC_ID_PROPERTY.to_string(), PropertySpec::RichText);
        auto_created.push(SYNC_ID_PROPERTY.to_string());
    }

    if !to_create.is_empty() {
        database = create_and_refetch(store, token, link, &database.id, to_create).await?;
    }

    let mut notes = Vec::new();
    if database.property_by_kind(PropertyKind::Title).is_none() {
        notes.push(
            "Transactions database should keep one title property for Merchant/Description."
                .to_string(),
        );
        if database.property_by_kind(PropertyKind::RichText).is_none() {
            notes.push("No text field is available for Merchant/Description.".to_string());
        }
    }

    database.schema_status = Some(build_schema_status(
        DatabaseKind::Transactions,
        &database,
        auto_created,
        notes,
    ));
    Ok(database)
}

/// Provision the reserved sync-id column on databases connected before it
/// existed. A no-op when the column is already present by name; otherwise
/// creates it, refreshes the definition, and unions the auto-created
/// record instead of replacing it.
pub async fn ensure_sync_id_property(
    store: &dyn DocumentStore,
    token: &str,
    database: &Database,
) -> Result<Database> {
    if database.property_by_name(SYNC_ID_PROPERTY).is_some() {
        return Ok(database.clone());
    }

    let mut to_create = BTreeMap::new();
    to_create.insert(SYNC_ID_PROPERTY.to_string(), PropertySpec::RichText);
    let mut updated =
        create_and_refetch(store, token, &database.link, &database.id, to_create).await?;

    let mut status = database.schema_status.clone().unwrap_or(DatabaseSchemaStatus {
        is_valid: true,
        ..DatabaseSchemaStatus::default()
    });
    if !status
        .auto_created_fields
        .iter()
        .any(|field| field == SYNC_ID_PROPERTY)
    {
        status.auto_created_fields.push(SYNC_ID_PROPERTY.to_string());
    }
    updated.schema_status = Some(status);
    Ok(updated)
}

/// Outcome of connecting a database: the reconciled definition plus a
/// suggested mapping when the kind calls for one.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConnection {
    pub database: Database,
    pub suggested_mapping: Option<TransactionsFieldMapping>,
}

/// Parse the pasted link, fetch the database, and run the reconciliation
/// pass for the requested kind.
pub async fn connect_database(
    store: &dyn DocumentStore,
    token: &str,
    link: &str,
    kind: DatabaseKind,
) -> Result<DatabaseConnection> {
    let database_id = parse_database_id(link).ok_or_else(|| {
        SyncError::input("Could not parse a database id from the provided Notion link.")
    })?;

    let raw = store.retrieve_database(token, &database_id).await?;
    let database = match kind {
        DatabaseKind::Balance => ensure_balance_schema(store, token, link, raw).await?,
        DatabaseKind::Transactions => ensure_transactions_schema(store, token, link, raw).await?,
    };
    let suggested_mapping = match kind {
        DatabaseKind::Transactions => suggest_mapping(&database),
        DatabaseKind::Balance => None,
    };

    Ok(DatabaseConnection {
        database,
        suggested_mapping,
    })
}

/// Create properties, then re-fetch and re-classify. Creation and read are
/// not assumed consistent without the re-fetch.
async fn create_and_refetch(
    store: &dyn DocumentStore,
    token: &str,
    link: &str,
    database_id: &str,
    to_create: BTreeMap<String, PropertySpec>,
) -> Result<Database> {
    debug!(
        "Creating {} properties on database {}",
        to_create.len(),
        database_id
    );
    store
        .update_database_properties(token, database_id, to_create)
        .await?;
    let refreshed = store.retrieve_database(token, database_id).await?;
    Ok(map_database(&refreshed, link, None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{database_with, raw_database, MockStore};
    use crate::store::StoreError;

    #[test]
    fn balance_missing_fields_cover_all_three_roles() {
        let database = database_with(&[("Notes", "rich_text")]);
        assert_eq!(
            missing_balance_fields(&database),
            vec!["Account Name", "Balance", "Date"]
        );

        let complete = database_with(&[("Name", "title"), ("Balance", "number"), ("Date", "date")]);
        assert!(missing_balance_fields(&complete).is_empty());
    }

    #[test]
    fn transactions_missing_fields_reserve_title_for_merchant() {
        // Title present: one rich_text suffices for the account name.
        let with_title = database_with(&[
            ("Name", "title"),
            ("Amount", "number"),
            ("Date", "date"),
            ("Account Name", "rich_text"),
        ]);
        assert!(missing_transactions_fields(&with_title).is_empty());

        // Title present but no rich_text: the account name has nowhere to go.
        let no_rich_text = database_with(&[("Name", "title"), ("Amount", "number"), ("Date", "date")]);
        assert_eq!(missing_transactions_fields(&no_rich_text), vec!["Account Name"]);

        // No title: two rich_text columns are needed.
        let one_rich_text = database_with(&[
            ("Merchant", "rich_text"),
            ("Amount", "number"),
            ("Date", "date"),
        ]);
        assert_eq!(missing_transactions_fields(&one_rich_text), vec!["Account Name"]);

        let two_rich_text = database_with(&[
            ("Merchant", "rich_text"),
            ("Acct", "rich_text"),
            ("Amount", "number"),
            ("Date", "date"),
        ]);
        assert!(missing_transactions_fields(&two_rich_text).is_empty());
    }

    #[test]
    fn missing_fields_stay_within_the_kind_vocabulary() {
        let empty = database_with(&[]);
        for kind in [DatabaseKind::Balance, DatabaseKind::Transactions] {
            let status = build_schema_status(kind, &empty, Vec::new(), Vec::new());
            assert!(!status.is_valid);
            let vocabulary = required_fields_for(kind);
            for field in &status.missing_fields {
                assert!(vocabulary.contains(&field.as_str()), "unexpected field {field}");
            }
        }

        let full = database_with(&[
            ("Name", "title"),
            ("Amount", "number"),
            ("Date", "date"),
            ("Account Name", "rich_text"),
        ]);
        for kind in [DatabaseKind::Balance, DatabaseKind::Transactions] {
            let status = build_schema_status(kind, &full, Vec::new(), Vec::new());
            assert_eq!(status.is_valid, status.missing_fields.is_empty());
            assert!(status.is_valid);
        }
    }

    #[tokio::test]
    async fn balance_pass_creates_missing_columns_and_revalidates() {
        let store = MockStore::with_database(raw_database("db-1", &[("Name", "title")]));

        let raw = store.database("db-1");
        let database = ensure_balance_schema(&store, "key", "https://x.test/db-1", raw)
            .await
            .expect("balance schema");

        let status = database.schema_status.expect("status");
        assert!(status.is_valid);
        assert_eq!(status.auto_created_fields, vec!["Balance", "Date"]);
        assert!(status.missing_fields.is_empty());
        assert!(status.notes.is_empty());

        let update_calls = store.update_calls.lock().expect("update calls");
        assert_eq!(update_calls.len(), 1);
        assert!(update_calls[0].1.contains_key("Balance"));
        assert!(update_calls[0].1.contains_key("Date"));
    }

    #[tokio::test]
    async fn balance_pass_notes_missing_title_instead_of_creating_it() {
        let store =
            MockStore::with_database(raw_database("db-1", &[("Balance", "number"), ("Date", "date")]));

        let raw = store.database("db-1");
        let database = ensure_balance_schema(&store, "key", "link", raw)
            .await
            .expect("balance schema");

        let status = database.schema_status.expect("status");
        assert!(!status.is_valid);
        assert_eq!(status.missing_fields, vec!["Account Name"]);
        assert!(status.auto_created_fields.is_empty());
        assert_eq!(status.notes.len(), 1);
        assert!(status.notes[0].contains("missing a title property"));
        // Nothing needed creating, so no remote write happened.
        assert!(store.update_calls.lock().expect("update calls").is_empty());
    }

    #[tokio::test]
    async fn transactions_pass_creates_by_name_and_ends_valid() {
        // Spec scenario: {Name: title, Amount: number}.
        let store =
            MockStore::with_database(raw_database("db-1", &[("Name", "title"), ("Amount", "number")]));

        let before = map_database(&store.database("db-1"), "link", None);
        let missing_before = missing_transactions_fields(&before);
        assert!(missing_before.contains(&"Date".to_string()));
        assert!(missing_before.contains(&"Account Name".to_string()));

        let raw = store.database("db-1");
        let database = ensure_transactions_schema(&store, "key", "link", raw)
            .await
            .expect("transactions schema");

        let status = database.schema_status.expect("status");
        assert_eq!(
            status.auto_created_fields,
            vec!["Date", "Account Name", "Sync ID"]
        );
        assert!(status.is_valid);
        assert!(status.missing_fields.is_empty());
    }

    #[tokio::test]
    async fn failed_property_creation_propagates() {
        let store = MockStore::with_database(raw_database("db-1", &[("Name", "title")]));
        *store.fail_update.lock().expect("fail flag") =
            Some(StoreError::new("validation_error", "Cannot add property."));

        let raw = store.database("db-1");
        let result = ensure_balance_schema(&store, "key", "link", raw).await;
        match result {
            Err(SyncError::Store(error)) => assert_eq!(error.code.as_deref(), Some("validation_error")),
            other => panic!("expected store error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn sync_id_provisioning_is_idempotent_and_merges() {
        let store = MockStore::with_database(raw_database(
            "db-1",
            &[
                ("Name", "title"),
                ("Amount", "number"),
                ("Date", "date"),
                ("Account Name", "rich_text"),
            ],
        ));

        let mut database = map_database(&store.database("db-1"), "link", None);
        database.schema_status = Some(DatabaseSchemaStatus {
            is_valid: true,
            missing_fields: vec![],
            auto_created_fields: vec!["Account Name".to_string()],
            notes: vec![],
        });

        let updated = ensure_sync_id_property(&store, "key", &database)
            .await
            .expect("provisioning");
        let status = updated.schema_status.as_ref().expect("status");
        assert_eq!(status.auto_created_fields, vec!["Account Name", "Sync ID"]);
        assert!(updated.property_by_name(SYNC_ID_PROPERTY).is_some());
        assert_eq!(store.update_calls.lock().expect("calls").len(), 1);

        // Second run sees the column and does nothing.
        let again = ensure_sync_id_property(&store, "key", &updated)
            .await
            .expect("second provisioning");
        assert_eq!(store.update_calls.lock().expect("calls").len(), 1);
        assert_eq!(
            again.schema_status.expect("status").auto_created_fields,
            vec!["Account Name", "Sync ID"]
        );
    }

    #[tokio::test]
    async fn connect_rejects_unparseable_links_before_any_fetch() {
        let store = MockStore::default();
        let result = connect_database(&store, "key", "https://x.test/none", DatabaseKind::Balance).await;
        match result {
            Err(error) => {
                assert!(error.is_input());
                assert_eq!(
                    error.to_string(),
                    "Could not parse a database id from the provided Notion link."
                );
            }
            Ok(_) => panic!("expected input error"),
        }
    }

    #[tokio::test]
    async fn connect_transactions_returns_a_suggested_mapping() {
        let store = MockStore::with_database(raw_database(
            "26ab1e3c-9d42-4a0b-8f11-a7cc01e2d3f4",
            &[("Name", "title"), ("Amount", "number")],
        ));

        let connection = connect_database(
            &store,
            "key",
            "https://x.test/26ab1e3c9d424a0b8f11a7cc01e2d3f4",
            DatabaseKind::Transactions,
        )
        .await
        .expect("connect");

        assert!(connection.database.schema_is_valid());
        let mapping = connection.suggested_mapping.expect("mapping");
        assert_eq!(mapping.merchant_property, "Name");
        assert_eq!(mapping.amount_property, "Amount");
        assert_eq!(mapping.date_property, "Date");
        assert_eq!(mapping.account_name_property, "Account Name");
    }
}
