//! Persisted settings and the key-value store boundary.
//!
//! The store enforces no schema, so all decoding happens on this side and
//! partially-malformed persisted data degrades into well-typed defaults.
//! Draft auto-saves are best-effort: a failed local write never blocks the
//! user and never corrupts what they are editing.

use async_trait::async_trait;
use log::warn;
use serde_json::Value;
use std::collections::BTreeMap;

use crate::decode::{normalize_persisted_database, normalize_persisted_mapping};
use crate::model::{Database, TransactionsFieldMapping};

/// Keys the engine persists. `selectedDatabase` is the legacy name of the
/// balance database; it stays readable and mirrored on write so older
/// builds keep working.
pub const STORAGE_KEYS: [&str; 9] = [
    "availableAccounts",
    "selectedAccounts",
    "notionApiKey",
    "selectedDatabase",
    "balanceDatabase",
    "transactionsDatabase",
    "transactionsFieldMapping",
    "balanceDatabaseLinkDraft",
    "transactionsDatabaseLinkDraft",
];

/// Key-value persistence boundary.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Fetch the stored values for the given keys; absent keys are simply
    /// missing from the result.
    async fn get(&self, keys: &[&str]) -> Result<BTreeMap<String, Value>, String>;

    /// Persist the given values, replacing each key wholesale.
    async fn set(&self, values: BTreeMap<String, Value>) -> Result<(), String>;
}

/// Well-typed snapshot of everything persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncSettings {
    /// Account group class -> section title, as scraped.
    pub available_accounts: BTreeMap<String, String>,
    /// Group classes the user chose to sync; empty means all of them.
    pub selected_accounts: Vec<String>,
    pub notion_api_key: String,
    pub balance_database: Option<Database>,
    pub transactions_database: Option<Database>,
    pub transactions_field_mapping: Option<TransactionsFieldMapping>,
    pub balance_database_link_draft: String,
    pub transactions_database_link_draft: String,
}

impl SyncSettings {
    /// Effective account-group selection: an empty selection means every
    /// discovered group.
    pub fn effective_selected_accounts(&self) -> Vec<String> {
        if self.selected_accounts.is_empty() {
            self.available_accounts.keys().cloned().collect()
        } else {
            self.selected_accounts.clone()
        }
    }
}

/// Load and normalize the persisted settings.
///
/// A legacy `selectedDatabase` entry without a `balanceDatabase` is
/// surfaced as the balance database and backfilled in the store. Link
/// drafts default to the connected database's link.
pub async fn load_settings(store: &dyn SettingsStore) -> Result<SyncSettings, String> {
    let stored = store.get(&STORAGE_KEYS).await?;

    let legacy = stored
        .get("selectedDatabase")
        .and_then(normalize_persisted_database);
    let stored_balance = stored
        .get("balanceDatabase")
        .and_then(normalize_persisted_database);
    let migrate_legacy = stored_balance.is_none() && legacy.is_some();
    let balance_database = stored_balance.or(legacy);

    if migrate_legacy {
        if let Some(database) = &balance_database {
            if let Ok(value) = serde_json::to_value(database) {
                let mut backfill = BTreeMap::new();
                backfill.insert("balanceDatabase".to_string(), value.clone());
                backfill.insert("selectedDatabase".to_string(), value);
                if let Err(error) = store.set(backfill).await {
                    warn!("Legacy balance database backfill failed: {error}");
                }
            }
        }
    }

    let transactions_database = stored
        .get("transactionsDatabase")
        .and_then(normalize_persisted_database);

    let balance_database_link_draft = stored
        .get("balanceDatabaseLinkDraft")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| balance_database.as_ref().map(|db| db.link.clone()))
        .unwrap_or_default();
    let transactions_database_link_draft = stored
        .get("transactionsDatabaseLinkDraft")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| transactions_database.as_ref().map(|db| db.link.clone()))
        .unwrap_or_default();

    Ok(SyncSettings {
        available_accounts: stored
            .get("availableAccounts")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default(),
        selected_accounts: stored
            .get("selectedAccounts")
            .and_then(|value| serde_json::from_value(value.clone()).ok())
            .unwrap_or_default(),
        notion_api_key: stored
            .get("notionApiKey")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        balance_database,
        transactions_database,
        transactions_field_mapping: normalize_persisted_mapping(
            stored.get("transactionsFieldMapping"),
        ),
        balance_database_link_draft,
        transactions_database_link_draft,
    })
}

/// Whole-value settings write. Values are replaced, never merged remotely;
/// the balance database mirrors into the legacy key.
#[derive(Debug, Clone, Default)]
pub struct SettingsPatch {
    values: BTreeMap<String, Value>,
}

impl SettingsPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn api_key(mut self, key: &str) -> Self {
        self.values.insert(
            "notionApiKey".to_string(),
            Value::String(key.trim().to_string()),
        );
        self
    }

    pub fn balance_database(mut self, database: Option<&Database>) -> Self {
        let value = database_value(database);
        self.values
            .insert("balanceDatabase".to_string(), value.clone());
        self.values.insert("selectedDatabase".to_string(), value);
        self
    }

    pub fn transactions_database(mut self, database: Option<&Database>) -> Self {
        self.values
            .insert("transactionsDatabase".to_string(), database_value(database));
        self
    }

    pub fn transactions_field_mapping(
        mut self,
        mapping: Option<&TransactionsFieldMapping>,
    ) -> Self {
        let value = mapping
            .and_then(|mapping| serde_json::to_value(mapping).ok())
            .unwrap_or(Value::Null);
        self.values
            .insert("transactionsFieldMapping".to_string(), value);
        self
    }

    pub fn balance_database_link_draft(mut self, link: &str) -> Self {
        self.values.insert(
            "balanceDatabaseLinkDraft".to_string(),
            Value::String(link.to_string()),
        );
        self
    }

    pub fn transactions_database_link_draft(mut self, link: &str) -> Self {
        self.values.insert(
            "transactionsDatabaseLinkDraft".to_string(),
            Value::String(link.to_string()),
        );
        self
    }

    pub fn selected_accounts(mut self, accounts: &[String]) -> Self {
        self.values.insert(
            "selectedAccounts".to_string(),
            Value::Array(accounts.iter().cloned().map(Value::String).collect()),
        );
        self
    }

    pub fn available_accounts(mut self, accounts: &BTreeMap<String, String>) -> Self {
        self.values.insert(
            "availableAccounts".to_string(),
            serde_json::to_value(accounts).unwrap_or(Value::Null),
        );
        self
    }

    pub fn into_values(self) -> BTreeMap<String, Value> {
        self.values
    }
}

/// Persist a patch, surfacing the failure to the caller.
pub async fn save_settings(store: &dyn SettingsStore, patch: SettingsPatch) -> Result<(), String> {
    if patch.is_empty() {
        return Ok(());
    }
    store.set(patch.into_values()).await
}

/// Persist a patch where failure must never interrupt the user: draft
/// auto-saves and post-sync refreshes. Failures are logged and dropped.
pub async fn save_settings_best_effort(store: &dyn SettingsStore, patch: SettingsPatch) {
    if let Err(error) = save_settings(store, patch).await {
        warn!("Settings save failed: {error}");
    }
}

fn database_value(database: Option<&Database>) -> Value {
    database
        .and_then(|database| serde_json::to_value(database).ok())
        .unwrap_or(Value::Null)
}
