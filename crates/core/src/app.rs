//! Sync orchestration and application state.
//!
//! The presentation layer drives this through explicit commands and reads
//! state back as a snapshot. Every outcome is a value: transport errors
//! never escape past this module and nothing here panics on bad input.

use chrono::{SecondsFormat, Utc};
use futures::future::try_join_all;
use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::dedup::{existing_sync_ids, partition_unsynced, transactions_date_range};
use crate::decode::map_database;
use crate::mapping::validate_mapping;
use crate::model::{Account, Database, DatabaseKind, PropertyKind, Transaction};
use crate::schema::{connect_database, ensure_sync_id_property, SYNC_ID_PROPERTY};
use crate::settings::{
    load_settings, save_settings, save_settings_best_effort, SettingsPatch, SettingsStore,
    SyncSettings,
};
use crate::store::{DocumentStore, PropertyValue};

/// What the scraper found on the active page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PageMode {
    #[default]
    Unknown,
    Balances,
    Transactions,
}

/// Logical transactions field a user can remap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingField {
    Date,
    Amount,
    Merchant,
    AccountName,
}

/// Discrete result of a sync command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    BalancesSynced { created: usize },
    TransactionsSynced { written: usize, skipped: usize },
    Failed(String),
}

impl SyncOutcome {
    /// One-line summary for the result area.
    pub fn message(&self) -> String {
        match self {
            SyncOutcome::BalancesSynced { created } => {
                format!("Created {} balance item{}.", created, plural(*created))
            }
            SyncOutcome::TransactionsSynced { written, skipped } => format!(
                "Created {} transaction{}, skipped {} duplicate{}.",
                written,
                plural(*written),
                skipped,
                plural(*skipped)
            ),
            SyncOutcome::Failed(message) => message.clone(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, SyncOutcome::Failed(_))
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 {
        ""
    } else {
        "s"
    }
}

/// Read-only snapshot of the application state.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub settings: SyncSettings,
    pub page_mode: PageMode,
    pub accounts: Vec<Account>,
    pub transactions: Vec<Transaction>,
    pub balance_connect_error: Option<String>,
    pub transactions_connect_error: Option<String>,
    pub last_error: Option<String>,
    pub last_result: Option<String>,
}

impl AppState {
    /// "Not connected" / "Ready" / "Needs attention".
    pub fn balance_status_text(&self) -> &'static str {
        match &self.settings.balance_database {
            None => "Not connected",
            Some(database) if database.schema_is_valid() => "Ready",
            Some(_) => "Needs attention",
        }
    }

    /// As above, with the mapping state folded in.
    pub fn transactions_status_text(&self) -> &'static str {
        let Some(database) = &self.settings.transactions_database else {
            return "Not connected";
        };
        if !validate_mapping(
            self.settings.transactions_field_mapping.as_ref(),
            Some(database),
        )
        .is_empty()
        {
            return "Mapping incomplete";
        }
        if database.schema_is_valid() {
            "Ready"
        } else {
            "Needs attention"
        }
    }

    /// Mapping validation errors against the connected database, in
    /// display order.
    pub fn mapping_errors(&self) -> Vec<String> {
        validate_mapping(
            self.settings.transactions_field_mapping.as_ref(),
            self.settings.transactions_database.as_ref(),
        )
    }
}

/// Orchestrates scan ingestion, database connection, and sync for both
/// record kinds.
pub struct SyncApp {
    store: Arc<dyn DocumentStore>,
    settings_store: Arc<dyn SettingsStore>,
    state: AppState,
}

impl SyncApp {
    pub fn new(store: Arc<dyn DocumentStore>, settings_store: Arc<dyn SettingsStore>) -> Self {
        Self {
            store,
            settings_store,
            state: AppState::default(),
        }
    }

    /// Load persisted settings into the state snapshot.
    pub async fn init(&mut self) -> Result<(), String> {
        self.state.settings = load_settings(self.settings_store.as_ref()).await?;
        Ok(())
    }

    /// Read-only view of the current state.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Scan result: the page held account balances.
    pub fn accounts_updated(&mut self, accounts: Vec<Account>) {
        self.state.page_mode = PageMode::Balances;
        self.state.accounts = accounts;
        self.state.transactions.clear();
        self.state.last_error = None;
    }

    /// Scan result: the page held card transactions.
    pub fn transactions_updated(&mut self, transactions: Vec<Transaction>) {
        self.state.page_mode = PageMode::Transactions;
        self.state.transactions = transactions;
        self.state.accounts.clear();
        self.state.last_error = None;
    }

    /// Scraper failure: unsupported page, missing sections, and the like.
    pub fn scan_failed(&mut self, message: impl Into<String>) {
        self.state.page_mode = PageMode::Unknown;
        self.state.accounts.clear();
        self.state.transactions.clear();
        self.state.last_error = Some(message.into());
    }

    /// Store the API key, trimmed, and persist it best-effort.
    pub async fn set_api_key(&mut self, key: &str) {
        self.state.settings.notion_api_key = key.trim().to_string();
        save_settings_best_effort(
            self.settings_store.as_ref(),
            SettingsPatch::new().api_key(key),
        )
        .await;
    }

    /// Scan result: account groups discovered on the page, persisted so
    /// the settings surface can offer them.
    pub async fn available_accounts_updated(&mut self, accounts: BTreeMap<String, String>) {
        self.state.settings.available_accounts = accounts.clone();
        save_settings_best_effort(
            self.settings_store.as_ref(),
            SettingsPatch::new().available_accounts(&accounts),
        )
        .await;
    }

    /// Persist the account-group selection.
    pub async fn set_selected_accounts(&mut self, selected: Vec<String>) {
        save_settings_best_effort(
            self.settings_store.as_ref(),
            SettingsPatch::new().selected_accounts(&selected),
        )
        .await;
        self.state.settings.selected_accounts = selected;
    }

    /// Auto-save the balance link draft while the user types.
    pub async fn set_balance_link_draft(&mut self, link: &str) {
        self.state.settings.balance_database_link_draft = link.to_string();
        save_settings_best_effort(
            self.settings_store.as_ref(),
            SettingsPatch::new().balance_database_link_draft(link),
        )
        .await;
    }

    /// Auto-save the transactions link draft while the user types.
    pub async fn set_transactions_link_draft(&mut self, link: &str) {
        self.state.settings.transactions_database_link_draft = link.to_string();
        save_settings_best_effort(
            self.settings_store.as_ref(),
            SettingsPatch::new().transactions_database_link_draft(link),
        )
        .await;
    }

    /// Update one mapping field and persist the whole mapping.
    pub async fn set_mapping_field(&mut self, field: MappingField, property_name: &str) {
        let mut mapping = self
            .state
            .settings
            .transactions_field_mapping
            .clone()
            .unwrap_or_default();
        let slot = match field {
            MappingField::Date => &mut mapping.date_property,
            MappingField::Amount => &mut mapping.amount_property,
            MappingField::Merchant => &mut mapping.merchant_property,
            MappingField::AccountName => &mut mapping.account_name_property,
        };
        *slot = property_name.to_string();

        self.state.settings.transactions_field_mapping = Some(mapping.clone());
        save_settings_best_effort(
            self.settings_store.as_ref(),
            SettingsPatch::new().transactions_field_mapping(Some(&mapping)),
        )
        .await;
    }

    /// Connect (or reconnect) the balance database from a pasted link.
    pub async fn connect_balance_database(&mut self, link: &str) -> Result<(), String> {
        let result = self.connect_balance_inner(link).await;
        self.state.balance_connect_error = result.as_ref().err().cloned();
        result
    }

    async fn connect_balance_inner(&mut self, link: &str) -> Result<(), String> {
        let api_key = self.require_api_key()?;
        if link.trim().is_empty() {
            return Err("Paste a Notion database block link first.".to_string());
        }

        let connection =
            connect_database(self.store.as_ref(), &api_key, link, DatabaseKind::Balance)
                .await
                .map_err(|error| error.to_string())?;

        self.state.settings.balance_database = Some(connection.database.clone());
        self.state.settings.balance_database_link_draft = link.to_string();
        save_settings(
            self.settings_store.as_ref(),
            SettingsPatch::new()
                .balance_database(Some(&connection.database))
                .balance_database_link_draft(link),
        )
        .await
    }

    /// Connect (or reconnect) the transactions database, replacing the
    /// field mapping with the fresh suggestion.
    pub async fn connect_transactions_database(&mut self, link: &str) -> Result<(), String> {
        let result = self.connect_transactions_inner(link).await;
        self.state.transactions_connect_error = result.as_ref().err().cloned();
        result
    }

    async fn connect_transactions_inner(&mut self, link: &str) -> Result<(), String> {
        let api_key = self.require_api_key()?;
        if link.trim().is_empty() {
            return Err("Paste a Notion database block link first.".to_string());
        }

        let connection = connect_database(
            self.store.as_ref(),
            &api_key,
            link,
            DatabaseKind::Transactions,
        )
        .await
        .map_err(|error| error.to_string())?;

        let mapping = connection.suggested_mapping.clone().unwrap_or_default();
        self.state.settings.transactions_database = Some(connection.database.clone());
        self.state.settings.transactions_field_mapping = Some(mapping.clone());
        self.state.settings.transactions_database_link_draft = link.to_string();
        save_settings(
            self.settings_store.as_ref(),
            SettingsPatch::new()
                .transactions_database(Some(&connection.database))
                .transactions_field_mapping(Some(&mapping))
                .transactions_database_link_draft(link),
        )
        .await
    }

    /// Disconnect the balance database and clear its draft.
    pub async fn clear_balance_database(&mut self) {
        self.state.settings.balance_database = None;
        self.state.settings.balance_database_link_draft.clear();
        self.state.balance_connect_error = None;
        save_settings_best_effort(
            self.settings_store.as_ref(),
            SettingsPatch::new()
                .balance_database(None)
                .balance_database_link_draft(""),
        )
        .await;
    }

    /// Disconnect the transactions database, its mapping, and its draft.
    pub async fn clear_transactions_database(&mut self) {
        self.state.settings.transactions_database = None;
        self.state.settings.transactions_field_mapping = None;
        self.state.settings.transactions_database_link_draft.clear();
        self.state.transactions_connect_error = None;
        save_settings_best_effort(
            self.settings_store.as_ref(),
            SettingsPatch::new()
                .transactions_database(None)
                .transactions_field_mapping(None)
                .transactions_database_link_draft(""),
        )
        .await;
    }

    /// Discover databases the credential can reach (settings scan).
    pub async fn list_databases(&self) -> Result<Vec<Database>, String> {
        let api_key = self.require_api_key()?;
        let raw = self
            .store
            .search_databases(&api_key)
            .await
            .map_err(|error| error.to_string())?;
        Ok(raw.iter().map(|db| map_database(db, "", None)).collect())
    }

    /// Sync whatever the current page produced.
    pub async fn sync(&mut self) -> SyncOutcome {
        match self.state.page_mode {
            PageMode::Balances => self.sync_balances().await,
            PageMode::Transactions => self.sync_transactions().await,
            PageMode::Unknown => {
                let outcome = SyncOutcome::Failed(
                    "Open either an accounts overview page or a credit-card transactions page."
                        .to_string(),
                );
                self.record_outcome(&outcome);
                outcome
            }
        }
    }

    /// Sync scraped balances. Any failing precondition aborts before a
    /// single network write, with a message naming what is missing.
    pub async fn sync_balances(&mut self) -> SyncOutcome {
        let outcome = self.sync_balances_inner().await;
        self.record_outcome(&outcome);
        outcome
    }

    async fn sync_balances_inner(&mut self) -> SyncOutcome {
        if self.state.settings.notion_api_key.trim().is_empty() {
            return SyncOutcome::Failed("Enter your Notion API key first.".to_string());
        }
        let Some(database) = self.state.settings.balance_database.clone() else {
            return SyncOutcome::Failed(
                "Connect an account balance database in Settings first.".to_string(),
            );
        };
        if !database.schema_is_valid() {
            return SyncOutcome::Failed("Balance database schema is still incomplete.".to_string());
        }

        let title_key = database
            .property_by_kind(PropertyKind::Title)
            .map(|property| property.name.clone());
        let balance_key = database
            .property_by_kind(PropertyKind::Number)
            .map(|property| property.name.clone());
        let date_key = database
            .property_by_kind(PropertyKind::Date)
            .map(|property| property.name.clone());
        let (Some(title_key), Some(balance_key), Some(date_key)) =
            (title_key, balance_key, date_key)
        else {
            return SyncOutcome::Failed(
                "Balance database is missing a title, number, or date property.".to_string(),
            );
        };

        if self.state.accounts.is_empty() {
            return SyncOutcome::Failed(
                "No account balances detected on the current page.".to_string(),
            );
        }

        let token = self.state.settings.notion_api_key.clone();
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        debug!(
            "Syncing {} balances into {}",
            self.state.accounts.len(),
            database.id
        );

        let writes = self.state.accounts.iter().map(|account| {
            let mut properties = BTreeMap::new();
            properties.insert(title_key.clone(), PropertyValue::Title(account.name.clone()));
            properties.insert(
                balance_key.clone(),
                PropertyValue::Number(parse_signed_amount(&account.balance)),
            );
            properties.insert(date_key.clone(), PropertyValue::Date(timestamp.clone()));
            self.store.create_record(&token, &database.id, properties)
        });

        match try_join_all(writes).await {
            Ok(created) => SyncOutcome::BalancesSynced {
                created: created.len(),
            },
            Err(error) => SyncOutcome::Failed(format!("Notion sync failed: {error}")),
        }
    }

    /// Sync scraped transactions: provision the sync-id column if needed,
    /// run duplicate detection, and write only the new records.
    pub async fn sync_transactions(&mut self) -> SyncOutcome {
        let outcome = self.sync_transactions_inner().await;
        self.record_outcome(&outcome);
        outcome
    }

    async fn sync_transactions_inner(&mut self) -> SyncOutcome {
        if self.state.settings.notion_api_key.trim().is_empty() {
            return SyncOutcome::Failed("Enter your Notion API key first.".to_string());
        }
        let Some(database) = self.state.settings.transactions_database.clone() else {
            return SyncOutcome::Failed(
                "Connect a transactions database in Settings first.".to_string(),
            );
        };

        let mapping_errors = validate_mapping(
            self.state.settings.transactions_field_mapping.as_ref(),
            Some(&database),
        );
        if let Some(first_error) = mapping_errors.into_iter().next() {
            return SyncOutcome::Failed(first_error);
        }
        let Some(mapping) = self.state.settings.transactions_field_mapping.clone() else {
            return SyncOutcome::Failed("Transactions field mapping is incomplete.".to_string());
        };

        if self.state.transactions.is_empty() {
            return SyncOutcome::Failed(
                "No transactions detected on the current page.".to_string(),
            );
        }

        let token = self.state.settings.notion_api_key.clone();
        let database = match ensure_sync_id_property(self.store.as_ref(), &token, &database).await
        {
            Ok(database) => database,
            Err(error) => return SyncOutcome::Failed(format!("Transactions sync failed: {error}")),
        };
        self.state.settings.transactions_database = Some(database.clone());
        // Refresh the persisted definition; a failed local save must not
        // block the sync itself.
        save_settings_best_effort(
            self.settings_store.as_ref(),
            SettingsPatch::new().transactions_database(Some(&database)),
        )
        .await;

        let Some(merchant_property) = database.property_by_name(&mapping.merchant_property).cloned()
        else {
            return SyncOutcome::Failed(
                "Transactions database is missing either the merchant field or the Sync ID field."
                    .to_string(),
            );
        };
        if database.property_by_name(SYNC_ID_PROPERTY).is_none() {
            return SyncOutcome::Failed(
                "Transactions database is missing either the merchant field or the Sync ID field."
                    .to_string(),
            );
        }

        let Some(range) = transactions_date_range(&self.state.transactions) else {
            return SyncOutcome::Failed(
                "Could not determine the transactions date range from the current page."
                    .to_string(),
            );
        };

        let existing = match existing_sync_ids(
            self.store.as_ref(),
            &token,
            &database.id,
            &mapping.date_property,
            &range,
        )
        .await
        {
            Ok(existing) => existing,
            Err(error) => return SyncOutcome::Failed(format!("Transactions sync failed: {error}")),
        };

        let decision = partition_unsynced(&self.state.transactions, &existing);
        if decision.to_write.is_empty() {
            return SyncOutcome::TransactionsSynced {
                written: 0,
                skipped: decision.skipped,
            };
        }
        debug!(
            "Writing {} transactions into {} ({} skipped)",
            decision.to_write.len(),
            database.id,
            decision.skipped
        );

        let writes = decision.to_write.iter().map(|candidate| {
            let mut properties = BTreeMap::new();
            properties.insert(
                mapping.date_property.clone(),
                PropertyValue::Date(candidate.transaction.date.clone()),
            );
            properties.insert(
                mapping.amount_property.clone(),
                PropertyValue::Number(candidate.transaction.amount_value),
            );
            properties.insert(
                mapping.account_name_property.clone(),
                PropertyValue::RichText(candidate.transaction.account_name.clone()),
            );
            properties.insert(
                SYNC_ID_PROPERTY.to_string(),
                PropertyValue::RichText(candidate.sync_id.clone()),
            );
            // The merchant goes into whichever shape its column actually has.
            let merchant = candidate.transaction.merchant.clone();
            let merchant_value = if merchant_property.kind == PropertyKind::Title {
                PropertyValue::Title(merchant)
            } else {
                PropertyValue::RichText(merchant)
            };
            properties.insert(mapping.merchant_property.clone(), merchant_value);

            self.store.create_record(&token, &database.id, properties)
        });

        match try_join_all(writes).await {
            Ok(written) => SyncOutcome::TransactionsSynced {
                written: written.len(),
                skipped: decision.skipped,
            },
            Err(error) => SyncOutcome::Failed(format!("Transactions sync failed: {error}")),
        }
    }

    fn require_api_key(&self) -> Result<String, String> {
        let api_key = self.state.settings.notion_api_key.trim().to_string();
        if api_key.is_empty() {
            return Err("Enter your Notion API key first.".to_string());
        }
        Ok(api_key)
    }

    fn record_outcome(&mut self, outcome: &SyncOutcome) {
        match outcome {
            SyncOutcome::Failed(message) => {
                self.state.last_error = Some(message.clone());
                self.state.last_result = None;
            }
            success => {
                self.state.last_error = None;
                self.state.last_result = Some(success.message());
            }
        }
    }
}

/// Parse a scraped currency string into a signed number.
///
/// Unicode minus variants map to `-`, everything except digits, `.` and
/// `-` is stripped, and whatever still fails to parse counts as zero
/// rather than aborting the sync.
pub fn parse_signed_amount(value: &str) -> f64 {
    let normalized: String = value
        .chars()
        .map(|c| if c == '\u{2212}' || c == '\u{2013}' { '-' } else { c })
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    parse_leading_float(&normalized).unwrap_or(0.0)
}

/// Parse the longest numeric prefix, the way lenient scrapers need:
/// `-12.34.56` yields `-12.34`, a bare sign yields nothing.
fn parse_leading_float(value: &str) -> Option<f64> {
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;
    for (index, byte) in value.bytes().enumerate() {
        match byte {
            b'-' if index == 0 => {}
            b'.' if !seen_dot => seen_dot = true,
            b'0'..=b'9' => seen_digit = true,
            _ => break,
        }
        end = index + 1;
    }

    if !seen_digit {
        return None;
    }
    value[..end].parse().ok()
}
