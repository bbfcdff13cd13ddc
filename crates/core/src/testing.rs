//! Scripted in-memory collaborators and fixture builders for engine tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use crate::decode::display_hint_for;
use crate::model::{Database, DatabaseProperty, PropertyKind, Transaction};
use crate::settings::SettingsStore;
use crate::store::{
    DateRangeFilter, DocumentStore, PropertySpec, PropertyValue, RawDatabase, RawProperty,
    RawRecord, RawRecordProperty, RecordPage, StoreError, TextFragment,
};

/// Scripted document store. Databases are served by id and mutated by
/// property creation the way the real store is; query pages pop in order;
/// every call is captured for assertions.
#[derive(Default)]
pub struct MockStore {
    pub databases: Mutex<BTreeMap<String, RawDatabase>>,
    pub query_pages: Mutex<VecDeque<RecordPage>>,
    pub query_cursors: Mutex<Vec<Option<String>>>,
    pub query_filters: Mutex<Vec<DateRangeFilter>>,
    pub update_calls: Mutex<Vec<(String, BTreeMap<String, PropertySpec>)>>,
    pub created: Mutex<Vec<(String, BTreeMap<String, PropertyValue>)>>,
    pub search_results: Mutex<Vec<RawDatabase>>,
    pub fail_update: Mutex<Option<StoreError>>,
    pub fail_create: Mutex<Option<StoreError>>,
}

impl MockStore {
    pub fn with_database(raw: RawDatabase) -> Self {
        let store = Self::default();
        store
            .databases
            .lock()
            .expect("databases")
            .insert(raw.id.clone(), raw);
        store
    }

    /// Current definition of a stored database.
    pub fn database(&self, id: &str) -> RawDatabase {
        self.databases
            .lock()
            .expect("databases")
            .get(id)
            .cloned()
            .expect("database exists")
    }

    pub fn push_query_page(&self, page: RecordPage) {
        self.query_pages.lock().expect("pages").push_back(page);
    }
}

#[async_trait]
impl DocumentStore for MockStore {
    async fn retrieve_database(
        &self,
        _token: &str,
        database_id: &str,
    ) -> Result<RawDatabase, StoreError> {
        self.databases
            .lock()
            .expect("databases")
            .get(database_id)
            .cloned()
            .ok_or_else(|| {
                StoreError::new(
                    "object_not_found",
                    format!("Could not find database with ID: {database_id}."),
                )
            })
    }

    async fn update_database_properties(
        &self,
        _token: &str,
        database_id: &str,
        properties: BTreeMap<String, PropertySpec>,
    ) -> Result<(), StoreError> {
        if let Some(error) = self.fail_update.lock().expect("fail flag").clone() {
            return Err(error);
        }

        self.update_calls
            .lock()
            .expect("update calls")
            .push((database_id.to_string(), properties.clone()));

        let mut databases = self.databases.lock().expect("databases");
        if let Some(database) = databases.get_mut(database_id) {
            for (name, spec) in properties {
                let kind = match spec {
                    PropertySpec::Number { .. } => "number",
                    PropertySpec::Date => "date",
                    PropertySpec::RichText => "rich_text",
                };
                database.properties.insert(
                    name.clone(),
                    RawProperty {
                        id: Some(name.clone()),
                        name: Some(name),
                        kind: Some(kind.to_string()),
                    },
                );
            }
        }
        Ok(())
    }

    async fn query_database(
        &self,
        _token: &str,
        _database_id: &str,
        filter: &DateRangeFilter,
        _page_size: u32,
        cursor: Option<&str>,
    ) -> Result<RecordPage, StoreError> {
        self.query_cursors
            .lock()
            .expect("cursors")
            .push(cursor.map(str::to_string));
        self.query_filters
            .lock()
            .expect("filters")
            .push(filter.clone());
        Ok(self
            .query_pages
            .lock()
            .expect("pages")
            .pop_front()
            .unwrap_or_default())
    }

    async fn create_record(
        &self,
        _token: &str,
        database_id: &str,
        properties: BTreeMap<String, PropertyValue>,
    ) -> Result<(), StoreError> {
        if let Some(error) = self.fail_create.lock().expect("fail flag").clone() {
            return Err(error);
        }
        self.created
            .lock()
            .expect("created")
            .push((database_id.to_string(), properties));
        Ok(())
    }

    async fn search_databases(&self, _token: &str) -> Result<Vec<RawDatabase>, StoreError> {
        Ok(self.search_results.lock().expect("search").clone())
    }
}

/// In-memory settings store with a switchable write failure.
#[derive(Default)]
pub struct MockSettings {
    pub values: Mutex<BTreeMap<String, Value>>,
    pub fail_set: Mutex<bool>,
    pub set_calls: Mutex<usize>,
}

impl MockSettings {
    pub fn insert(&self, key: &str, value: Value) {
        self.values
            .lock()
            .expect("values")
            .insert(key.to_string(), value);
    }
}

#[async_trait]
impl SettingsStore for MockSettings {
    async fn get(&self, keys: &[&str]) -> Result<BTreeMap<String, Value>, String> {
        let values = self.values.lock().expect("values");
        Ok(keys
            .iter()
            .filter_map(|key| values.get(*key).map(|value| (key.to_string(), value.clone())))
            .collect())
    }

    async fn set(&self, values: BTreeMap<String, Value>) -> Result<(), String> {
        if *self.fail_set.lock().expect("flag") {
            return Err("storage write failed".to_string());
        }
        *self.set_calls.lock().expect("calls") += 1;
        self.values.lock().expect("values").extend(values);
        Ok(())
    }
}

/// Raw database fixture from (name, type) pairs.
pub fn raw_database(id: &str, properties: &[(&str, &str)]) -> RawDatabase {
    RawDatabase {
        id: id.to_string(),
        title: vec![TextFragment {
            plain_text: Some("Ledger".to_string()),
        }],
        icon: None,
        properties: properties
            .iter()
            .map(|(name, kind)| {
                (
                    name.to_string(),
                    RawProperty {
                        id: Some(name.to_string()),
                        name: Some(name.to_string()),
                        kind: Some(kind.to_string()),
                    },
                )
            })
            .collect(),
    }
}

/// Typed database fixture, preserving the given property order.
pub fn database_with(properties: &[(&str, &str)]) -> Database {
    Database {
        id: "db-test".to_string(),
        title: "Ledger".to_string(),
        icon: None,
        emoji: None,
        properties: properties
            .iter()
            .map(|(name, kind)| {
                let kind = PropertyKind::from_wire(kind);
                DatabaseProperty {
                    id: name.to_string(),
                    name: name.to_string(),
                    kind,
                    display_hint: display_hint_for(kind).to_string(),
                }
            })
            .collect(),
        link: String::new(),
        schema_status: None,
    }
}

/// Transaction fixture with only the identity fields filled.
pub fn transaction(merchant: &str, date: &str, amount_value: f64, account_name: &str) -> Transaction {
    Transaction {
        key: String::new(),
        date: date.to_string(),
        amount_text: String::new(),
        amount_value,
        merchant: merchant.to_string(),
        account_name: account_name.to_string(),
        direction: Default::default(),
        category: String::new(),
    }
}

/// A queried record carrying one sync id.
pub fn record_with_sync_id(sync_id: &str) -> RawRecord {
    let mut properties = BTreeMap::new();
    properties.insert(
        crate::schema::SYNC_ID_PROPERTY.to_string(),
        RawRecordProperty {
            kind: Some("rich_text".to_string()),
            title: None,
            rich_text: Some(vec![TextFragment {
                plain_text: Some(sync_id.to_string()),
            }]),
        },
    );
    RawRecord { properties }
}
