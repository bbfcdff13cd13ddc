//! Schema reconciliation and idempotent sync engine for mirroring scraped
//! account balances and card transactions into Notion databases.
//!
//! The engine owns the domain logic only: the document store, the settings
//! store, and the page scraper all sit behind traits and are supplied by
//! the caller. Remote schemas are audited and repaired per record kind,
//! field mappings are suggested and validated against the live schema, and
//! transaction writes are deduplicated by a content-derived fingerprint.

pub mod app;
pub mod decode;
pub mod dedup;
pub mod error;
pub mod fingerprint;
pub mod ident;
pub mod mapping;
pub mod model;
pub mod schema;
pub mod settings;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use app::{AppState, MappingField, PageMode, SyncApp, SyncOutcome};
pub use error::{Result, SyncError};
pub use model::{
    Account, Database, DatabaseKind, DatabaseProperty, DatabaseSchemaStatus, PropertyKind,
    Transaction, TransactionDirection, TransactionsFieldMapping,
};
pub use settings::{SettingsStore, SyncSettings};
pub use store::{DocumentStore, StoreError};
