//! Notion REST client for the ledgersync engine.
//!
//! Implements the `DocumentStore` boundary from `ledgersync-core` against
//! the real API: database retrieval, property creation, paginated record
//! queries, record creation, and database search.

mod client;
mod error;

pub use client::NotionClient;
pub use error::{NotionError, Result};
