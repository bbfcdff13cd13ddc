//! Duplicate detection against the remote store and the write decision.

use log::debug;
use std::collections::HashSet;

use crate::fingerprint::transaction_sync_id;
use crate::model::Transaction;
use crate::schema::SYNC_ID_PROPERTY;
use crate::store::{DateRangeFilter, DocumentStore, StoreError};

/// Page size for the duplicate-detection query.
pub const DEDUP_PAGE_SIZE: u32 = 100;

/// Inclusive date window spanned by a batch. `None` for an empty batch or
/// one whose rows carry no usable dates.
pub fn transactions_date_range(transactions: &[Transaction]) -> Option<(String, String)> {
    let mut dates: Vec<&str> = transactions
        .iter()
        .map(|transaction| transaction.date.as_str())
        .filter(|date| !date.is_empty())
        .collect();
    if dates.is_empty() {
        return None;
    }

    dates.sort_unstable();
    Some((dates[0].to_string(), dates[dates.len() - 1].to_string()))
}

/// Collect the sync ids of every record already inside the window.
///
/// Pages are fetched strictly in sequence: each continuation token is only
/// known once the previous page has arrived. Scoping the scan to the
/// batch's own date span is sound because the fingerprint depends on the
/// date, so prior duplicates cannot live outside it.
pub async fn existing_sync_ids(
    store: &dyn DocumentStore,
    token: &str,
    database_id: &str,
    date_property: &str,
    range: &(String, String),
) -> Result<HashSet<String>, StoreError> {
    let filter = DateRangeFilter {
        property: date_property.to_string(),
        start: range.0.clone(),
        end: range.1.clone(),
    };

    let mut sync_ids = HashSet::new();
    let mut cursor: Option<String> = None;
    loop {
        let page = store
            .query_database(token, database_id, &filter, DEDUP_PAGE_SIZE, cursor.as_deref())
            .await?;

        for record in &page.results {
            if let Some(property) = record.properties.get(SYNC_ID_PROPERTY) {
                let sync_id = property.plain_text();
                if !sync_id.is_empty() {
                    sync_ids.insert(sync_id);
                }
            }
        }

        cursor = if page.has_more { page.next_cursor } else { None };
        if cursor.is_none() {
            break;
        }
    }

    debug!(
        "Found {} existing sync ids between {} and {}",
        sync_ids.len(),
        range.0,
        range.1
    );
    Ok(sync_ids)
}

/// A candidate transaction paired with its fingerprint.
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintedTransaction {
    pub transaction: Transaction,
    pub sync_id: String,
}

/// Write decision for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct DedupOutcome {
    pub to_write: Vec<FingerprintedTransaction>,
    pub skipped: usize,
}

/// Keep the first occurrence of each fingerprint not already present
/// remotely. Every kept candidate is marked as seen so intra-batch
/// duplicates are skipped too.
pub fn partition_unsynced(
    transactions: &[Transaction],
    existing: &HashSet<String>,
) -> DedupOutcome {
    let mut seen = existing.clone();
    let mut to_write = Vec::new();

    for transaction in transactions {
        let sync_id = transaction_sync_id(transaction);
        if seen.insert(sync_id.clone()) {
            to_write.push(FingerprintedTransaction {
                transaction: transaction.clone(),
                sync_id,
            });
        }
    }

    DedupOutcome {
        skipped: transactions.len() - to_write.len(),
        to_write,
    }
}
