//! Content-derived transaction identity.
//!
//! The fingerprint is the sole de-duplication key: two records with the
//! same normalized merchant, date, two-decimal amount, and account name
//! are the same logical transaction no matter which scrape produced them.
//! No source row key or remote primary key participates.

use sha2::{Digest, Sha256};

use crate::model::Transaction;

/// Lowercase, trim, and collapse internal whitespace runs to single
/// spaces, so cosmetic scrape differences never change identity.
pub fn normalize_part(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Deterministic fingerprint for one transaction, rendered as lowercase
/// hex. Stable across runs and devices.
pub fn transaction_sync_id(transaction: &Transaction) -> String {
    let seed = format!(
        "{}|{}|{:.2}|{}",
        normalize_part(&transaction.merchant),
        transaction.date,
        transaction.amount_value,
        normalize_part(&transaction.account_name),
    );

    hex::encode(Sha256::digest(seed.as_bytes()))
}
