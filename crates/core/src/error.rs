//! Error surface of the sync engine.

use thiserror::Error;

use crate::store::StoreError;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors surfaced by core operations.
///
/// `Input` covers anything detected before a network call is made (bad
/// link, empty credential, incomplete mapping) and is never worth
/// retrying. `Store` wraps the remote store's own failure, keeping its
/// code and message. Both render as a single human-readable line.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("{0}")]
    Input(String),

    #[error("{0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    /// Create a user-input error.
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    /// True when the failure never reached the network.
    pub fn is_input(&self) -> bool {
        matches!(self, Self::Input(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_keep_the_store_prefix() {
        let error = SyncError::from(StoreError::new(
            "object_not_found",
            "Could not find database with ID: abc.",
        ));
        assert_eq!(
            error.to_string(),
            "Notion [object_not_found]: Could not find database with ID: abc."
        );
        assert!(!error.is_input());
    }

    #[test]
    fn input_errors_render_verbatim() {
        let error = SyncError::input("Enter your Notion API key first.");
        assert_eq!(error.to_string(), "Enter your Notion API key first.");
        assert!(error.is_input());
    }
}
