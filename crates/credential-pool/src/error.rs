//! Error types for pool operations

use crate::account::AccountId;

/// Errors from pool operations.
///
/// `Validation` and `NotFound` are caller mistakes. `NoCapacity` is the normal
/// answer when every account is busy, cooling down or out of quota.
/// `Persistence` on a mutating call means the in-memory change was applied but
/// could not be written to the store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("account not found: {0}")]
    NotFound(AccountId),

    #[error(
        "no capacity: {total} accounts ({cooling_down} cooling down, {disabled} disabled, {exhausted} rate limited or over quota)"
    )]
    NoCapacity {
        total: usize,
        cooling_down: usize,
        disabled: usize,
        exhausted: usize,
    },

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl Error {
    /// Whether this is the steady-state "nothing eligible right now" outcome.
    pub fn is_no_capacity(&self) -> bool {
        matches!(self, Error::NoCapacity { .. })
    }
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_capacity_message_includes_counts() {
        let err = Error::NoCapacity {
            total: 4,
            cooling_down: 1,
            disabled: 2,
            exhausted: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("4 accounts"), "got: {msg}");
        assert!(msg.contains("1 cooling down"), "got: {msg}");
        assert!(msg.contains("2 disabled"), "got: {msg}");
        assert!(err.is_no_capacity());
    }

    #[test]
    fn not_found_names_the_id() {
        let err = Error::NotFound(AccountId(42));
        assert_eq!(err.to_string(), "account not found: 42");
        assert!(!err.is_no_capacity());
    }
}
