//! Error types for the fintable library.

use crate::models::{AccountId, Period};

/// All errors that can occur when working with the ledger, its caches and
/// its persistence backends.
#[derive(Debug, thiserror::Error)]
pub enum FinTableError {
    /// Configuration is missing, unreadable or inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// Input was rejected before reaching any cache.
    #[error("validation error: {0}")]
    Validation(String),

    /// A cache mutex was poisoned by a panicking holder.
    #[error("lock poisoned: {0}")]
    Lock(String),

    /// The main category is not part of the configured ordering.
    #[error("main category not found: {0}")]
    MainCategoryNotFound(String),

    /// No category with the given main category and name exists.
    #[error("category not found: {main_category}/{name}")]
    CategoryNotFound {
        /// Main category the lookup was made under.
        main_category: String,
        /// Category name that was looked up.
        name: String,
    },

    /// A category with the given main category and name already exists.
    #[error("category already exists: {main_category}/{name}")]
    DuplicateCategory {
        /// Main category of the conflicting entry.
        main_category: String,
        /// Conflicting category name.
        name: String,
    },

    /// No account with the given id exists.
    #[error("account not found: {0}")]
    AccountNotFound(AccountId),

    /// The running balance of the preceding period was never computed.
    #[error("not found month balance for {0}")]
    PreviousBalanceNotFound(Period),

    /// The period lies before the configured start of the balance chain.
    #[error("period {period} is before the start period {start}")]
    PeriodBeforeStart {
        /// Requested period.
        period: Period,
        /// Configured start period.
        start: Period,
    },

    /// A sum or balance left the range of `i64`.
    #[error("amount overflow in {0}")]
    Overflow(Period),

    /// Persistence backend failed.
    #[error("storage error: {0}")]
    Storage(Box<dyn core::error::Error + Send + Sync>),

    /// A transaction failed and rolling it back failed as well.
    #[error("storage error: {source}; rollback also failed: {rollback}")]
    Rollback {
        /// The failure that triggered the rollback.
        source: Box<dyn core::error::Error + Send + Sync>,
        /// The failure of the rollback itself.
        rollback: Box<dyn core::error::Error + Send + Sync>,
    },

    /// The recalculation worker is no longer receiving periods.
    #[error("recalculation worker has stopped")]
    WorkerStopped,

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, FinTableError>;

/// Wraps a mutex poison error into a [`FinTableError::Lock`].
pub(crate) fn lock_error<T>(err: &std::sync::PoisonError<T>) -> FinTableError {
    FinTableError::Lock(err.to_string())
}

/// Wraps an I/O error into a [`FinTableError::Storage`].
#[cfg(any(feature = "storage-file", feature = "storage-sqlite"))]
pub(crate) fn storage_io_error(err: std::io::Error) -> FinTableError {
    FinTableError::Storage(Box::new(err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_from_serde_json() {
        let serde_err = serde_json::from_str::<String>("not json").unwrap_err();
        let err = FinTableError::from(serde_err);
        assert!(matches!(err, FinTableError::Serialization(_)));
        assert!(err.to_string().contains("serialization error"));
    }

    #[test]
    fn error_storage_display() {
        let inner = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = FinTableError::Storage(Box::new(inner));
        let msg = err.to_string();
        assert!(msg.contains("storage error"));
        assert!(msg.contains("file missing"));
    }

    #[test]
    fn rollback_reports_both_failures() {
        let err = FinTableError::Rollback {
            source: "insert failed".into(),
            rollback: "connection lost".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("insert failed"));
        assert!(msg.contains("rollback also failed: connection lost"));
    }

    #[test]
    fn previous_balance_display_names_period() {
        let err = FinTableError::PreviousBalanceNotFound(Period::new(2023, 2).unwrap());
        assert_eq!(err.to_string(), "not found month balance for 02.2023");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FinTableError>();
    }
}
