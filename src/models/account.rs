//! Account model.

use chrono::{DateTime, Utc};

use super::AccountId;
use crate::error::{FinTableError, Result};

/// Name of the account seeded into an empty store.
const STARTING_ACCOUNT_NAME: &str = "Account 1";

/// A named balance holder (bank account, wallet, cash).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Identifier; unassigned for accounts not yet inserted.
    pub id: AccountId,
    /// Display name.
    pub name: String,
    /// Current amount in whole currency units.
    pub sum: i64,
    /// Free-text note.
    pub note: String,
    /// Counted in the aggregate account sum.
    pub in_sum: bool,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Soft-deleted: kept for direct lookup, excluded everywhere else.
    pub deleted: bool,
}

impl Account {
    /// Creates a new, not yet inserted account counted in the sum.
    #[inline]
    #[must_use]
    pub fn new<N: Into<String>>(name: N, sum: i64) -> Self {
        Self {
            id: AccountId::default(),
            name: name.into(),
            sum,
            note: String::new(),
            in_sum: true,
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
            deleted: false,
        }
    }

    /// Checks that the account has a name.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Validation`] if the name is empty.
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(FinTableError::Validation("account name is required".to_owned()));
        }
        Ok(())
    }

    /// Seed account for an empty store.
    #[must_use]
    pub(crate) fn starting(now: DateTime<Utc>) -> Self {
        Self {
            id: AccountId::generate(),
            updated_at: now,
            ..Self::new(STARTING_ACCOUNT_NAME, 0)
        }
    }
}

/// Aggregates shown under the grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountSums {
    /// Sum of every active account counted in the sum.
    pub main_sum: i64,
    /// `main_sum` minus the running balance of the current month.
    pub diff_sum: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_defaults() {
        let account = Account::new("Wallet", 150);
        assert!(account.id.is_unassigned());
        assert!(account.in_sum);
        assert!(!account.deleted);
        assert!(account.note.is_empty());
    }

    #[test]
    fn validate_requires_name() {
        assert!(matches!(
            Account::new("", 0).validate(),
            Err(FinTableError::Validation(_))
        ));
    }

    #[test]
    fn starting_account() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let account = Account::starting(now);
        assert_eq!(account.name, "Account 1");
        assert_eq!(account.sum, 0);
        assert_eq!(account.updated_at, now);
        assert!(!account.id.is_unassigned());
    }
}
