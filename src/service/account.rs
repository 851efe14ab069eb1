//! Account service.

use alloc::sync::Arc;

use crate::cache::{AccountCache, AccountDraft};
use crate::config::Clock;
use crate::error::Result;
use crate::models::{Account, AccountId};
use crate::storage::Storage;

/// Account management with timestamps from the injected clock.
#[derive(Debug, Clone)]
pub struct AccountService {
    /// Backing cache.
    accounts: Arc<AccountCache>,
    /// Stamps `updated_at` on every change.
    clock: Arc<dyn Clock>,
}

impl AccountService {
    /// Creates a service over `accounts`.
    #[inline]
    #[must_use]
    pub fn new(accounts: Arc<AccountCache>, clock: Arc<dyn Clock>) -> Self {
        Self { accounts, clock }
    }

    /// Every account, soft-deleted ones included.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn all(&self) -> Result<Vec<Account>> {
        self.accounts.read_all()
    }

    /// Accounts shown to the user.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn active(&self) -> Result<Vec<Account>> {
        self.accounts.active()
    }

    /// Direct lookup, soft-deleted accounts included.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn get(&self, id: &AccountId) -> Result<Option<Account>> {
        self.accounts.get(id)
    }

    /// Adds a new account.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Validation`] if the name is empty.
    #[tracing::instrument(skip_all)]
    pub fn insert(&self, account: Account) -> Result<Account> {
        self.accounts.insert(account, self.clock.now())
    }

    /// Replaces an existing account.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Validation`] or
    /// [`crate::FinTableError::AccountNotFound`].
    #[tracing::instrument(skip_all)]
    pub fn update(&self, account: Account) -> Result<Account> {
        self.accounts.update(account, self.clock.now())
    }

    /// Soft-deletes an account.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::AccountNotFound`] if the id is
    /// unknown.
    #[tracing::instrument(skip(self))]
    pub fn delete(&self, id: &AccountId) -> Result<()> {
        self.accounts.delete(id, self.clock.now())
    }

    /// Editable snapshot of the active accounts.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn draft(&self) -> Result<AccountDraft> {
        self.accounts.draft()
    }

    /// Applies an edited draft all at once.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Validation`] or
    /// [`crate::FinTableError::AccountNotFound`]; nothing is applied then.
    #[tracing::instrument(skip_all)]
    pub fn commit(&self, draft: AccountDraft) -> Result<()> {
        self.accounts.commit(draft, self.clock.now())
    }

    /// Writes every account to `storage`, soft-deleted ones included so
    /// the backend can remove them. Returns the number written.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    #[tracing::instrument(skip_all)]
    pub fn save_all<S: Storage + ?Sized>(&self, storage: &S) -> Result<usize> {
        let accounts = self.accounts.read_all()?;
        storage.upsert_accounts(&accounts)?;
        tracing::debug!(count = accounts.len(), "saved accounts");
        Ok(accounts.len())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use super::*;
    use crate::FinTableError;
    use crate::config::FixedClock;
    use crate::storage::InMemoryStorage;

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn service() -> AccountService {
        AccountService::new(Arc::new(AccountCache::new()), Arc::new(FixedClock::new(now())))
    }

    #[test]
    fn insert_stamps_clock_time() {
        let accounts = service();
        let card = accounts.insert(Account::new("Card", 10)).unwrap();
        assert_eq!(card.updated_at, now());
        assert!(!card.id.is_unassigned());
    }

    #[test]
    fn deleted_account_is_hidden_but_retrievable() {
        let accounts = service();
        let card = accounts.insert(Account::new("Card", 10)).unwrap();
        accounts.delete(&card.id).unwrap();
        assert!(accounts.active().unwrap().is_empty());
        assert!(accounts.get(&card.id).unwrap().unwrap().deleted);
        assert_eq!(accounts.all().unwrap().len(), 1);
    }

    #[test]
    fn update_unknown_account_fails() {
        let accounts = service();
        let ghost = Account {
            id: AccountId::from("ghost"),
            ..Account::new("Ghost", 0)
        };
        assert!(matches!(
            accounts.update(ghost),
            Err(FinTableError::AccountNotFound(_))
        ));
    }

    #[test]
    fn draft_commit_round_trip() {
        let accounts = service();
        let card = accounts.insert(Account::new("Card", 10)).unwrap();
        let mut draft = accounts.draft().unwrap();
        if let Some(entry) = draft.get_mut(&card.id) {
            entry.sum = 25;
        }
        draft.push(Account::new("Cash", 5));
        accounts.commit(draft).unwrap();

        let sums: Vec<i64> = accounts.active().unwrap().iter().map(|a| a.sum).collect();
        assert_eq!(sums, vec![25, 5]);
    }

    #[test]
    fn save_all_removes_deleted_from_backend() {
        let accounts = service();
        let card = accounts.insert(Account::new("Card", 10)).unwrap();
        let _cash = accounts.insert(Account::new("Cash", 5)).unwrap();
        let storage = InMemoryStorage::new();
        let _written = accounts.save_all(&storage).unwrap();
        accounts.delete(&card.id).unwrap();
        assert_eq!(accounts.save_all(&storage).unwrap(), 2);

        let stored = storage.accounts().unwrap();
        assert_eq!(stored.len(), 1);
        assert!(stored.iter().all(|account| account.name == "Cash"));
    }
}
