//! Account cache with soft deletion and batch-edit drafts.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::error::{FinTableError, Result, lock_error};
use crate::models::{Account, AccountId};

/// Inner mutable state.
#[derive(Debug, Default)]
struct Inner {
    /// Accounts in insertion order, soft-deleted ones included.
    accounts: Vec<Account>,
    /// Position of every account in `accounts`.
    index: HashMap<AccountId, usize>,
}

impl Inner {
    /// Appends an account and indexes it.
    fn push(&mut self, account: Account) {
        let _old = self.index.insert(account.id.clone(), self.accounts.len());
        self.accounts.push(account);
    }

    /// Mutable access by id.
    fn get_mut(&mut self, id: &AccountId) -> Option<&mut Account> {
        let &idx = self.index.get(id)?;
        self.accounts.get_mut(idx)
    }

    /// Assigns id and timestamp to a new account and stores it.
    fn insert(&mut self, account: Account, now: DateTime<Utc>) -> Account {
        let stored = Account {
            id: AccountId::generate(),
            updated_at: now,
            ..account
        };
        self.push(stored.clone());
        stored
    }

    /// Replaces an existing account, stamping the update time.
    fn update(&mut self, account: Account, now: DateTime<Utc>) -> Result<Account> {
        let slot = self
            .get_mut(&account.id)
            .ok_or_else(|| FinTableError::AccountNotFound(account.id.clone()))?;
        *slot = Account {
            updated_at: now,
            ..account
        };
        Ok(slot.clone())
    }

    /// Sets the deleted flag in place.
    fn delete(&mut self, id: &AccountId, now: DateTime<Utc>) -> Result<()> {
        let slot = self
            .get_mut(id)
            .ok_or_else(|| FinTableError::AccountNotFound(id.clone()))?;
        slot.deleted = true;
        slot.updated_at = now;
        Ok(())
    }
}

/// An owned, editable snapshot of the account list.
///
/// Obtained from [`AccountCache::draft`], edited freely, then applied with
/// [`AccountCache::commit`]. Nothing changes in the cache until commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountDraft {
    /// Edited accounts; entries with an unassigned id are new.
    accounts: Vec<Account>,
}

impl AccountDraft {
    /// Iterates the draft entries.
    #[inline]
    pub fn iter(&self) -> core::slice::Iter<'_, Account> {
        self.accounts.iter()
    }

    /// Iterates the draft entries mutably.
    #[inline]
    pub fn iter_mut(&mut self) -> core::slice::IterMut<'_, Account> {
        self.accounts.iter_mut()
    }

    /// Mutable access to an existing account by id.
    #[inline]
    pub fn get_mut(&mut self, id: &AccountId) -> Option<&mut Account> {
        self.accounts.iter_mut().find(|account| account.id == *id)
    }

    /// Adds a new account; its id is assigned on commit.
    #[inline]
    pub fn push(&mut self, account: Account) {
        self.accounts.push(Account {
            id: AccountId::default(),
            ..account
        });
    }

    /// Marks the account deleted. Returns `false` if the id is unknown.
    #[inline]
    pub fn remove(&mut self, id: &AccountId) -> bool {
        self.get_mut(id).map(|account| account.deleted = true).is_some()
    }

    /// Number of entries, deleted ones included.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Returns `true` if the draft has no entries.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

/// Thread-safe account list indexed by id.
#[derive(Debug, Default)]
pub struct AccountCache {
    /// All state behind a single mutex.
    inner: Mutex<Inner>,
}

impl AccountCache {
    /// Creates an empty cache.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the inner lock and applies a closure.
    fn with_lock<R, F>(&self, op: F) -> Result<R>
    where
        F: FnOnce(&mut Inner) -> R,
    {
        let mut inner = self.inner.lock().map_err(|err| lock_error(&err))?;
        Ok(op(&mut inner))
    }

    /// Replaces the contents with loaded accounts.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Lock`] if the cache lock is poisoned.
    pub fn init(&self, accounts: Vec<Account>) -> Result<()> {
        self.with_lock(|inner| {
            inner.accounts.clear();
            inner.index.clear();
            for account in accounts {
                inner.push(account);
            }
        })
    }

    /// Inserts a new account with a fresh id, stamped with `now`.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Validation`] if the name is empty.
    pub fn insert(&self, account: Account, now: DateTime<Utc>) -> Result<Account> {
        account.validate()?;
        self.with_lock(|inner| inner.insert(account, now))
    }

    /// Replaces the account with the same id, stamped with `now`.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Validation`] if the name is empty or
    /// [`FinTableError::AccountNotFound`] if the id is unknown.
    pub fn update(&self, account: Account, now: DateTime<Utc>) -> Result<Account> {
        account.validate()?;
        self.with_lock(|inner| inner.update(account, now))?
    }

    /// Soft-deletes an account; it stays retrievable through [`Self::get`].
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::AccountNotFound`] if the id is unknown.
    pub fn delete(&self, id: &AccountId, now: DateTime<Utc>) -> Result<()> {
        self.with_lock(|inner| inner.delete(id, now))?
    }

    /// Looks up an account by id, soft-deleted ones included.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn get(&self, id: &AccountId) -> Result<Option<Account>> {
        self.with_lock(|inner| inner.get_mut(id).map(|account| account.clone()))
    }

    /// Accounts that are not soft-deleted, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn active(&self) -> Result<Vec<Account>> {
        self.with_lock(|inner| {
            inner
                .accounts
                .iter()
                .filter(|account| !account.deleted)
                .cloned()
                .collect()
        })
    }

    /// Every account, soft-deleted ones included.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn read_all(&self) -> Result<Vec<Account>> {
        self.with_lock(|inner| inner.accounts.clone())
    }

    /// Editable snapshot of the active accounts.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn draft(&self) -> Result<AccountDraft> {
        Ok(AccountDraft {
            accounts: self.active()?,
        })
    }

    /// Applies a draft atomically.
    ///
    /// Every entry is validated first; nothing is applied if any fails.
    /// Then, per entry: new and deleted is skipped, new is inserted,
    /// deleted is soft-deleted, anything else replaces the stored account.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Validation`] for an entry without a name or
    /// [`FinTableError::AccountNotFound`] for an entry whose id is unknown.
    pub fn commit(&self, draft: AccountDraft, now: DateTime<Utc>) -> Result<()> {
        self.with_lock(|inner| {
            for account in &draft.accounts {
                let is_new = account.id.is_unassigned();
                if is_new && account.deleted {
                    continue;
                }
                if !is_new && !inner.index.contains_key(&account.id) {
                    return Err(FinTableError::AccountNotFound(account.id.clone()));
                }
                if !account.deleted {
                    account.validate()?;
                }
            }
            for account in draft.accounts {
                match (account.id.is_unassigned(), account.deleted) {
                    (true, true) => {}
                    (true, false) => {
                        let _stored = inner.insert(account, now);
                    }
                    (false, true) => inner.delete(&account.id, now)?,
                    (false, false) => {
                        let _stored = inner.update(account, now)?;
                    }
                }
            }
            tracing::debug!(accounts = inner.accounts.len(), "committed account draft");
            Ok(())
        })?
    }
}
