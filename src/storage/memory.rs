//! In-memory storage backend.
//!
//! Provides [`InMemoryStorage`], a thread-safe volatile implementation of
//! [`super::Storage`]. Useful for tests and for running without any
//! persistence.

use core::hash::Hash;
use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::error::{Result, lock_error};
use crate::models::{Account, AccountId, Category, CategoryId, Cell, CellId};

/// Thread-safe in-memory storage.
///
/// # Upsert semantics
///
/// Upserts merge by id like a database would: existing records with
/// matching ids are replaced, new ones are appended, and accounts flagged
/// deleted are removed.
///
/// # Example
///
/// ```rust
/// use fintable_rs::storage::{InMemoryStorage, Storage};
///
/// let storage = InMemoryStorage::new();
/// assert!(storage.cells().unwrap().is_empty());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    /// All state behind a single mutex for thread-safe interior mutability.
    inner: Mutex<Inner>,
}

/// Inner mutable state.
#[derive(Debug, Default)]
struct Inner {
    /// Stored cells.
    cells: Vec<Cell>,
    /// Stored categories.
    categories: Vec<Category>,
    /// Stored accounts.
    accounts: Vec<Account>,
    /// Time of the last saved edit.
    last_updated: Option<DateTime<Utc>>,
    /// Saved "last record" note.
    last_record: Option<String>,
}

impl InMemoryStorage {
    /// Creates a new empty in-memory storage.
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
}

/// Merges `new_items` into `existing` by key, replacing duplicates and
/// keeping first-seen order.
fn upsert_by_key<T, K>(existing: &mut Vec<T>, new_items: &[T], key_fn: fn(&T) -> K)
where
    T: Clone,
    K: Hash + Eq,
{
    let mut positions: HashMap<K, usize> = existing
        .iter()
        .enumerate()
        .map(|(idx, item)| (key_fn(item), idx))
        .collect();
    for item in new_items {
        let key = key_fn(item);
        if let Some(slot) = positions.get(&key).and_then(|&idx| existing.get_mut(idx)) {
            slot.clone_from(item);
        } else {
            let _old = positions.insert(key, existing.len());
            existing.push(item.clone());
        }
    }
}

/// Extracts the cell id.
fn cell_key(cell: &Cell) -> CellId {
    cell.id.clone()
}

/// Extracts the category id.
fn category_key(category: &Category) -> CategoryId {
    category.id.clone()
}

/// Extracts the account id.
fn account_key(account: &Account) -> AccountId {
    account.id.clone()
}

impl super::Storage for InMemoryStorage {
    #[inline]
    fn cells(&self) -> Result<Vec<Cell>> {
        self.with_lock(|inner| inner.cells.clone())
    }

    #[inline]
    fn upsert_cells(&self, cells: &[Cell]) -> Result<()> {
        self.with_lock(|inner| upsert_by_key(&mut inner.cells, cells, cell_key))
    }

    #[inline]
    fn categories(&self) -> Result<Vec<Category>> {
        self.with_lock(|inner| inner.categories.clone())
    }

    #[inline]
    fn upsert_categories(&self, categories: &[Category]) -> Result<()> {
        self.with_lock(|inner| upsert_by_key(&mut inner.categories, categories, category_key))
    }

    #[inline]
    fn accounts(&self) -> Result<Vec<Account>> {
        self.with_lock(|inner| inner.accounts.clone())
    }

    #[inline]
    fn upsert_accounts(&self, accounts: &[Account]) -> Result<()> {
        self.with_lock(|inner| {
            upsert_by_key(&mut inner.accounts, accounts, account_key);
            inner.accounts.retain(|account| !account.deleted);
        })
    }

    #[inline]
    fn last_updated(&self) -> Result<Option<DateTime<Utc>>> {
        self.with_lock(|inner| inner.last_updated)
    }

    #[inline]
    fn set_last_updated(&self, at: DateTime<Utc>) -> Result<()> {
        self.with_lock(|inner| inner.last_updated = Some(at))
    }

    #[inline]
    fn last_record(&self) -> Result<Option<String>> {
        self.with_lock(|inner| inner.last_record.clone())
    }

    #[inline]
    fn set_last_record(&self, note: &str) -> Result<()> {
        self.with_lock(|inner| inner.last_record = Some(note.to_owned()))
    }

    #[inline]
    fn rewrites_all(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Period;
    use crate::storage::Storage;

    /// Constant timestamp for test helpers.
    const TEST_TIMESTAMP_SECS: i64 = 1_700_000_000;

    fn test_cell(id: &str, value: i64) -> Cell {
        Cell {
            id: CellId::from(id),
            ..Cell::new("Expenses", "Food", Period::january(2023), value)
        }
    }

    fn test_account(id: &str, name: &str, deleted: bool) -> Account {
        Account {
            id: AccountId::from(id),
            deleted,
            ..Account::new(name, 10)
        }
    }

    #[test]
    fn empty_storage() {
        let storage = InMemoryStorage::new();
        assert!(storage.cells().unwrap().is_empty());
        assert!(storage.categories().unwrap().is_empty());
        assert!(storage.accounts().unwrap().is_empty());
        assert!(storage.last_updated().unwrap().is_none());
        assert!(storage.last_record().unwrap().is_none());
    }

    #[test]
    fn upsert_replaces_by_id_and_appends_new() {
        let storage = InMemoryStorage::new();
        storage
            .upsert_cells(&[test_cell("c-1", 10), test_cell("c-2", 20)])
            .unwrap();
        storage
            .upsert_cells(&[test_cell("c-2", 25), test_cell("c-3", 30)])
            .unwrap();
        let values: Vec<i64> = storage
            .cells()
            .unwrap()
            .iter()
            .map(|cell| cell.value)
            .collect();
        assert_eq!(values, vec![10, 25, 30]);
    }

    #[test]
    fn deleted_accounts_are_removed() {
        let storage = InMemoryStorage::new();
        storage
            .upsert_accounts(&[test_account("a-1", "Card", false), test_account("a-2", "Cash", false)])
            .unwrap();
        storage
            .upsert_accounts(&[test_account("a-1", "Card", true)])
            .unwrap();
        let accounts = storage.accounts().unwrap();
        assert_eq!(accounts.len(), 1);
        assert!(accounts.iter().all(|account| account.name == "Cash"));
    }

    #[test]
    fn metadata_round_trip() {
        let storage = InMemoryStorage::new();
        let at = DateTime::from_timestamp(TEST_TIMESTAMP_SECS, 0).unwrap();
        storage.set_last_updated(at).unwrap();
        storage.set_last_record("paid rent").unwrap();
        assert_eq!(storage.last_updated().unwrap(), Some(at));
        assert_eq!(storage.last_record().unwrap().as_deref(), Some("paid rent"));
    }

    #[test]
    fn concurrent_upserts() {
        use alloc::sync::Arc;

        let storage = Arc::new(InMemoryStorage::new());
        let handles: Vec<_> = (0..4_i64)
            .map(|worker| {
                let storage = Arc::clone(&storage);
                std::thread::spawn(move || {
                    storage
                        .upsert_cells(&[test_cell(&format!("c-{worker}"), worker)])
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(storage.cells().unwrap().len(), 4);
    }
}
