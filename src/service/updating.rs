//! "Last updated" bookkeeping.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::error::{Result, lock_error};
use crate::storage::Storage;

/// Time of the last grid edit and the free-text "last record" note.
///
/// Both are loaded once and only written back on [`Self::save_all`].
#[derive(Debug, Default)]
pub struct UpdatingService {
    /// Current values.
    inner: Mutex<Inner>,
}

/// Inner mutable state.
#[derive(Debug, Default)]
struct Inner {
    /// Time of the last edit, if any was ever made.
    last_updated: Option<DateTime<Utc>>,
    /// Free-text note, empty when never set.
    last_record: String,
}

impl UpdatingService {
    /// Loads both values from `storage`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub fn load<S: Storage + ?Sized>(storage: &S) -> Result<Self> {
        let inner = Inner {
            last_updated: storage.last_updated()?,
            last_record: storage.last_record()?.unwrap_or_default(),
        };
        Ok(Self {
            inner: Mutex::new(inner),
        })
    }

    /// Acquires the inner lock and applies a closure.
    fn with_lock<R, F>(&self, op: F) -> Result<R>
    where
        F: FnOnce(&mut Inner) -> R,
    {
        let mut inner = self.inner.lock().map_err(|err| lock_error(&err))?;
        Ok(op(&mut inner))
    }

    /// Time of the last edit.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the lock is poisoned.
    #[inline]
    pub fn last_updated(&self) -> Result<Option<DateTime<Utc>>> {
        self.with_lock(|inner| inner.last_updated)
    }

    /// Records an edit at `at`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the lock is poisoned.
    #[inline]
    pub fn set_last_updated(&self, at: DateTime<Utc>) -> Result<()> {
        self.with_lock(|inner| inner.last_updated = Some(at))
    }

    /// The "last record" note.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the lock is poisoned.
    #[inline]
    pub fn last_record(&self) -> Result<String> {
        self.with_lock(|inner| inner.last_record.clone())
    }

    /// Replaces the "last record" note.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the lock is poisoned.
    #[inline]
    pub fn set_last_record(&self, note: &str) -> Result<()> {
        self.with_lock(|inner| note.clone_into(&mut inner.last_record))
    }

    /// Writes both values to `storage`. The timestamp is skipped while no
    /// edit was ever made.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    #[tracing::instrument(skip_all)]
    pub fn save_all<S: Storage + ?Sized>(&self, storage: &S) -> Result<()> {
        let (last_updated, last_record) =
            self.with_lock(|inner| (inner.last_updated, inner.last_record.clone()))?;
        storage.set_last_record(&last_record)?;
        if let Some(at) = last_updated {
            storage.set_last_updated(at)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    #[test]
    fn load_defaults_on_empty_storage() {
        let updating = UpdatingService::load(&InMemoryStorage::new()).unwrap();
        assert!(updating.last_updated().unwrap().is_none());
        assert!(updating.last_record().unwrap().is_empty());
    }

    #[test]
    fn changes_reach_storage_only_on_save() {
        let storage = InMemoryStorage::new();
        let updating = UpdatingService::load(&storage).unwrap();
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        updating.set_last_updated(at).unwrap();
        updating.set_last_record("rent paid").unwrap();
        assert!(storage.last_updated().unwrap().is_none());

        updating.save_all(&storage).unwrap();
        let reloaded = UpdatingService::load(&storage).unwrap();
        assert_eq!(reloaded.last_updated().unwrap(), Some(at));
        assert_eq!(reloaded.last_record().unwrap(), "rent paid");
    }
}
