//! Pluggable persistence backends.
//!
//! The caches are loaded from a [`Storage`] once at startup and written
//! back in bulk on save. Backends differ in how they apply a bulk write:
//! file backends rewrite everything and therefore must be given the full
//! record set, database backends upsert and can be given only what
//! changed (see [`Storage::rewrites_all`]).

#[cfg(feature = "storage-file")]
mod file;
mod memory;
#[cfg(feature = "storage-sqlite")]
mod sqlite;

use chrono::{DateTime, Utc};

use crate::config::StorageConfig;
use crate::error::Result;
use crate::models::{Account, Category, Cell};

#[cfg(feature = "storage-file")]
pub use file::CsvStorage;
pub use memory::InMemoryStorage;
#[cfg(feature = "storage-sqlite")]
pub use sqlite::SqliteStorage;

/// Blocking persistence sink for cells, categories, accounts and the
/// "last updated" metadata.
///
/// Implementations use interior mutability and are shared by reference.
pub trait Storage: core::fmt::Debug + Send + Sync {
    /// Returns every stored cell.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to read.
    fn cells(&self) -> Result<Vec<Cell>>;

    /// Stores cells. File backends replace their contents with `cells`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to write.
    fn upsert_cells(&self, cells: &[Cell]) -> Result<()>;

    /// Returns every stored category.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to read.
    fn categories(&self) -> Result<Vec<Category>>;

    /// Stores categories. File backends replace their contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to write.
    fn upsert_categories(&self, categories: &[Category]) -> Result<()>;

    /// Returns every stored account.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to read.
    fn accounts(&self) -> Result<Vec<Account>>;

    /// Stores accounts; accounts flagged deleted are physically removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to write.
    fn upsert_accounts(&self, accounts: &[Account]) -> Result<()>;

    /// Time of the last cell edit that was saved, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to read.
    fn last_updated(&self) -> Result<Option<DateTime<Utc>>>;

    /// Stores the time of the last cell edit.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to write.
    fn set_last_updated(&self, at: DateTime<Utc>) -> Result<()>;

    /// The saved "last record" note, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to read.
    fn last_record(&self) -> Result<Option<String>>;

    /// Stores the "last record" note.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to write.
    fn set_last_record(&self, note: &str) -> Result<()>;

    /// `true` if every bulk write replaces the stored set, so callers must
    /// always pass complete data.
    fn rewrites_all(&self) -> bool;
}

impl<S: Storage + ?Sized> Storage for Box<S> {
    #[inline]
    fn cells(&self) -> Result<Vec<Cell>> {
        (**self).cells()
    }

    #[inline]
    fn upsert_cells(&self, cells: &[Cell]) -> Result<()> {
        (**self).upsert_cells(cells)
    }

    #[inline]
    fn categories(&self) -> Result<Vec<Category>> {
        (**self).categories()
    }

    #[inline]
    fn upsert_categories(&self, categories: &[Category]) -> Result<()> {
        (**self).upsert_categories(categories)
    }

    #[inline]
    fn accounts(&self) -> Result<Vec<Account>> {
        (**self).accounts()
    }

    #[inline]
    fn upsert_accounts(&self, accounts: &[Account]) -> Result<()> {
        (**self).upsert_accounts(accounts)
    }

    #[inline]
    fn last_updated(&self) -> Result<Option<DateTime<Utc>>> {
        (**self).last_updated()
    }

    #[inline]
    fn set_last_updated(&self, at: DateTime<Utc>) -> Result<()> {
        (**self).set_last_updated(at)
    }

    #[inline]
    fn last_record(&self) -> Result<Option<String>> {
        (**self).last_record()
    }

    #[inline]
    fn set_last_record(&self, note: &str) -> Result<()> {
        (**self).set_last_record(note)
    }

    #[inline]
    fn rewrites_all(&self) -> bool {
        (**self).rewrites_all()
    }
}

/// Opens the backend selected by configuration.
///
/// # Errors
///
/// Returns an error if the backend cannot be opened, or
/// [`crate::FinTableError::Config`] if its feature is not compiled in.
pub fn open_storage(config: &StorageConfig) -> Result<Box<dyn Storage>> {
    match *config {
        #[cfg(feature = "storage-file")]
        StorageConfig::File { ref dir } => Ok(Box::new(CsvStorage::new(dir.clone())?)),
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { ref path } => Ok(Box::new(SqliteStorage::open(path)?)),
        StorageConfig::Memory => Ok(Box::new(InMemoryStorage::new())),
        #[cfg(not(all(feature = "storage-file", feature = "storage-sqlite")))]
        _ => Err(crate::error::FinTableError::Config(
            "storage backend not compiled in".to_owned(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_memory_storage() {
        let storage = open_storage(&StorageConfig::Memory).unwrap();
        assert!(!storage.rewrites_all());
        assert!(storage.cells().unwrap().is_empty());
    }

    #[cfg(feature = "storage-file")]
    #[test]
    fn open_file_storage_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("data");
        let storage = open_storage(&StorageConfig::File { dir: root.clone() }).unwrap();
        assert!(storage.rewrites_all());
        assert!(root.is_dir());
    }

    #[cfg(feature = "storage-sqlite")]
    #[test]
    fn open_sqlite_storage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fintable.sqlite");
        let storage = open_storage(&StorageConfig::Sqlite { path }).unwrap();
        assert!(!storage.rewrites_all());
        assert!(storage.accounts().unwrap().is_empty());
    }
}
