//! CSV-file-based storage backend.
//!
//! Stores cells, categories and accounts as headerless CSV files under a
//! directory, plus a small JSON metadata file.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{FinTableError, Result, lock_error, storage_io_error};
use crate::models::{Account, AccountId, Category, CategoryId, Cell, CellId, Period};

/// File name for cells.
const CELLS_FILE: &str = "cells.csv";
/// File name for categories.
const CATEGORIES_FILE: &str = "categories.csv";
/// File name for accounts.
const ACCOUNTS_FILE: &str = "accounts.csv";
/// File name for metadata.
const META_FILE: &str = "meta.json";
/// Sentinel file used for cross-process file locking.
const LOCK_FILE: &str = "storage.lock";

/// Metadata stored alongside the CSV files.
#[derive(Debug, Serialize, Deserialize, Default)]
struct Meta {
    /// Time of the last saved edit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_updated: Option<DateTime<Utc>>,
    /// "Last record" note.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_record: Option<String>,
}

/// `cells.csv` record: id, main category, category, value, month, year.
#[derive(Debug, Serialize, Deserialize)]
struct CellRow {
    /// Cell id.
    id: String,
    /// Main category name.
    main_category: String,
    /// Category name.
    category: String,
    /// Amount.
    value: i64,
    /// Month number.
    month: u32,
    /// Year.
    year: i32,
}

impl From<&Cell> for CellRow {
    fn from(cell: &Cell) -> Self {
        Self {
            id: cell.id.as_inner().to_owned(),
            main_category: cell.main_category.clone(),
            category: cell.category.clone(),
            value: cell.value,
            month: cell.period.month(),
            year: cell.period.year(),
        }
    }
}

impl TryFrom<CellRow> for Cell {
    type Error = FinTableError;

    fn try_from(row: CellRow) -> Result<Self> {
        Ok(Self {
            id: CellId::new(row.id),
            ..Self::new(row.main_category, row.category, Period::new(row.year, row.month)?, row.value)
        })
    }
}

/// `categories.csv` record: id, name, main category, priority.
#[derive(Debug, Serialize, Deserialize)]
struct CategoryRow {
    /// Category id.
    id: String,
    /// Display name.
    name: String,
    /// Main category name.
    main_category: String,
    /// Display priority.
    priority: u32,
}

impl From<&Category> for CategoryRow {
    fn from(category: &Category) -> Self {
        Self {
            id: category.id.as_inner().to_owned(),
            name: category.name.clone(),
            main_category: category.main_category.clone(),
            priority: category.priority,
        }
    }
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: CategoryId::new(row.id),
            name: row.name,
            main_category: row.main_category,
            priority: row.priority,
        }
    }
}

/// `accounts.csv` record: id, name, sum, note, in-sum flag, RFC 3339
/// update time.
#[derive(Debug, Serialize, Deserialize)]
struct AccountRow {
    /// Account id.
    id: String,
    /// Display name.
    name: String,
    /// Amount.
    sum: i64,
    /// Free-text note.
    note: String,
    /// Counted in the aggregate sum.
    in_sum: bool,
    /// Last modification time, RFC 3339.
    updated_at: String,
}

impl From<&Account> for AccountRow {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.as_inner().to_owned(),
            name: account.name.clone(),
            sum: account.sum,
            note: account.note.clone(),
            in_sum: account.in_sum,
            updated_at: account.updated_at.to_rfc3339(),
        }
    }
}

impl TryFrom<AccountRow> for Account {
    type Error = FinTableError;

    fn try_from(row: AccountRow) -> Result<Self> {
        let updated_at = DateTime::parse_from_rfc3339(&row.updated_at)
            .map_err(|err| FinTableError::Storage(Box::new(err)))?
            .with_timezone(&Utc);
        Ok(Self {
            id: AccountId::new(row.id),
            name: row.name,
            sum: row.sum,
            note: row.note,
            in_sum: row.in_sum,
            updated_at,
            deleted: false,
        })
    }
}

/// File-backed storage that persists records as CSV files.
///
/// Every bulk write replaces the whole file, so callers pass the complete
/// record set ([`super::Storage::rewrites_all`] is `true`). Accounts
/// flagged deleted are left out of the rewrite.
///
/// # Concurrency
///
/// Thread safety within a single process is provided by an in-process
/// [`Mutex`]. Cross-process safety is achieved via an advisory file lock
/// on `storage.lock` (using [`std::fs::File::lock`] /
/// [`std::fs::File::lock_shared`]).
///
/// # File layout
///
/// ```text
/// <dir>/
///   storage.lock          (cross-process lock sentinel)
///   meta.json
///   cells.csv
///   categories.csv
///   accounts.csv
/// ```
#[derive(Debug)]
pub struct CsvStorage {
    /// Root directory containing all files.
    dir: PathBuf,
    /// Mutex serializing concurrent in-process access.
    lock: Mutex<()>,
    /// Sentinel file for cross-process advisory locking.
    lock_file: fs::File,
}

impl CsvStorage {
    /// Creates a new file storage rooted at the given directory.
    ///
    /// Creates the directory (and parents) if it does not exist, and opens
    /// (or creates) the `storage.lock` sentinel file.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or the lock
    /// file cannot be opened.
    #[inline]
    pub fn new(dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&dir).map_err(storage_io_error)?;
        let lock_file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))
            .map_err(storage_io_error)?;
        Ok(Self {
            dir,
            lock: Mutex::new(()),
            lock_file,
        })
    }

    // ── Private helpers ─────────────────────────────────────────────

    /// Returns the full path for a given file name.
    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Acquires an in-process mutex guard and a shared (read) file lock,
    /// executes `op`, then releases the file lock.
    fn with_shared_lock<R, F: FnOnce() -> Result<R>>(&self, op: F) -> Result<R> {
        let _guard: MutexGuard<'_, ()> = self.lock.lock().map_err(|err| lock_error(&err))?;
        self.lock_file.lock_shared().map_err(storage_io_error)?;
        let result = op();
        // Only surface the unlock error when the operation succeeded.
        if let Err(err) = self.lock_file.unlock()
            && result.is_ok()
        {
            return Err(storage_io_error(err));
        }
        result
    }

    /// Acquires an in-process mutex guard and an exclusive (write) file
    /// lock, executes `op`, then releases the file lock.
    fn with_exclusive_lock<R, F: FnOnce() -> Result<R>>(&self, op: F) -> Result<R> {
        let _guard: MutexGuard<'_, ()> = self.lock.lock().map_err(|err| lock_error(&err))?;
        self.lock_file.lock().map_err(storage_io_error)?;
        let result = op();
        if let Err(err) = self.lock_file.unlock()
            && result.is_ok()
        {
            return Err(storage_io_error(err));
        }
        result
    }

    /// Reads every record of a CSV file. Returns an empty `Vec` if the
    /// file does not exist.
    fn read_rows<T: DeserializeOwned>(&self, name: &str) -> Result<Vec<T>> {
        let bytes = match fs::read(self.path(name)) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(storage_io_error(err)),
        };
        csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(bytes.as_slice())
            .deserialize()
            .map(|row| row.map_err(csv_error))
            .collect()
    }

    /// Atomically rewrites a CSV file (write-to-tmp then rename).
    fn write_rows<T: Serialize>(&self, name: &str, rows: &[T]) -> Result<()> {
        let path = self.path(name);
        let tmp_path = self.path(&format!("{name}.tmp"));
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&tmp_path)
            .map_err(csv_error)?;
        for row in rows {
            writer.serialize(row).map_err(csv_error)?;
        }
        writer.flush().map_err(storage_io_error)?;
        drop(writer);
        fs::rename(&tmp_path, &path).map_err(storage_io_error)?;
        Ok(())
    }

    /// Reads the metadata file.
    fn read_meta(&self) -> Result<Meta> {
        match fs::read_to_string(self.path(META_FILE)) {
            Ok(contents) => serde_json::from_str(&contents).map_err(FinTableError::from),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Meta::default()),
            Err(err) => Err(storage_io_error(err)),
        }
    }

    /// Atomically writes the metadata file.
    fn write_meta(&self, meta: &Meta) -> Result<()> {
        let path = self.path(META_FILE);
        let tmp_path = self.path(&format!("{META_FILE}.tmp"));
        let json = serde_json::to_string_pretty(meta)?;
        fs::write(&tmp_path, json).map_err(storage_io_error)?;
        fs::rename(&tmp_path, &path).map_err(storage_io_error)?;
        Ok(())
    }

    /// Reads, edits and writes back the metadata under the exclusive lock.
    fn update_meta<F: FnOnce(&mut Meta)>(&self, edit: F) -> Result<()> {
        self.with_exclusive_lock(|| {
            let mut meta = self.read_meta()?;
            edit(&mut meta);
            self.write_meta(&meta)
        })
    }
}

// ── Free-standing helpers ───────────────────────────────────────────────

/// Wraps a CSV error into a [`FinTableError::Storage`].
fn csv_error(err: csv::Error) -> FinTableError {
    FinTableError::Storage(Box::new(err))
}

impl super::Storage for CsvStorage {
    fn cells(&self) -> Result<Vec<Cell>> {
        self.with_shared_lock(|| {
            self.read_rows::<CellRow>(CELLS_FILE)?
                .into_iter()
                .map(Cell::try_from)
                .collect()
        })
    }

    fn upsert_cells(&self, cells: &[Cell]) -> Result<()> {
        let rows: Vec<CellRow> = cells.iter().map(CellRow::from).collect();
        self.with_exclusive_lock(|| self.write_rows(CELLS_FILE, &rows))?;
        tracing::debug!(count = rows.len(), "rewrote cells file");
        Ok(())
    }

    fn categories(&self) -> Result<Vec<Category>> {
        self.with_shared_lock(|| {
            Ok(self
                .read_rows::<CategoryRow>(CATEGORIES_FILE)?
                .into_iter()
                .map(Category::from)
                .collect())
        })
    }

    fn upsert_categories(&self, categories: &[Category]) -> Result<()> {
        let rows: Vec<CategoryRow> = categories.iter().map(CategoryRow::from).collect();
        self.with_exclusive_lock(|| self.write_rows(CATEGORIES_FILE, &rows))
    }

    fn accounts(&self) -> Result<Vec<Account>> {
        self.with_shared_lock(|| {
            self.read_rows::<AccountRow>(ACCOUNTS_FILE)?
                .into_iter()
                .map(Account::try_from)
                .collect()
        })
    }

    fn upsert_accounts(&self, accounts: &[Account]) -> Result<()> {
        let rows: Vec<AccountRow> = accounts
            .iter()
            .filter(|account| !account.deleted)
            .map(AccountRow::from)
            .collect();
        self.with_exclusive_lock(|| self.write_rows(ACCOUNTS_FILE, &rows))
    }

    fn last_updated(&self) -> Result<Option<DateTime<Utc>>> {
        self.with_shared_lock(|| Ok(self.read_meta()?.last_updated))
    }

    fn set_last_updated(&self, at: DateTime<Utc>) -> Result<()> {
        self.update_meta(|meta| meta.last_updated = Some(at))
    }

    fn last_record(&self) -> Result<Option<String>> {
        self.with_shared_lock(|| Ok(self.read_meta()?.last_record))
    }

    fn set_last_record(&self, note: &str) -> Result<()> {
        self.update_meta(|meta| meta.last_record = Some(note.to_owned()))
    }

    #[inline]
    fn rewrites_all(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    fn temp_storage() -> (tempfile::TempDir, CsvStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = CsvStorage::new(dir.path().to_path_buf()).unwrap();
        (dir, storage)
    }

    fn test_cell(id: &str, category: &str, month: u32, value: i64) -> Cell {
        Cell {
            id: CellId::from(id),
            ..Cell::new("Expenses", category, Period::new(2023, month).unwrap(), value)
        }
    }

    fn test_account(id: &str, name: &str) -> Account {
        Account {
            id: AccountId::from(id),
            note: "main card".to_owned(),
            updated_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            ..Account::new(name, 1_500)
        }
    }

    #[test]
    fn new_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let _storage = CsvStorage::new(nested.clone()).unwrap();
        assert!(nested.join(LOCK_FILE).exists());
    }

    #[test]
    fn missing_files_read_as_empty() {
        let (_dir, storage) = temp_storage();
        assert!(storage.cells().unwrap().is_empty());
        assert!(storage.categories().unwrap().is_empty());
        assert!(storage.accounts().unwrap().is_empty());
        assert!(storage.last_updated().unwrap().is_none());
        assert!(storage.last_record().unwrap().is_none());
    }

    #[test]
    fn cells_use_fixed_headerless_field_order() {
        let (dir, storage) = temp_storage();
        storage
            .upsert_cells(&[test_cell("c-1", "Food", 1, 200)])
            .unwrap();
        let contents = fs::read_to_string(dir.path().join(CELLS_FILE)).unwrap();
        assert_eq!(contents.lines().collect::<Vec<_>>(), vec!["c-1,Expenses,Food,200,1,2023"]);
        assert!(!dir.path().join("cells.csv.tmp").exists());
    }

    #[test]
    fn categories_use_fixed_field_order() {
        let (dir, storage) = temp_storage();
        let category = Category {
            id: CategoryId::from("k-1"),
            priority: 3,
            ..Category::new("Income", "Salary")
        };
        storage.upsert_categories(&[category.clone()]).unwrap();
        let contents = fs::read_to_string(dir.path().join(CATEGORIES_FILE)).unwrap();
        assert_eq!(contents.lines().collect::<Vec<_>>(), vec!["k-1,Salary,Income,3"]);
        assert_eq!(storage.categories().unwrap(), vec![category]);
    }

    #[test]
    fn upsert_cells_rewrites_whole_file() {
        let (_dir, storage) = temp_storage();
        storage
            .upsert_cells(&[test_cell("c-1", "Food", 1, 200), test_cell("c-2", "Rent", 1, 700)])
            .unwrap();
        storage
            .upsert_cells(&[test_cell("c-2", "Rent", 1, 650)])
            .unwrap();
        let cells = storage.cells().unwrap();
        assert_eq!(cells, vec![test_cell("c-2", "Rent", 1, 650)]);
        assert!(storage.rewrites_all());
    }

    #[test]
    fn cells_with_delimiters_round_trip() {
        let (_dir, storage) = temp_storage();
        let cell = test_cell("c-1", "Food, drinks \"and\" more", 4, 12);
        storage.upsert_cells(&[cell.clone()]).unwrap();
        assert_eq!(storage.cells().unwrap(), vec![cell]);
    }

    #[test]
    fn accounts_round_trip_and_skip_deleted() {
        let (dir, storage) = temp_storage();
        let card = test_account("a-1", "Card");
        let closed = Account {
            deleted: true,
            ..test_account("a-2", "Closed")
        };
        storage.upsert_accounts(&[card.clone(), closed]).unwrap();
        assert_eq!(storage.accounts().unwrap(), vec![card]);
        let contents = fs::read_to_string(dir.path().join(ACCOUNTS_FILE)).unwrap();
        assert_eq!(
            contents.lines().collect::<Vec<_>>(),
            vec!["a-1,Card,1500,main card,true,2023-11-14T22:13:20+00:00"]
        );
    }

    #[test]
    fn invalid_month_is_reported() {
        let (dir, storage) = temp_storage();
        fs::write(dir.path().join(CELLS_FILE), "c-1,Expenses,Food,1,13,2023\n").unwrap();
        assert!(matches!(
            storage.cells(),
            Err(FinTableError::Validation(_))
        ));
    }

    #[test]
    fn malformed_row_is_storage_error() {
        let (dir, storage) = temp_storage();
        fs::write(dir.path().join(CELLS_FILE), "c-1,Expenses,Food,lots,1,2023\n").unwrap();
        assert!(matches!(storage.cells(), Err(FinTableError::Storage(_))));
    }

    #[test]
    fn metadata_round_trip_keeps_both_fields() {
        let (_dir, storage) = temp_storage();
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        storage.set_last_updated(at).unwrap();
        storage.set_last_record("groceries").unwrap();
        assert_eq!(storage.last_updated().unwrap(), Some(at));
        assert_eq!(storage.last_record().unwrap().as_deref(), Some("groceries"));
    }

    #[test]
    fn data_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let storage = CsvStorage::new(dir.path().to_path_buf()).unwrap();
            storage
                .upsert_cells(&[test_cell("c-1", "Food", 2, 42)])
                .unwrap();
        }
        let storage = CsvStorage::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(storage.cells().unwrap(), vec![test_cell("c-1", "Food", 2, 42)]);
    }
}
