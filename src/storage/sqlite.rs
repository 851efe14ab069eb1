//! SQLite storage backend.
//!
//! Schema changes are applied by numbered migrations on open. Bulk writes
//! run in a single transaction and upsert by id, so callers may pass only
//! the records that changed.

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension as _, Transaction, params};

use crate::error::{FinTableError, Result, lock_error, storage_io_error};
use crate::models::{Account, AccountId, Category, CategoryId, Cell, CellId, Period};

/// Row id of the "last updated" time in `last_updated_data`.
const LAST_UPDATED_TIME_ID: &str = "last_updated_time_id";
/// Row id of the "last record" note in `last_updated_data`.
const LAST_UPDATED_RECORD_ID: &str = "last_updated_record_id";

/// A schema migration.
struct Migration {
    /// The version this migration brings the database to.
    version: i32,
    /// SQL to execute when upgrading to this version.
    up_sql: &'static str,
}

/// All available migrations in order.
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    up_sql: include_str!("sqlite/migration_01_up.sql"),
}];

/// Storage backed by a single SQLite database file.
#[derive(Debug)]
pub struct SqliteStorage {
    /// The connection, serialized behind a mutex.
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Opens (or creates) the database at `path` and migrates it to the
    /// latest schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created, the
    /// database cannot be opened, or a migration fails.
    #[inline]
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(storage_io_error)?;
        }
        let conn = Connection::open(path).map_err(sqlite_error)?;
        Self::with_connection(conn)
    }

    /// Opens a private in-memory database with the latest schema.
    ///
    /// # Errors
    ///
    /// Returns an error if a migration fails.
    #[inline]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(sqlite_error)?;
        Self::with_connection(conn)
    }

    /// Migrates `conn` and wraps it.
    fn with_connection(mut conn: Connection) -> Result<Self> {
        migrate(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquires the connection lock and applies a closure.
    fn with_conn<R, F>(&self, op: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R>,
    {
        let mut conn = self.conn.lock().map_err(|err| lock_error(&err))?;
        op(&mut conn)
    }

    /// Runs `op` inside one transaction. Commits on success and rolls back
    /// on failure; a failed rollback is reported together with the
    /// original error.
    fn in_transaction<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&Transaction<'_>) -> rusqlite::Result<()>,
    {
        self.with_conn(|conn| {
            let tx = conn.transaction().map_err(sqlite_error)?;
            match op(&tx) {
                Ok(()) => tx.commit().map_err(sqlite_error),
                Err(err) => match tx.rollback() {
                    Ok(()) => Err(sqlite_error(err)),
                    Err(rollback) => Err(FinTableError::Rollback {
                        source: Box::new(err),
                        rollback: Box::new(rollback),
                    }),
                },
            }
        })
    }

    /// Reads a single column of `last_updated_data`.
    fn read_meta(&self, sql: &str, id: &str) -> Result<Option<String>> {
        self.with_conn(|conn| {
            let value = conn
                .query_row(sql, params![id], |row| row.get::<_, Option<String>>(0))
                .optional()
                .map_err(sqlite_error)?;
            Ok(value.flatten())
        })
    }
}

/// Wraps a rusqlite error into a [`FinTableError::Storage`].
fn sqlite_error(err: rusqlite::Error) -> FinTableError {
    FinTableError::Storage(Box::new(err))
}

/// Parses an RFC 3339 timestamp column.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|err| FinTableError::Storage(Box::new(err)))
}

/// Brings the schema up to the latest migration.
fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")
        .map_err(sqlite_error)?;
    let current: i32 = conn
        .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
            row.get(0)
        })
        .map_err(sqlite_error)?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current) {
        tracing::debug!(version = migration.version, "running sqlite migration");
        let tx = conn.transaction().map_err(sqlite_error)?;
        tx.execute_batch(migration.up_sql).map_err(sqlite_error)?;
        let _cleared = tx
            .execute("DELETE FROM schema_version", [])
            .map_err(sqlite_error)?;
        let _inserted = tx
            .execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![migration.version],
            )
            .map_err(sqlite_error)?;
        tx.commit().map_err(sqlite_error)?;
    }
    Ok(())
}

impl super::Storage for SqliteStorage {
    fn cells(&self) -> Result<Vec<Cell>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, main_category, category, value, month, year FROM cells")
                .map_err(sqlite_error)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, u32>(4)?,
                        row.get::<_, i32>(5)?,
                    ))
                })
                .map_err(sqlite_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sqlite_error)?;
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(id, main_category, category, value, month, year)| {
                Ok(Cell {
                    id: CellId::new(id),
                    ..Cell::new(main_category, category, Period::new(year, month)?, value)
                })
            })
            .collect()
    }

    fn upsert_cells(&self, cells: &[Cell]) -> Result<()> {
        self.in_transaction(|tx| {
            let mut stmt = tx.prepare(
                "INSERT INTO cells (id, main_category, category, value, month, year)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    main_category = excluded.main_category,
                    category = excluded.category,
                    value = excluded.value,
                    month = excluded.month,
                    year = excluded.year",
            )?;
            for cell in cells {
                let _changed = stmt.execute(params![
                    cell.id.as_inner(),
                    cell.main_category,
                    cell.category,
                    cell.value,
                    cell.period.month(),
                    cell.period.year(),
                ])?;
            }
            Ok(())
        })?;
        tracing::debug!(count = cells.len(), "upserted cells");
        Ok(())
    }

    fn categories(&self) -> Result<Vec<Category>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, name, main_category, priority FROM categories")
                .map_err(sqlite_error)?;
            let categories = stmt
                .query_map([], |row| {
                    Ok(Category {
                        id: CategoryId::new(row.get::<_, String>(0)?),
                        name: row.get(1)?,
                        main_category: row.get(2)?,
                        priority: row.get(3)?,
                    })
                })
                .map_err(sqlite_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sqlite_error)?;
            Ok(categories)
        })
    }

    fn upsert_categories(&self, categories: &[Category]) -> Result<()> {
        self.in_transaction(|tx| {
            let mut stmt = tx.prepare(
                "INSERT INTO categories (id, name, main_category, priority)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    main_category = excluded.main_category,
                    priority = excluded.priority",
            )?;
            for category in categories {
                let _changed = stmt.execute(params![
                    category.id.as_inner(),
                    category.name,
                    category.main_category,
                    category.priority,
                ])?;
            }
            Ok(())
        })
    }

    fn accounts(&self) -> Result<Vec<Account>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT id, name, sum, note, is_in_sum, updated_at FROM accounts")
                .map_err(sqlite_error)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, bool>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                })
                .map_err(sqlite_error)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(sqlite_error)?;
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(id, name, sum, note, in_sum, updated_at)| {
                Ok(Account {
                    id: AccountId::new(id),
                    name,
                    sum,
                    note,
                    in_sum,
                    updated_at: parse_timestamp(&updated_at)?,
                    deleted: false,
                })
            })
            .collect()
    }

    fn upsert_accounts(&self, accounts: &[Account]) -> Result<()> {
        self.in_transaction(|tx| {
            let mut upsert = tx.prepare(
                "INSERT INTO accounts (id, name, sum, note, is_in_sum, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    sum = excluded.sum,
                    note = excluded.note,
                    is_in_sum = excluded.is_in_sum,
                    updated_at = excluded.updated_at",
            )?;
            let mut delete = tx.prepare("DELETE FROM accounts WHERE id = ?1")?;
            for account in accounts {
                let _changed = if account.deleted {
                    delete.execute(params![account.id.as_inner()])?
                } else {
                    upsert.execute(params![
                        account.id.as_inner(),
                        account.name,
                        account.sum,
                        account.note,
                        account.in_sum,
                        account.updated_at.to_rfc3339(),
                    ])?
                };
            }
            Ok(())
        })
    }

    fn last_updated(&self) -> Result<Option<DateTime<Utc>>> {
        self.read_meta(
            "SELECT updated_at FROM last_updated_data WHERE id = ?1",
            LAST_UPDATED_TIME_ID,
        )?
        .as_deref()
        .map(parse_timestamp)
        .transpose()
    }

    fn set_last_updated(&self, at: DateTime<Utc>) -> Result<()> {
        self.with_conn(|conn| {
            let _changed = conn
                .execute(
                    "INSERT INTO last_updated_data (id, updated_at) VALUES (?1, ?2)
                     ON CONFLICT(id) DO UPDATE SET updated_at = excluded.updated_at",
                    params![LAST_UPDATED_TIME_ID, at.to_rfc3339()],
                )
                .map_err(sqlite_error)?;
            Ok(())
        })
    }

    fn last_record(&self) -> Result<Option<String>> {
        self.read_meta(
            "SELECT note FROM last_updated_data WHERE id = ?1",
            LAST_UPDATED_RECORD_ID,
        )
    }

    fn set_last_record(&self, note: &str) -> Result<()> {
        self.with_conn(|conn| {
            let _changed = conn
                .execute(
                    "INSERT INTO last_updated_data (id, note) VALUES (?1, ?2)
                     ON CONFLICT(id) DO UPDATE SET note = excluded.note",
                    params![LAST_UPDATED_RECORD_ID, note],
                )
                .map_err(sqlite_error)?;
            Ok(())
        })
    }

    #[inline]
    fn rewrites_all(&self) -> bool {
        false
    }
}
