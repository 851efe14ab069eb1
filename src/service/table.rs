//! Grid cell service.

use alloc::sync::Arc;

use crate::cache::CellCache;
use crate::config::Clock;
use crate::error::Result;
use crate::models::{Cell, CellKey, Period};
use crate::storage::Storage;

/// Reads and writes grid values and saves them.
#[derive(Debug, Clone)]
pub struct TableService {
    /// Backing cache.
    cells: Arc<CellCache>,
    /// First period of the balance chain; lower bound of renames.
    start: Period,
    /// Upper bound of renames.
    clock: Arc<dyn Clock>,
}

impl TableService {
    /// Creates a service over `cells`.
    #[inline]
    #[must_use]
    pub fn new(cells: Arc<CellCache>, start: Period, clock: Arc<dyn Clock>) -> Self {
        Self { cells, start, clock }
    }

    /// Validates and stores a value. Returns the stored cell.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Validation`] for a cell without
    /// category coordinates, or [`crate::FinTableError::Lock`].
    #[inline]
    pub fn upsert(&self, cell: Cell) -> Result<Cell> {
        cell.validate()?;
        self.cells.upsert(cell)
    }

    /// Point lookup; `None` when no value was ever entered.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn get(&self, key: &CellKey) -> Result<Option<Cell>> {
        self.cells.get(key)
    }

    /// Moves the cells of a renamed category between the start period and
    /// the current month. Returns the number of moved cells.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn update_category_name(
        &self,
        main_category: &str,
        old_name: &str,
        new_name: &str,
    ) -> Result<usize> {
        let periods = Period::range(self.start, self.clock.today());
        self.cells
            .update_category_name(main_category, old_name, new_name, periods)
    }

    /// Saves cells: every cell for backends that rewrite everything, only
    /// dirty cells otherwise. Saved cells are marked clean. Returns the
    /// number of cells written.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails; dirty flags are left
    /// untouched in that case.
    #[tracing::instrument(skip_all)]
    pub fn save_all<S: Storage + ?Sized>(&self, storage: &S) -> Result<usize> {
        let cells = if storage.rewrites_all() {
            self.cells.read_all()?
        } else {
            self.cells.read_dirty()?
        };
        if cells.is_empty() && !storage.rewrites_all() {
            return Ok(0);
        }
        storage.upsert_cells(&cells)?;
        self.cells.mark_saved(&cells)?;
        tracing::debug!(count = cells.len(), "saved cells");
        Ok(cells.len())
    }
}
