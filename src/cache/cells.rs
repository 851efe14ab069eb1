//! Cell cache: every grid value keyed by its coordinates.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Result, lock_error};
use crate::models::{Cell, CellId, CellKey, PeriodRange};

/// Thread-safe map from [`CellKey`] to [`Cell`] with per-cell dirty
/// tracking.
#[derive(Debug, Default)]
pub struct CellCache {
    /// Cells keyed by coordinates.
    inner: Mutex<HashMap<CellKey, Cell>>,
}

impl CellCache {
    /// Creates an empty cache.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the inner lock and applies a closure.
    fn with_lock<R, F>(&self, op: F) -> Result<R>
    where
        F: FnOnce(&mut HashMap<CellKey, Cell>) -> R,
    {
        let mut inner = self.inner.lock().map_err(|err| lock_error(&err))?;
        Ok(op(&mut inner))
    }

    /// Replaces the contents with freshly loaded cells, all clean.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the cache lock is poisoned.
    pub fn init(&self, cells: Vec<Cell>) -> Result<()> {
        self.with_lock(|map| {
            map.clear();
            for mut cell in cells {
                cell.dirty = false;
                let _old = map.insert(cell.key(), cell);
            }
        })
    }

    /// Point lookup.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn get(&self, key: &CellKey) -> Result<Option<Cell>> {
        self.with_lock(|map| map.get(key).cloned())
    }

    /// Inserts a new cell or overwrites the value of an existing one.
    ///
    /// A new cell gets a fresh identifier. An existing cell keeps every
    /// field except `value`. Either way the stored cell is marked dirty and
    /// a copy of it is returned.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the cache lock is poisoned.
    pub fn upsert(&self, cell: Cell) -> Result<Cell> {
        self.with_lock(|map| {
            let stored = map
                .entry(cell.key())
                .and_modify(|existing| {
                    existing.value = cell.value;
                    existing.dirty = true;
                })
                .or_insert_with(|| Cell {
                    id: CellId::generate(),
                    dirty: true,
                    ..cell
                });
            stored.clone()
        })
    }

    /// Snapshot of every cell, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn read_all(&self) -> Result<Vec<Cell>> {
        self.with_lock(|map| map.values().cloned().collect())
    }

    /// Snapshot of the cells changed since the last load or save.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn read_dirty(&self) -> Result<Vec<Cell>> {
        self.with_lock(|map| map.values().filter(|cell| cell.dirty).cloned().collect())
    }

    /// Values of every live cell, for the calculation engine.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the cache lock is poisoned.
    pub fn values(&self) -> Result<HashMap<CellKey, i64>> {
        self.with_lock(|map| {
            map.iter()
                .filter(|&(_, cell)| !cell.deleted)
                .map(|(key, cell)| (key.clone(), cell.value))
                .collect()
        })
    }

    /// Clears the dirty flag of cells that still hold the saved value.
    ///
    /// A cell edited again after the snapshot was taken stays dirty.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the cache lock is poisoned.
    pub fn mark_saved(&self, saved: &[Cell]) -> Result<()> {
        self.with_lock(|map| {
            for cell in saved {
                if let Some(stored) = map.get_mut(&cell.key())
                    && stored.id == cell.id
                    && stored.value == cell.value
                {
                    stored.dirty = false;
                }
            }
        })
    }

    /// Moves every cell of a renamed category to keys under the new name.
    ///
    /// Only periods yielded by `periods` are visited; cells outside that
    /// range keep the old name. Relocated cells are marked dirty. A cell
    /// whose new key is already taken stays under the old name. Returns
    /// the number of relocated cells.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the cache lock is poisoned.
    pub fn update_category_name(
        &self,
        main_category: &str,
        old_name: &str,
        new_name: &str,
        periods: PeriodRange,
    ) -> Result<usize> {
        self.with_lock(|map| {
            let mut moved = 0_usize;
            for period in periods {
                let old_key = CellKey::new(main_category, old_name, period);
                let new_key = old_key.with_category(new_name);
                if !map.contains_key(&old_key) {
                    continue;
                }
                if map.contains_key(&new_key) {
                    tracing::warn!(
                        main_category,
                        old_name,
                        new_name,
                        %period,
                        "rename target cell already exists, keeping old cell"
                    );
                    continue;
                }
                let Some(mut cell) = map.remove(&old_key) else {
                    continue;
                };
                new_name.clone_into(&mut cell.category);
                cell.dirty = true;
                let _old = map.insert(new_key, cell);
                moved += 1;
            }
            moved
        })
    }

    /// Number of cached cells.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn len(&self) -> Result<usize> {
        self.with_lock(|map| map.len())
    }
}
