//! Category cache: categories grouped by main category in display order.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::MainCategoryOrder;
use crate::error::{FinTableError, Result, lock_error};
use crate::models::{Category, CategoryId, CategoryKey};

/// Inner mutable state.
#[derive(Debug)]
struct Inner {
    /// Configured main categories and their positions.
    order: MainCategoryOrder,
    /// One priority-sorted group per main category, in configured order.
    groups: Vec<Vec<Category>>,
    /// `(group, slot)` position of every category.
    index: HashMap<CategoryKey, (usize, usize)>,
}

impl Inner {
    /// Rebuilds `index` from `groups`.
    fn reindex(&mut self) {
        self.index.clear();
        for (group_idx, group) in self.groups.iter().enumerate() {
            for (slot, category) in group.iter().enumerate() {
                let _old = self.index.insert(category.key(), (group_idx, slot));
            }
        }
    }

    /// Group position of `main_category`.
    fn group_index(&self, main_category: &str) -> Result<usize> {
        self.order
            .index_of(main_category)
            .filter(|&idx| idx < self.groups.len())
            .ok_or_else(|| FinTableError::MainCategoryNotFound(main_category.to_owned()))
    }

    /// Mutable access to the category at `key`.
    fn slot_mut(&mut self, key: &CategoryKey) -> Option<&mut Category> {
        let &(group_idx, slot) = self.index.get(key)?;
        self.groups.get_mut(group_idx)?.get_mut(slot)
    }
}

/// Thread-safe, priority-ordered category store.
#[derive(Debug)]
pub struct CategoryCache {
    /// All state behind a single mutex.
    inner: Mutex<Inner>,
}

impl CategoryCache {
    /// Creates an empty cache with one group per configured main category.
    #[inline]
    #[must_use]
    pub fn new(order: MainCategoryOrder) -> Self {
        let groups = vec![Vec::new(); order.len()];
        Self {
            inner: Mutex::new(Inner {
                order,
                groups,
                index: HashMap::new(),
            }),
        }
    }

    /// Acquires the inner lock and applies a closure.
    fn with_lock<R, F>(&self, op: F) -> Result<R>
    where
        F: FnOnce(&mut Inner) -> R,
    {
        let mut inner = self.inner.lock().map_err(|err| lock_error(&err))?;
        Ok(op(&mut inner))
    }

    /// Replaces the contents with loaded categories.
    ///
    /// Categories whose main category is not configured are dropped with a
    /// warning. Each group is sorted by stored priority. Returns the number
    /// of dropped categories.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Lock`] if the cache lock is poisoned.
    pub fn init(&self, categories: Vec<Category>) -> Result<usize> {
        self.with_lock(|inner| {
            for group in &mut inner.groups {
                group.clear();
            }
            let mut dropped = 0_usize;
            for category in categories {
                let Some(group) = inner
                    .order
                    .index_of(&category.main_category)
                    .and_then(|idx| inner.groups.get_mut(idx))
                else {
                    tracing::warn!(
                        main_category = %category.main_category,
                        name = %category.name,
                        "dropping category with unconfigured main category"
                    );
                    dropped += 1;
                    continue;
                };
                group.push(category);
            }
            for group in &mut inner.groups {
                group.sort_by_key(|category| category.priority);
            }
            inner.reindex();
            dropped
        })
    }

    /// Adds a category at the end of its group.
    ///
    /// The new category gets a fresh identifier and a priority one above
    /// the highest in its group. Returns the stored copy.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Validation`] for empty names,
    /// [`FinTableError::MainCategoryNotFound`] if the main category is not
    /// configured, or [`FinTableError::DuplicateCategory`] if the name is
    /// taken.
    pub fn insert(&self, category: Category) -> Result<Category> {
        category.validate()?;
        self.with_lock(|inner| {
            let group_idx = inner.group_index(&category.main_category)?;
            let key = category.key();
            if inner.index.contains_key(&key) {
                return Err(FinTableError::DuplicateCategory {
                    main_category: key.main_category,
                    name: key.name,
                });
            }
            let group = inner
                .groups
                .get_mut(group_idx)
                .ok_or_else(|| FinTableError::MainCategoryNotFound(key.main_category.clone()))?;
            let priority = group
                .iter()
                .map(|existing| existing.priority)
                .max()
                .unwrap_or(0)
                + 1;
            let stored = Category {
                id: CategoryId::generate(),
                priority,
                ..category
            };
            let slot = group.len();
            group.push(stored.clone());
            let _old = inner.index.insert(key, (group_idx, slot));
            Ok(stored)
        })?
    }

    /// Returns `true` if a category with this key exists.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn contains(&self, key: &CategoryKey) -> Result<bool> {
        self.with_lock(|inner| inner.index.contains_key(key))
    }

    /// Point lookup by key.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Lock`] if the cache lock is poisoned.
    pub fn get(&self, key: &CategoryKey) -> Result<Option<Category>> {
        self.with_lock(|inner| {
            let &(group_idx, slot) = inner.index.get(key)?;
            inner.groups.get(group_idx)?.get(slot).cloned()
        })
    }

    /// Renames a category in place, keeping its position.
    ///
    /// Cells are not touched; relocating them is the caller's job.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Validation`] for an empty name,
    /// [`FinTableError::CategoryNotFound`] if `old` does not exist, or
    /// [`FinTableError::DuplicateCategory`] if the new name is taken.
    pub fn update_category(&self, old: &CategoryKey, new_name: &str) -> Result<Category> {
        if new_name.is_empty() {
            return Err(FinTableError::Validation("category name is required".to_owned()));
        }
        self.with_lock(|inner| {
            let new_key = CategoryKey::new(old.main_category.as_str(), new_name);
            if new_key != *old && inner.index.contains_key(&new_key) {
                return Err(FinTableError::DuplicateCategory {
                    main_category: new_key.main_category,
                    name: new_key.name,
                });
            }
            let not_found = || FinTableError::CategoryNotFound {
                main_category: old.main_category.clone(),
                name: old.name.clone(),
            };
            let position = inner.index.remove(old).ok_or_else(not_found)?;
            let _old = inner.index.insert(new_key.clone(), position);
            let category = inner.slot_mut(&new_key).ok_or_else(not_found)?;
            new_name.clone_into(&mut category.name);
            Ok(category.clone())
        })?
    }

    /// Snapshot of the groups in configured order, each sorted by priority.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn groups(&self) -> Result<Vec<Vec<Category>>> {
        self.with_lock(|inner| inner.groups.clone())
    }

    /// Keys of every category under `main_category`, in display order.
    /// Empty for unconfigured main categories.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Lock`] if the cache lock is poisoned.
    pub fn keys_of(&self, main_category: &str) -> Result<Vec<CategoryKey>> {
        self.with_lock(|inner| {
            inner
                .order
                .index_of(main_category)
                .and_then(|idx| inner.groups.get(idx))
                .map(|group| group.iter().map(Category::key).collect())
                .unwrap_or_default()
        })
    }

    /// Snapshot of every category, group by group.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn read_all(&self) -> Result<Vec<Category>> {
        self.with_lock(|inner| inner.groups.iter().flatten().cloned().collect())
    }
}
