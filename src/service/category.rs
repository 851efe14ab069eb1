//! Category service.

use alloc::sync::Arc;

use crate::cache::CategoryCache;
use crate::error::Result;
use crate::models::{Category, CategoryKey};
use crate::storage::Storage;

/// Adds, renames and saves categories.
#[derive(Debug, Clone)]
pub struct CategoryService {
    /// Backing cache.
    categories: Arc<CategoryCache>,
}

impl CategoryService {
    /// Creates a service over `categories`.
    #[inline]
    #[must_use]
    pub const fn new(categories: Arc<CategoryCache>) -> Self {
        Self { categories }
    }

    /// Appends a new category at the end of its main category.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Validation`],
    /// [`crate::FinTableError::MainCategoryNotFound`] or
    /// [`crate::FinTableError::DuplicateCategory`].
    #[tracing::instrument(skip(self))]
    pub fn add(&self, main_category: &str, name: &str) -> Result<Category> {
        self.categories.insert(Category::new(main_category, name))
    }

    /// Returns `true` if the category exists.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn exists(&self, key: &CategoryKey) -> Result<bool> {
        self.categories.contains(key)
    }

    /// Renames a category. Cells are relocated separately.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::CategoryNotFound`] or
    /// [`crate::FinTableError::DuplicateCategory`].
    #[inline]
    pub fn rename(&self, old: &CategoryKey, new_name: &str) -> Result<Category> {
        self.categories.update_category(old, new_name)
    }

    /// Categories grouped by main category in configured order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn groups(&self) -> Result<Vec<Vec<Category>>> {
        self.categories.groups()
    }

    /// Writes every category to `storage`. Returns the number written.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    #[tracing::instrument(skip_all)]
    pub fn save_all<S: Storage + ?Sized>(&self, storage: &S) -> Result<usize> {
        let categories = self.categories.read_all()?;
        storage.upsert_categories(&categories)?;
        tracing::debug!(count = categories.len(), "saved categories");
        Ok(categories.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FinTableError;
    use crate::config::MainCategoryOrder;
    use crate::storage::InMemoryStorage;

    fn service() -> CategoryService {
        let order = MainCategoryOrder::new([("Expenses", 0), ("Income", 1)]);
        CategoryService::new(Arc::new(CategoryCache::new(order)))
    }

    #[test]
    fn add_then_exists() {
        let categories = service();
        let food = categories.add("Expenses", "Food").unwrap();
        assert_eq!(food.priority, 1);
        assert!(categories.exists(&CategoryKey::new("Expenses", "Food")).unwrap());
        assert!(!categories.exists(&CategoryKey::new("Income", "Food")).unwrap());
    }

    #[test]
    fn add_rejects_unknown_main_category() {
        let categories = service();
        assert!(matches!(
            categories.add("Savings", "Bonds"),
            Err(FinTableError::MainCategoryNotFound(_))
        ));
    }

    #[test]
    fn rename_keeps_position() {
        let categories = service();
        let _food = categories.add("Expenses", "Food").unwrap();
        let _rent = categories.add("Expenses", "Rent").unwrap();
        let renamed = categories
            .rename(&CategoryKey::new("Expenses", "Food"), "Groceries")
            .unwrap();
        assert_eq!(renamed.priority, 1);
        let names: Vec<String> = categories.groups().unwrap()[0]
            .iter()
            .map(|category| category.name.clone())
            .collect();
        assert_eq!(names, vec!["Groceries", "Rent"]);
    }

    #[test]
    fn save_all_writes_every_category() {
        let categories = service();
        let _food = categories.add("Expenses", "Food").unwrap();
        let _salary = categories.add("Income", "Salary").unwrap();
        let storage = InMemoryStorage::new();
        assert_eq!(categories.save_all(&storage).unwrap(), 2);
        assert_eq!(storage.categories().unwrap().len(), 2);
    }
}
