//! Category model.

use super::{CategoryId, CategoryKey};
use crate::error::{FinTableError, Result};

/// Name prefix of the categories seeded into an empty store.
const STARTING_CATEGORY_NAME: &str = "Category";

/// A grid row: a named category inside one main category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    /// Identifier, assigned on insert.
    pub id: CategoryId,
    /// Display name, unique within its main category.
    pub name: String,
    /// Owning main category.
    pub main_category: String,
    /// Display position inside the main category, ascending.
    pub priority: u32,
}

impl Category {
    /// Creates an unsaved category without identifier or priority.
    #[inline]
    #[must_use]
    pub fn new<M: Into<String>, N: Into<String>>(main_category: M, name: N) -> Self {
        Self {
            id: CategoryId::default(),
            name: name.into(),
            main_category: main_category.into(),
            priority: 0,
        }
    }

    /// Lookup key of this category.
    #[inline]
    #[must_use]
    pub fn key(&self) -> CategoryKey {
        CategoryKey::new(self.main_category.as_str(), self.name.as_str())
    }

    /// Checks that both names are present.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Validation`] if either name is empty.
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(FinTableError::Validation("category name is required".to_owned()));
        }
        if self.main_category.is_empty() {
            return Err(FinTableError::Validation("main category is required".to_owned()));
        }
        Ok(())
    }

    /// Seed category for an empty store: `"Category N"` where `N` is the
    /// one-based position of the main category.
    #[must_use]
    pub(crate) fn starting(main_category: &str, order_index: usize) -> Self {
        Self {
            id: CategoryId::generate(),
            name: format!("{STARTING_CATEGORY_NAME} {}", order_index + 1),
            main_category: main_category.to_owned(),
            priority: 1,
        }
    }
}
