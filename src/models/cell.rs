//! Grid cell model.

use super::{CellId, CellKey, Period};
use crate::error::{FinTableError, Result};

/// One value of the grid: a category's amount for one month.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    /// Identifier, assigned by the cell cache on first insert.
    pub id: CellId,
    /// Main category name.
    pub main_category: String,
    /// Category name.
    pub category: String,
    /// Amount in whole currency units.
    pub value: i64,
    /// Month the value belongs to.
    pub period: Period,
    /// Changed since the last load or save.
    pub dirty: bool,
    /// Excluded from every sum.
    pub deleted: bool,
}

impl Cell {
    /// Creates an unsaved cell without an identifier.
    #[inline]
    #[must_use]
    pub fn new<M: Into<String>, C: Into<String>>(
        main_category: M,
        category: C,
        period: Period,
        value: i64,
    ) -> Self {
        Self {
            id: CellId::default(),
            main_category: main_category.into(),
            category: category.into(),
            value,
            period,
            dirty: false,
            deleted: false,
        }
    }

    /// Cache key of this cell.
    #[inline]
    #[must_use]
    pub fn key(&self) -> CellKey {
        CellKey::new(self.main_category.as_str(), self.category.as_str(), self.period)
    }

    /// Checks that both category coordinates are present.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Validation`] if either name is empty.
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.main_category.is_empty() || self.category.is_empty() {
            return Err(FinTableError::Validation("category is empty".to_owned()));
        }
        Ok(())
    }
}
