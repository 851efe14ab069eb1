//! Structured lookup keys and their legacy string encodings.
//!
//! Caches are keyed by [`CellKey`] and [`CategoryKey`] values. The
//! concatenated string forms are kept for interoperating with data keyed
//! the old way; they carry no separators, so names ending in digits can
//! collide across the month/year boundary.

use super::Period;

/// Legacy cell key: `main_category + category + month + year`.
#[inline]
#[must_use]
pub fn composite_id(main_category: &str, category: &str, month: u32, year: i32) -> String {
    format!("{main_category}{category}{month}{year}")
}

/// Legacy period key: `month + year`.
#[inline]
#[must_use]
pub fn composite_date(month: u32, year: i32) -> String {
    format!("{month}{year}")
}

/// Legacy category key: `main_category + category`.
#[inline]
#[must_use]
pub fn composite_category(main_category: &str, category: &str) -> String {
    format!("{main_category}{category}")
}

/// Identity of a category: its main category plus its display name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CategoryKey {
    /// Main category name, e.g. `"Expenses"`.
    pub main_category: String,
    /// Category display name.
    pub name: String,
}

impl CategoryKey {
    /// Creates a category key.
    #[inline]
    #[must_use]
    pub fn new<M: Into<String>, N: Into<String>>(main_category: M, name: N) -> Self {
        Self {
            main_category: main_category.into(),
            name: name.into(),
        }
    }

    /// Key of the cell for this category in `period`.
    #[inline]
    #[must_use]
    pub fn cell(&self, period: Period) -> CellKey {
        CellKey {
            main_category: self.main_category.clone(),
            category: self.name.clone(),
            period,
        }
    }

    /// Legacy `main_category + name` string form.
    #[inline]
    #[must_use]
    pub fn legacy_id(&self) -> String {
        composite_category(&self.main_category, &self.name)
    }
}

/// Identity of a grid cell: category coordinates plus the month.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    /// Main category name.
    pub main_category: String,
    /// Category name.
    pub category: String,
    /// Month the cell belongs to.
    pub period: Period,
}

impl CellKey {
    /// Creates a cell key.
    #[inline]
    #[must_use]
    pub fn new<M: Into<String>, C: Into<String>>(
        main_category: M,
        category: C,
        period: Period,
    ) -> Self {
        Self {
            main_category: main_category.into(),
            category: category.into(),
            period,
        }
    }

    /// The same coordinates under a different category name.
    #[inline]
    #[must_use]
    pub fn with_category(&self, category: &str) -> Self {
        Self {
            main_category: self.main_category.clone(),
            category: category.to_owned(),
            period: self.period,
        }
    }

    /// Legacy concatenated string form, byte-compatible with old data.
    #[inline]
    #[must_use]
    pub fn legacy_id(&self) -> String {
        composite_id(
            &self.main_category,
            &self.category,
            self.period.month(),
            self.period.year(),
        )
    }
}
