//! Yearly totals.

use std::collections::{BTreeMap, HashMap};

use super::{CategoryKey, composite_category};

/// Reserved legacy key holding the year's total consumption.
pub const COLUMN_CONSUMPTION: &str = "consumption";
/// Reserved legacy key holding the December balance.
pub const COLUMN_BALANCE: &str = "balance";

/// Totals of one calendar year.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnualResult {
    /// Twelve-month sum of every category.
    pub by_category: BTreeMap<CategoryKey, i64>,
    /// Sum of the cached monthly consumption.
    pub consumption: i64,
    /// December running balance, 0 when it was never computed.
    pub balance: i64,
}

impl AnnualResult {
    /// Flattens into the legacy map keyed by `main_category + name` plus
    /// the reserved [`COLUMN_CONSUMPTION`] and [`COLUMN_BALANCE`] keys.
    #[must_use]
    pub fn to_legacy_map(&self) -> HashMap<String, i64> {
        let mut map: HashMap<String, i64> = self
            .by_category
            .iter()
            .map(|(key, sum)| (composite_category(&key.main_category, &key.name), *sum))
            .collect();
        let _old = map.insert(COLUMN_CONSUMPTION.to_owned(), self.consumption);
        let _old = map.insert(COLUMN_BALANCE.to_owned(), self.balance);
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_map_has_reserved_columns() {
        let mut result = AnnualResult {
            consumption: 300,
            balance: 1_200,
            ..AnnualResult::default()
        };
        let _old = result
            .by_category
            .insert(CategoryKey::new("Expenses", "Food"), 300);
        let map = result.to_legacy_map();
        assert_eq!(map.get("ExpensesFood"), Some(&300));
        assert_eq!(map.get(COLUMN_CONSUMPTION), Some(&300));
        assert_eq!(map.get(COLUMN_BALANCE), Some(&1_200));
        assert_eq!(map.len(), 3);
    }
}
