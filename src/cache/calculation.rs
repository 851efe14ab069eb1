//! Derived per-month consumption and running balance.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::{FinTableError, Result, lock_error};
use crate::models::Period;

/// Inner mutable state.
#[derive(Debug, Default)]
struct Inner {
    /// Total of the expense cells per month.
    consumption: BTreeMap<Period, i64>,
    /// Running balance at the end of each month.
    balance: BTreeMap<Period, i64>,
}

/// Thread-safe store of computed monthly totals.
///
/// Values are written only by [`crate::calculation::Calculator`]; this type
/// stores them and never computes anything itself.
#[derive(Debug, Default)]
pub struct CalculationCache {
    /// All state behind a single mutex.
    inner: Mutex<Inner>,
}

impl CalculationCache {
    /// Creates an empty cache.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the inner lock and applies a closure.
    fn with_lock<R, F>(&self, op: F) -> Result<R>
    where
        F: FnOnce(&mut Inner) -> R,
    {
        let mut inner = self.inner.lock().map_err(|err| lock_error(&err))?;
        Ok(op(&mut inner))
    }

    /// Cached consumption of `period`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn consumption(&self, period: Period) -> Result<Option<i64>> {
        self.with_lock(|inner| inner.consumption.get(&period).copied())
    }

    /// Cached running balance of `period`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn balance(&self, period: Period) -> Result<Option<i64>> {
        self.with_lock(|inner| inner.balance.get(&period).copied())
    }

    /// Sum of the cached consumption over `periods`; missing months count
    /// as zero.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Overflow`] if the total leaves the `i64`
    /// range, or [`FinTableError::Lock`] if the cache lock is poisoned.
    pub fn consumption_total<I>(&self, periods: I) -> Result<i64>
    where
        I: IntoIterator<Item = Period>,
    {
        self.with_lock(|inner| {
            periods.into_iter().try_fold(0_i64, |total, period| {
                let value = inner.consumption.get(&period).copied().unwrap_or_default();
                total
                    .checked_add(value)
                    .ok_or(FinTableError::Overflow(period))
            })
        })?
    }

    /// Stores the consumption of one month.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn upsert_consumption(&self, period: Period, value: i64) -> Result<()> {
        self.with_lock(|inner| {
            let _old = inner.consumption.insert(period, value);
        })
    }

    /// Stores consumption and balance for many months in one critical
    /// section.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the cache lock is poisoned.
    pub fn apply(
        &self,
        consumption: &BTreeMap<Period, i64>,
        balance: &BTreeMap<Period, i64>,
    ) -> Result<()> {
        self.with_lock(|inner| {
            inner.consumption.extend(consumption.iter().map(|(&period, &value)| (period, value)));
            inner.balance.extend(balance.iter().map(|(&period, &value)| (period, value)));
        })
    }

    /// Discards everything and stores a full rebuild.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the cache lock is poisoned.
    pub fn replace(
        &self,
        consumption: BTreeMap<Period, i64>,
        balance: BTreeMap<Period, i64>,
    ) -> Result<()> {
        self.with_lock(|inner| {
            inner.consumption = consumption;
            inner.balance = balance;
        })
    }

    /// Snapshot of every cached balance.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn balances(&self) -> Result<BTreeMap<Period, i64>> {
        self.with_lock(|inner| inner.balance.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_and_reads_back() {
        let cache = CalculationCache::new();
        let jan = Period::january(2023);
        assert_eq!(cache.consumption(jan).unwrap(), None);
        cache.upsert_consumption(jan, 200).unwrap();
        assert_eq!(cache.consumption(jan).unwrap(), Some(200));
        assert_eq!(cache.balance(jan).unwrap(), None);
    }

    #[test]
    fn apply_merges_and_replace_discards() {
        let cache = CalculationCache::new();
        let jan = Period::january(2023);
        let feb = jan.next();
        cache
            .apply(&BTreeMap::from([(jan, 10)]), &BTreeMap::from([(jan, 990)]))
            .unwrap();
        cache
            .apply(&BTreeMap::from([(feb, 20)]), &BTreeMap::from([(feb, 970)]))
            .unwrap();
        assert_eq!(cache.balances().unwrap().len(), 2);
        assert_eq!(cache.consumption_total(Period::year_range(2023)).unwrap(), 30);

        cache
            .replace(BTreeMap::new(), BTreeMap::from([(feb, 1)]))
            .unwrap();
        assert_eq!(cache.consumption(jan).unwrap(), None);
        assert_eq!(cache.balance(jan).unwrap(), None);
        assert_eq!(cache.balance(feb).unwrap(), Some(1));
    }
}
