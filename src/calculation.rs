//! Calculation engine: monthly consumption and the running balance chain.
//!
//! For every month `t` from the configured start period:
//!
//! ```text
//! balance(t) = income(t) - consumption(t) + balance(t - 1)
//! balance(start - 1) = start_money
//! ```
//!
//! Income and consumption are the sums of the cells of every category
//! under the configured income and expenses main categories. The chain is
//! strictly forward: a month's balance needs the previous month's balance,
//! so an edit to one month invalidates every later month.

use alloc::sync::Arc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use crate::cache::{CalculationCache, CategoryCache, CellCache};
use crate::config::{Clock, Settings};
use crate::error::{FinTableError, Result, lock_error};
use crate::models::{Account, AccountSums, AnnualResult, CategoryKey, CellKey, Period};

/// Consistent copy of what the sums read, taken category cache first,
/// then cell cache.
#[derive(Debug)]
struct Snapshot {
    /// Categories under the expenses main category.
    expenses: Vec<CategoryKey>,
    /// Categories under the income main category.
    income: Vec<CategoryKey>,
    /// Values of every live cell.
    values: HashMap<CellKey, i64>,
}

impl Snapshot {
    /// Sum of the cells of `categories` in `period`.
    fn sum(&self, categories: &[CategoryKey], period: Period) -> Result<i64> {
        categories
            .iter()
            .filter_map(|category| self.values.get(&category.cell(period)))
            .try_fold(0_i64, |total, &value| total.checked_add(value))
            .ok_or(FinTableError::Overflow(period))
    }

    /// Expense total of `period`.
    fn consumption(&self, period: Period) -> Result<i64> {
        self.sum(&self.expenses, period)
    }

    /// Income total of `period`.
    fn income(&self, period: Period) -> Result<i64> {
        self.sum(&self.income, period)
    }
}

/// One link of the chain: `income - spent + carried`.
fn next_balance(period: Period, income: i64, spent: i64, carried: i64) -> Result<i64> {
    income
        .checked_sub(spent)
        .and_then(|net| net.checked_add(carried))
        .ok_or(FinTableError::Overflow(period))
}

/// Computes consumption and balances from the category and cell caches and
/// stores them in the calculation cache.
///
/// Cloning is cheap; clones share the same caches. Recomputations from
/// any clone run one at a time, so a snapshot is never written back after
/// a newer one.
#[derive(Debug, Clone)]
pub struct Calculator {
    /// Calculation settings.
    settings: Arc<Settings>,
    /// First period of the chain, derived from `settings`.
    start: Period,
    /// Category source.
    categories: Arc<CategoryCache>,
    /// Cell source.
    cells: Arc<CellCache>,
    /// Destination of every computed value.
    cache: Arc<CalculationCache>,
    /// Decides the last period of the chain.
    clock: Arc<dyn Clock>,
    /// Held from snapshot to write-back of every recomputation.
    recompute: Arc<Mutex<()>>,
}

impl Calculator {
    /// Creates an engine over the given caches.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Validation`] if the configured start month
    /// is invalid.
    pub fn new(
        settings: Arc<Settings>,
        categories: Arc<CategoryCache>,
        cells: Arc<CellCache>,
        cache: Arc<CalculationCache>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let start = settings.start_period()?;
        Ok(Self {
            settings,
            start,
            categories,
            cells,
            cache,
            clock,
            recompute: Arc::new(Mutex::new(())),
        })
    }

    /// First period of the balance chain.
    #[inline]
    #[must_use]
    pub const fn start(&self) -> Period {
        self.start
    }

    /// The calculation cache this engine writes to.
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &CalculationCache {
        &self.cache
    }

    /// Current period according to the injected clock.
    #[inline]
    #[must_use]
    pub fn today(&self) -> Period {
        self.clock.today()
    }

    /// Runs `op` while holding the recomputation lock.
    fn exclusive<R, F>(&self, op: F) -> Result<R>
    where
        F: FnOnce() -> Result<R>,
    {
        let _guard = self.recompute.lock().map_err(|err| lock_error(&err))?;
        op()
    }

    /// Takes the category and cell snapshots, in that order.
    fn snapshot(&self) -> Result<Snapshot> {
        let expenses = self.categories.keys_of(&self.settings.expenses)?;
        let income = self.categories.keys_of(&self.settings.income)?;
        let values = self.cells.values()?;
        Ok(Snapshot {
            expenses,
            income,
            values,
        })
    }

    /// Rejects periods before the start of the chain.
    fn check_period(&self, period: Period) -> Result<()> {
        if period < self.start {
            return Err(FinTableError::PeriodBeforeStart {
                period,
                start: self.start,
            });
        }
        Ok(())
    }

    /// Balance carried into `period`: the start money for the start period,
    /// otherwise the cached balance of the preceding month.
    fn previous_balance(&self, period: Period) -> Result<i64> {
        if period == self.start {
            return Ok(self.settings.start_money);
        }
        let previous = period.previous();
        self.cache
            .balance(previous)?
            .ok_or(FinTableError::PreviousBalanceNotFound(previous))
    }

    /// Recomputes everything from scratch.
    ///
    /// Consumption is computed for every month in the chain and every month
    /// holding expense cells. Balances are computed from the start period
    /// through the current month, in chronological order.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Overflow`] if a sum leaves the `i64` range,
    /// or [`FinTableError::Lock`] if a cache lock is poisoned.
    #[tracing::instrument(skip_all)]
    pub fn rebuild(&self) -> Result<()> {
        self.exclusive(|| self.rebuild_unlocked())
    }

    /// [`Self::rebuild`] without taking the recomputation lock.
    fn rebuild_unlocked(&self) -> Result<()> {
        let today = self.clock.today();
        let snapshot = self.snapshot()?;

        let mut periods: BTreeSet<Period> = Period::range(self.start, today).collect();
        periods.extend(
            snapshot
                .values
                .keys()
                .filter(|key| key.main_category == self.settings.expenses)
                .map(|key| key.period),
        );
        let consumption = periods
            .into_iter()
            .map(|period| Ok((period, snapshot.consumption(period)?)))
            .collect::<Result<BTreeMap<Period, i64>>>()?;

        let mut balance = BTreeMap::new();
        let mut carried = self.settings.start_money;
        for period in Period::range(self.start, today) {
            let spent = consumption.get(&period).copied().unwrap_or_default();
            carried = next_balance(period, snapshot.income(period)?, spent, carried)?;
            let _old = balance.insert(period, carried);
        }

        tracing::debug!(
            months = balance.len(),
            consumption_months = consumption.len(),
            "rebuilt calculation cache"
        );
        self.cache.replace(consumption, balance)
    }

    /// Recomputes and stores the consumption of one month.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::PeriodBeforeStart`] for periods before the
    /// start, [`FinTableError::Overflow`] if the sum leaves the `i64`
    /// range, or [`FinTableError::Lock`] if a cache lock is poisoned.
    pub fn consumption_sum(&self, period: Period) -> Result<i64> {
        self.exclusive(|| self.consumption_unlocked(period))
    }

    /// [`Self::consumption_sum`] without taking the recomputation lock.
    fn consumption_unlocked(&self, period: Period) -> Result<i64> {
        self.check_period(period)?;
        let consumption = self.snapshot()?.consumption(period)?;
        self.cache.upsert_consumption(period, consumption)?;
        Ok(consumption)
    }

    /// Recomputes and stores the balance of one month.
    ///
    /// Consumption of the month is recomputed first, so the result never
    /// depends on a stale cached consumption. The previous month's balance
    /// is read from the cache.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::PeriodBeforeStart`] for periods before the
    /// start, [`FinTableError::PreviousBalanceNotFound`] if the preceding
    /// balance was never computed, [`FinTableError::Overflow`] or
    /// [`FinTableError::Lock`].
    pub fn balance_sum(&self, period: Period) -> Result<i64> {
        self.exclusive(|| {
            self.check_period(period)?;
            let snapshot = self.snapshot()?;
            let consumption = snapshot.consumption(period)?;
            let balance = next_balance(
                period,
                snapshot.income(period)?,
                consumption,
                self.previous_balance(period)?,
            )?;
            self.cache.apply(
                &BTreeMap::from([(period, consumption)]),
                &BTreeMap::from([(period, balance)]),
            )?;
            Ok(balance)
        })
    }

    /// Recomputes every balance from `period` through the current month,
    /// or through the latest cached month when that lies further ahead.
    ///
    /// A future `period` more than one month ahead first fills the gap
    /// after the current month, so its previous balance always exists.
    /// All results are written in one critical section. Returns the new
    /// balance of every touched month.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::PeriodBeforeStart`] for periods before the
    /// start, [`FinTableError::PreviousBalanceNotFound`] if the balance
    /// preceding the first recomputed month was never computed,
    /// [`FinTableError::Overflow`] or [`FinTableError::Lock`].
    #[tracing::instrument(skip(self))]
    pub fn upsert_balance(&self, period: Period) -> Result<BTreeMap<Period, i64>> {
        self.exclusive(|| self.cascade_unlocked(period))
    }

    /// [`Self::upsert_balance`] without taking the recomputation lock.
    fn cascade_unlocked(&self, period: Period) -> Result<BTreeMap<Period, i64>> {
        self.check_period(period)?;
        let today = self.clock.today();
        let first = period.min(today.next()).max(self.start);
        let latest = self.cache.balances()?.keys().next_back().copied();
        let end = latest.map_or(period, |cached| cached.max(period)).max(today);
        let snapshot = self.snapshot()?;
        let mut carried = self.previous_balance(first)?;

        let mut consumption = BTreeMap::new();
        let mut balance = BTreeMap::new();
        for month in Period::range(first, end) {
            let spent = snapshot.consumption(month)?;
            carried = next_balance(month, snapshot.income(month)?, spent, carried)?;
            let _old = consumption.insert(month, spent);
            let _old = balance.insert(month, carried);
        }

        self.cache.apply(&consumption, &balance)?;
        tracing::debug!(months = balance.len(), "cascaded balance");
        Ok(balance)
    }

    /// Recomputes one edited month: its consumption, then the balance
    /// cascade starting at it, as one recomputation. Returns the
    /// consumption and every touched balance.
    ///
    /// # Errors
    ///
    /// Same as [`Self::consumption_sum`] and [`Self::upsert_balance`].
    #[inline]
    pub fn recalculate(&self, period: Period) -> Result<(i64, BTreeMap<Period, i64>)> {
        self.exclusive(|| {
            let consumption = self.consumption_unlocked(period)?;
            let balances = self.cascade_unlocked(period)?;
            Ok((consumption, balances))
        })
    }

    /// Yearly totals: every category's twelve-month sum, the summed cached
    /// consumption, and the December balance (0 if never computed).
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Overflow`] if a yearly sum leaves the `i64`
    /// range, or [`FinTableError::Lock`] if a cache lock is poisoned.
    pub fn annual_result(&self, year: i32) -> Result<AnnualResult> {
        let groups = self.categories.groups()?;
        let values = self.cells.values()?;

        let by_category = groups
            .iter()
            .flatten()
            .map(|category| {
                let key = category.key();
                let total = Period::year_range(year)
                    .filter_map(|period| values.get(&key.cell(period)))
                    .try_fold(0_i64, |total, &value| total.checked_add(value))
                    .ok_or(FinTableError::Overflow(Period::december(year)))?;
                Ok((key, total))
            })
            .collect::<Result<BTreeMap<CategoryKey, i64>>>()?;
        let consumption = self.cache.consumption_total(Period::year_range(year))?;
        let balance = self.cache.balance(Period::december(year))?.unwrap_or(0);

        Ok(AnnualResult {
            by_category,
            consumption,
            balance,
        })
    }

    /// Account aggregates: the sum of active accounts counted in the sum,
    /// and its difference to the current month's balance (taken as 0 when
    /// not computed).
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Overflow`] if a sum leaves the `i64` range,
    /// or [`FinTableError::Lock`] if the calculation cache lock is
    /// poisoned.
    pub fn account_sums(&self, accounts: &[Account]) -> Result<AccountSums> {
        let today = self.clock.today();
        let main_sum = accounts
            .iter()
            .filter(|account| !account.deleted && account.in_sum)
            .try_fold(0_i64, |total, account| total.checked_add(account.sum))
            .ok_or(FinTableError::Overflow(today))?;
        let balance = self.cache.balance(today)?.unwrap_or(0);
        Ok(AccountSums {
            main_sum,
            diff_sum: main_sum
                .checked_sub(balance)
                .ok_or(FinTableError::Overflow(today))?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FixedClock;
    use crate::models::{Category, CategoryId, Cell};

    fn period(year: i32, month: u32) -> Period {
        Period::new(year, month).unwrap()
    }

    fn category(main: &str, name: &str, priority: u32) -> Category {
        Category {
            id: CategoryId::from(name),
            priority,
            ..Category::new(main, name)
        }
    }

    struct Fixture {
        calculator: Calculator,
        cells: Arc<CellCache>,
    }

    fn fixture(settings: Settings, today: Period, cells: Vec<Cell>) -> Fixture {
        let categories = Arc::new(CategoryCache::new(settings.main_category_order.clone()));
        let _dropped = categories
            .init(vec![
                category("Expenses", "Food", 1),
                category("Expenses", "Rent", 2),
                category("Income", "Salary", 1),
            ])
            .unwrap();
        let cell_cache = Arc::new(CellCache::new());
        cell_cache.init(cells).unwrap();
        let calculator = Calculator::new(
            Arc::new(settings),
            categories,
            Arc::clone(&cell_cache),
            Arc::new(CalculationCache::new()),
            Arc::new(FixedClock::at(today)),
        )
        .unwrap();
        Fixture {
            calculator,
            cells: cell_cache,
        }
    }

    fn january_fixture(today: Period) -> Fixture {
        fixture(
            Settings::new(2023, 1, 1_000),
            today,
            vec![
                Cell::new("Income", "Salary", period(2023, 1), 500),
                Cell::new("Expenses", "Food", period(2023, 1), 200),
            ],
        )
    }

    #[test]
    fn january_consumption_and_balance() {
        let fx = january_fixture(period(2023, 1));
        assert_eq!(fx.calculator.consumption_sum(period(2023, 1)).unwrap(), 200);
        assert_eq!(fx.calculator.balance_sum(period(2023, 1)).unwrap(), 1_300);
        assert_eq!(
            fx.calculator.cache().balance(period(2023, 1)).unwrap(),
            Some(1_300)
        );
    }

    #[test]
    fn editing_january_cascades_into_february() {
        let fx = january_fixture(period(2023, 3));
        let _salary = fx
            .cells
            .upsert(Cell::new("Income", "Salary", period(2023, 2), 100))
            .unwrap();
        fx.calculator.rebuild().unwrap();
        let before = fx.calculator.cache().balance(period(2023, 2)).unwrap();
        assert_eq!(before, Some(1_400));

        let _food = fx
            .cells
            .upsert(Cell::new("Expenses", "Food", period(2023, 1), 300))
            .unwrap();
        assert_eq!(fx.calculator.consumption_sum(period(2023, 1)).unwrap(), 300);
        let touched = fx.calculator.upsert_balance(period(2023, 1)).unwrap();

        assert_eq!(touched.get(&period(2023, 1)), Some(&1_200));
        assert_eq!(touched.get(&period(2023, 2)), Some(&1_300));
        assert_eq!(touched.get(&period(2023, 3)), Some(&1_300));
        assert_eq!(touched.len(), 3);
        assert_eq!(
            fx.calculator.cache().balance(period(2023, 2)).unwrap(),
            Some(1_300)
        );
    }

    #[test]
    fn rebuild_satisfies_forward_chain_across_years() {
        let fx = fixture(
            Settings::new(2022, 11, 250),
            period(2023, 2),
            vec![
                Cell::new("Income", "Salary", period(2022, 11), 900),
                Cell::new("Expenses", "Rent", period(2022, 11), 600),
                Cell::new("Expenses", "Food", period(2022, 12), 150),
                Cell::new("Income", "Salary", period(2023, 1), 900),
                Cell::new("Expenses", "Rent", period(2023, 1), 600),
                Cell::new("Expenses", "Food", period(2023, 2), 80),
            ],
        );
        fx.calculator.rebuild().unwrap();

        let cache = fx.calculator.cache();
        let values = fx.cells.values().unwrap();
        let value = |main: &str, name: &str, at: Period| {
            values
                .get(&CellKey::new(main, name, at))
                .copied()
                .unwrap_or(0)
        };
        let mut previous = 250;
        for at in Period::range(period(2022, 11), period(2023, 2)) {
            let income = value("Income", "Salary", at);
            let consumption = value("Expenses", "Food", at) + value("Expenses", "Rent", at);
            assert_eq!(cache.consumption(at).unwrap(), Some(consumption));
            let balance = cache.balance(at).unwrap().unwrap();
            assert_eq!(balance, income - consumption + previous);
            previous = balance;
        }
        assert_eq!(previous, 250 + 900 - 600 - 150 + 900 - 600 - 80);
        assert_eq!(cache.balance(period(2023, 3)).unwrap(), None);
    }

    #[test]
    fn balance_sum_recomputes_consumption_itself() {
        let fx = january_fixture(period(2023, 1));
        fx.calculator.rebuild().unwrap();
        let _food = fx
            .cells
            .upsert(Cell::new("Expenses", "Food", period(2023, 1), 450))
            .unwrap();
        assert_eq!(fx.calculator.balance_sum(period(2023, 1)).unwrap(), 1_050);
        assert_eq!(
            fx.calculator.cache().consumption(period(2023, 1)).unwrap(),
            Some(450)
        );
    }

    #[test]
    fn missing_previous_balance_is_an_error() {
        let fx = january_fixture(period(2023, 3));
        let result = fx.calculator.balance_sum(period(2023, 3));
        assert!(matches!(
            result,
            Err(FinTableError::PreviousBalanceNotFound(prev)) if prev == period(2023, 2)
        ));
    }

    #[test]
    fn periods_before_start_are_rejected() {
        let fx = january_fixture(period(2023, 3));
        assert!(matches!(
            fx.calculator.upsert_balance(period(2022, 12)),
            Err(FinTableError::PeriodBeforeStart { .. })
        ));
        assert!(matches!(
            fx.calculator.consumption_sum(period(2022, 12)),
            Err(FinTableError::PeriodBeforeStart { .. })
        ));
    }

    #[test]
    fn deleted_cells_are_ignored() {
        let mut gone = Cell::new("Expenses", "Rent", period(2023, 1), 999);
        gone.deleted = true;
        let fx = fixture(
            Settings::new(2023, 1, 0),
            period(2023, 1),
            vec![gone, Cell::new("Expenses", "Food", period(2023, 1), 10)],
        );
        assert_eq!(fx.calculator.consumption_sum(period(2023, 1)).unwrap(), 10);
    }

    #[test]
    fn future_period_cascades_through_itself() {
        let fx = january_fixture(period(2023, 1));
        fx.calculator.rebuild().unwrap();
        let touched = fx.calculator.upsert_balance(period(2023, 2)).unwrap();
        assert_eq!(touched, BTreeMap::from([(period(2023, 2), 1_300)]));
    }

    #[test]
    fn far_future_period_fills_the_gap() {
        let fx = january_fixture(period(2023, 1));
        fx.calculator.rebuild().unwrap();
        let _bonus = fx
            .cells
            .upsert(Cell::new("Income", "Salary", period(2023, 4), 50))
            .unwrap();
        let touched = fx.calculator.upsert_balance(period(2023, 4)).unwrap();
        assert_eq!(
            touched,
            BTreeMap::from([
                (period(2023, 2), 1_300),
                (period(2023, 3), 1_300),
                (period(2023, 4), 1_350),
            ])
        );

        // An earlier edit keeps the cached future months consistent.
        let _food = fx
            .cells
            .upsert(Cell::new("Expenses", "Food", period(2023, 2), 100))
            .unwrap();
        let touched = fx.calculator.upsert_balance(period(2023, 2)).unwrap();
        assert_eq!(touched.get(&period(2023, 4)), Some(&1_250));
    }

    #[test]
    fn recalculate_returns_consumption_and_cascade() {
        let fx = january_fixture(period(2023, 2));
        fx.calculator.rebuild().unwrap();
        let _food = fx
            .cells
            .upsert(Cell::new("Expenses", "Food", period(2023, 1), 250))
            .unwrap();
        let (consumption, balances) = fx.calculator.recalculate(period(2023, 1)).unwrap();
        assert_eq!(consumption, 250);
        assert_eq!(
            balances,
            BTreeMap::from([(period(2023, 1), 1_250), (period(2023, 2), 1_250)])
        );
    }

    #[test]
    fn annual_result_sums_categories_and_reserved_columns() {
        let fx = fixture(
            Settings::new(2023, 1, 1_000),
            period(2023, 12),
            vec![
                Cell::new("Income", "Salary", period(2023, 1), 500),
                Cell::new("Income", "Salary", period(2023, 6), 500),
                Cell::new("Expenses", "Food", period(2023, 1), 200),
                Cell::new("Expenses", "Food", period(2023, 12), 100),
                Cell::new("Expenses", "Food", period(2024, 1), 7),
            ],
        );
        fx.calculator.rebuild().unwrap();
        let result = fx.calculator.annual_result(2023).unwrap();

        assert_eq!(
            result.by_category.get(&CategoryKey::new("Income", "Salary")),
            Some(&1_000)
        );
        assert_eq!(
            result.by_category.get(&CategoryKey::new("Expenses", "Food")),
            Some(&300)
        );
        assert_eq!(
            result.by_category.get(&CategoryKey::new("Expenses", "Rent")),
            Some(&0)
        );
        assert_eq!(result.consumption, 300);
        assert_eq!(result.balance, 1_700);

        let legacy = result.to_legacy_map();
        assert_eq!(legacy.get("ExpensesFood"), Some(&300));
        assert_eq!(legacy.get("balance"), Some(&1_700));
    }

    #[test]
    fn annual_result_without_balance_reports_zero() {
        let fx = january_fixture(period(2023, 1));
        let result = fx.calculator.annual_result(2030).unwrap();
        assert_eq!(result.balance, 0);
        assert_eq!(result.consumption, 0);
    }

    #[test]
    fn account_sums_skip_deleted_and_excluded() {
        let fx = january_fixture(period(2023, 1));
        fx.calculator.rebuild().unwrap();
        let card = Account::new("Card", 1_000);
        let mut savings = Account::new("Savings", 5_000);
        savings.in_sum = false;
        let mut closed = Account::new("Closed", 700);
        closed.deleted = true;
        let sums = fx
            .calculator
            .account_sums(&[card, savings, closed])
            .unwrap();
        assert_eq!(sums.main_sum, 1_000);
        assert_eq!(sums.diff_sum, 1_000 - 1_300);
    }

    #[test]
    fn overflowing_income_is_an_error() {
        let fx = january_fixture(period(2023, 2));
        fx.calculator.rebuild().unwrap();
        let _salary = fx
            .cells
            .upsert(Cell::new("Income", "Salary", period(2023, 1), i64::MAX))
            .unwrap();

        let err = fx.calculator.recalculate(period(2023, 1)).unwrap_err();
        assert!(matches!(err, FinTableError::Overflow(at) if at == period(2023, 1)));
        assert!(matches!(
            fx.calculator.rebuild().unwrap_err(),
            FinTableError::Overflow(_)
        ));
        assert_eq!(
            fx.calculator.cache().balance(period(2023, 1)).unwrap(),
            Some(1_300)
        );
    }

    #[test]
    fn overflowing_category_total_is_an_error() {
        let fx = january_fixture(period(2023, 1));
        let _food = fx
            .cells
            .upsert(Cell::new("Expenses", "Food", period(2023, 2), i64::MAX))
            .unwrap();
        assert!(matches!(
            fx.calculator.annual_result(2023).unwrap_err(),
            FinTableError::Overflow(_)
        ));
    }

    #[test]
    fn overflowing_account_sum_is_an_error() {
        let fx = january_fixture(period(2023, 1));
        fx.calculator.rebuild().unwrap();
        let accounts = [Account::new("Card", i64::MAX), Account::new("Cash", 1)];
        assert!(matches!(
            fx.calculator.account_sums(&accounts).unwrap_err(),
            FinTableError::Overflow(_)
        ));
    }

    #[test]
    fn concurrent_recalculations_match_a_rebuild() {
        let fx = january_fixture(period(2023, 3));
        fx.calculator.rebuild().unwrap();
        std::thread::scope(|scope| {
            for writer in 1..=4_i64 {
                let calculator = fx.calculator.clone();
                let cells = Arc::clone(&fx.cells);
                let _handle = scope.spawn(move || {
                    for round in 0..50_i64 {
                        let value = writer * 100 + round;
                        let _rent = cells
                            .upsert(Cell::new("Expenses", "Rent", period(2023, 2), value))
                            .unwrap();
                        let _touched = calculator.recalculate(period(2023, 2)).unwrap();
                    }
                });
            }
        });

        let cascaded = fx.calculator.cache().balances().unwrap();
        fx.calculator.rebuild().unwrap();
        assert_eq!(fx.calculator.cache().balances().unwrap(), cascaded);
    }
}
