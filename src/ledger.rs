//! Ledger façade: loads everything from a [`Storage`] backend and exposes
//! the operations a front end needs.
//!
//! A [`Ledger`] owns the storage backend and the caches. It is loaded once,
//! edited in memory, and written back with [`Ledger::save_all`].

use alloc::sync::Arc;
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::cache::{AccountCache, AccountDraft, CalculationCache, CategoryCache, CellCache};
use crate::calculation::Calculator;
use crate::config::{Clock, MainCategoryOrder, Settings};
use crate::error::{FinTableError, Result};
use crate::models::{
    Account, AccountId, AccountSums, AnnualResult, Category, CategoryKey, Cell, CellKey, Period,
};
use crate::service::{AccountService, CategoryService, TableService, UpdatingService};
use crate::storage::Storage;

/// In-memory ledger over a persistence backend.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use fintable_rs::config::{FixedClock, Settings};
/// use fintable_rs::ledger::Ledger;
/// use fintable_rs::models::Period;
/// use fintable_rs::storage::InMemoryStorage;
///
/// let january = Period::january(2023);
/// let ledger = Ledger::load(
///     InMemoryStorage::new(),
///     Settings::new(2023, 1, 1_000),
///     Arc::new(FixedClock::at(january)),
/// )
/// .unwrap();
/// ledger.add_category("Income", "Salary").unwrap();
/// ledger.upsert_value("Income", "Salary", january, 500).unwrap();
/// ledger.recalculate(january).unwrap();
/// assert_eq!(ledger.balance_sum(january).unwrap(), 1_500);
/// ```
#[derive(Debug)]
pub struct Ledger<S: Storage> {
    /// Persistence backend.
    storage: S,
    /// Calculation settings.
    settings: Arc<Settings>,
    /// Time source for timestamps and the current month.
    clock: Arc<dyn Clock>,
    /// Grid values.
    table: TableService,
    /// Categories.
    categories: CategoryService,
    /// Accounts.
    accounts: AccountService,
    /// Last-updated bookkeeping.
    updating: UpdatingService,
    /// Calculation engine.
    calculator: Calculator,
}

/// Seed categories for every main category without any loaded category.
fn starting_categories(order: &MainCategoryOrder, loaded: &[Category]) -> Vec<Category> {
    order
        .names()
        .into_iter()
        .enumerate()
        .filter(|&(_, name)| !loaded.iter().any(|category| category.main_category == name))
        .map(|(index, name)| Category::starting(name, index))
        .collect()
}

impl<S: Storage> Ledger<S> {
    /// Loads every record from `storage`, seeds defaults for an empty
    /// store, and computes all consumption and balance values.
    ///
    /// Seeding adds one `"Category N"` to every main category that has no
    /// category yet and an `"Account 1"` when there are no accounts. Seeds
    /// are persisted on the next [`Self::save_all`].
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Config`] for invalid settings,
    /// [`FinTableError::Overflow`] if stored values sum past the `i64`
    /// range, or an error if the backend read fails.
    #[tracing::instrument(skip_all)]
    pub fn load(storage: S, settings: Settings, clock: Arc<dyn Clock>) -> Result<Self> {
        settings.validate()?;
        let start = settings.start_period()?;
        let settings = Arc::new(settings);

        let mut categories = storage.categories()?;
        let seeded = starting_categories(&settings.main_category_order, &categories);
        categories.extend(seeded);
        let category_cache = Arc::new(CategoryCache::new(settings.main_category_order.clone()));
        let dropped = category_cache.init(categories)?;

        let cell_cache = Arc::new(CellCache::new());
        cell_cache.init(storage.cells()?)?;

        let mut accounts = storage.accounts()?;
        if accounts.is_empty() {
            accounts.push(Account::starting(clock.now()));
        }
        let account_cache = Arc::new(AccountCache::new());
        account_cache.init(accounts)?;

        let updating = UpdatingService::load(&storage)?;
        let calculator = Calculator::new(
            Arc::clone(&settings),
            Arc::clone(&category_cache),
            Arc::clone(&cell_cache),
            Arc::new(CalculationCache::new()),
            Arc::clone(&clock),
        )?;
        calculator.rebuild()?;

        tracing::debug!(
            cells = cell_cache.len()?,
            dropped_categories = dropped,
            start = %start,
            "ledger loaded"
        );
        Ok(Self {
            storage,
            settings,
            table: TableService::new(cell_cache, start, Arc::clone(&clock)),
            categories: CategoryService::new(category_cache),
            accounts: AccountService::new(account_cache, Arc::clone(&clock)),
            updating,
            calculator,
            clock,
        })
    }

    /// The persistence backend.
    #[inline]
    #[must_use]
    pub const fn storage(&self) -> &S {
        &self.storage
    }

    /// Consumes the ledger, returning the backend. Unsaved edits are lost.
    #[inline]
    #[must_use]
    pub fn into_storage(self) -> S {
        self.storage
    }

    /// Calculation settings.
    #[inline]
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The calculation engine; clone it to hand it to a worker.
    #[inline]
    #[must_use]
    pub const fn calculator(&self) -> &Calculator {
        &self.calculator
    }

    /// Current month according to the injected clock.
    #[inline]
    #[must_use]
    pub fn today(&self) -> Period {
        self.clock.today()
    }

    // ── Grid ────────────────────────────────────────────────────────

    /// Stores a value for an existing category and records the edit time.
    ///
    /// Sums are not recomputed; call [`Self::recalculate`] (or send the
    /// period to a worker) afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Validation`] for empty names or
    /// [`FinTableError::CategoryNotFound`] if the category does not exist.
    #[tracing::instrument(skip(self))]
    pub fn upsert_value(
        &self,
        main_category: &str,
        category: &str,
        period: Period,
        value: i64,
    ) -> Result<Cell> {
        let cell = Cell::new(main_category, category, period, value);
        cell.validate()?;
        if !self
            .categories
            .exists(&CategoryKey::new(main_category, category))?
        {
            return Err(FinTableError::CategoryNotFound {
                main_category: main_category.to_owned(),
                name: category.to_owned(),
            });
        }
        let stored = self.table.upsert(cell)?;
        self.updating.set_last_updated(self.clock.now())?;
        Ok(stored)
    }

    /// Point lookup of a grid value.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn cell(&self, main_category: &str, category: &str, period: Period) -> Result<Option<Cell>> {
        self.table
            .get(&CellKey::new(main_category, category, period))
    }

    // ── Categories ─────────────────────────────────────────────────

    /// Adds a category at the end of its main category and records the
    /// edit time.
    ///
    /// # Errors
    ///
    /// See [`CategoryService::add`].
    #[inline]
    pub fn add_category(&self, main_category: &str, name: &str) -> Result<Category> {
        let category = self.categories.add(main_category, name)?;
        self.updating.set_last_updated(self.clock.now())?;
        Ok(category)
    }

    /// Returns `true` if the category exists.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn category_exists(&self, main_category: &str, name: &str) -> Result<bool> {
        self.categories
            .exists(&CategoryKey::new(main_category, name))
    }

    /// Renames a category, moves its cells from the start period through
    /// the current month and records the edit time. Returns the number of
    /// moved cells.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::CategoryNotFound`] or
    /// [`FinTableError::DuplicateCategory`]; no cell is moved then.
    #[tracing::instrument(skip(self))]
    pub fn rename_category(&self, main_category: &str, old_name: &str, new_name: &str) -> Result<usize> {
        let _renamed = self
            .categories
            .rename(&CategoryKey::new(main_category, old_name), new_name)?;
        let moved = self
            .table
            .update_category_name(main_category, old_name, new_name)?;
        self.updating.set_last_updated(self.clock.now())?;
        Ok(moved)
    }

    /// Categories grouped by main category in configured order.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn categories(&self) -> Result<Vec<Vec<Category>>> {
        self.categories.groups()
    }

    // ── Calculations ───────────────────────────────────────────────

    /// See [`Calculator::consumption_sum`].
    ///
    /// # Errors
    ///
    /// See [`Calculator::consumption_sum`].
    #[inline]
    pub fn consumption_sum(&self, period: Period) -> Result<i64> {
        self.calculator.consumption_sum(period)
    }

    /// See [`Calculator::balance_sum`].
    ///
    /// # Errors
    ///
    /// See [`Calculator::balance_sum`].
    #[inline]
    pub fn balance_sum(&self, period: Period) -> Result<i64> {
        self.calculator.balance_sum(period)
    }

    /// See [`Calculator::upsert_balance`].
    ///
    /// # Errors
    ///
    /// See [`Calculator::upsert_balance`].
    #[inline]
    pub fn upsert_balance(&self, period: Period) -> Result<BTreeMap<Period, i64>> {
        self.calculator.upsert_balance(period)
    }

    /// See [`Calculator::recalculate`].
    ///
    /// # Errors
    ///
    /// See [`Calculator::recalculate`].
    #[inline]
    pub fn recalculate(&self, period: Period) -> Result<(i64, BTreeMap<Period, i64>)> {
        self.calculator.recalculate(period)
    }

    /// See [`Calculator::annual_result`].
    ///
    /// # Errors
    ///
    /// See [`Calculator::annual_result`].
    #[inline]
    pub fn annual_result(&self, year: i32) -> Result<AnnualResult> {
        self.calculator.annual_result(year)
    }

    // ── Accounts ───────────────────────────────────────────────────

    /// Accounts shown to the user.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn accounts(&self) -> Result<Vec<Account>> {
        self.accounts.active()
    }

    /// Every account, soft-deleted ones included.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn all_accounts(&self) -> Result<Vec<Account>> {
        self.accounts.all()
    }

    /// Direct account lookup, soft-deleted ones included.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Lock`] if the cache lock is poisoned.
    #[inline]
    pub fn account(&self, id: &AccountId) -> Result<Option<Account>> {
        self.accounts.get(id)
    }

    /// See [`AccountService::insert`].
    ///
    /// # Errors
    ///
    /// See [`AccountService::insert`].
    #[inline]
    pub fn insert_account(&self, account: Account) -> Result<Account> {
        self.accounts.insert(account)
    }

    /// See [`AccountService::update`].
    ///
    /// # Errors
    ///
    /// See [`AccountService::update`].
    #[inline]
    pub fn update_account(&self, account: Account) -> Result<Account> {
        self.accounts.update(account)
    }

    /// See [`AccountService::delete`].
    ///
    /// # Errors
    ///
    /// See [`AccountService::delete`].
    #[inline]
    pub fn delete_account(&self, id: &AccountId) -> Result<()> {
        self.accounts.delete(id)
    }

    /// See [`AccountService::draft`].
    ///
    /// # Errors
    ///
    /// See [`AccountService::draft`].
    #[inline]
    pub fn account_draft(&self) -> Result<AccountDraft> {
        self.accounts.draft()
    }

    /// See [`AccountService::commit`].
    ///
    /// # Errors
    ///
    /// See [`AccountService::commit`].
    #[inline]
    pub fn commit_accounts(&self, draft: AccountDraft) -> Result<()> {
        self.accounts.commit(draft)
    }

    /// Sum of the active accounts and its difference to the current
    /// month's balance.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Lock`] if a cache lock is poisoned.
    #[inline]
    pub fn account_sums(&self) -> Result<AccountSums> {
        self.calculator.account_sums(&self.accounts.active()?)
    }

    // ── Bookkeeping ────────────────────────────────────────────────

    /// Time of the last grid edit.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Lock`] if the lock is poisoned.
    #[inline]
    pub fn last_updated(&self) -> Result<Option<DateTime<Utc>>> {
        self.updating.last_updated()
    }

    /// The "last record" note.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Lock`] if the lock is poisoned.
    #[inline]
    pub fn last_record(&self) -> Result<String> {
        self.updating.last_record()
    }

    /// Replaces the "last record" note.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Lock`] if the lock is poisoned.
    #[inline]
    pub fn set_last_record(&self, note: &str) -> Result<()> {
        self.updating.set_last_record(note)
    }

    /// Writes categories, cells, accounts and bookkeeping, in that order.
    ///
    /// # Errors
    ///
    /// Returns the first backend error; later steps are skipped.
    #[tracing::instrument(skip_all)]
    pub fn save_all(&self) -> Result<()> {
        let categories = self.categories.save_all(&self.storage)?;
        let cells = self.table.save_all(&self.storage)?;
        let accounts = self.accounts.save_all(&self.storage)?;
        self.updating.save_all(&self.storage)?;
        tracing::debug!(categories, cells, accounts, "ledger saved");
        Ok(())
    }
}
