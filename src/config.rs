//! Configuration: calculation settings, storage selection and the clock.
//!
//! The configuration file is JSON. Its default location is
//! `$XDG_CONFIG_HOME/fintable-rs/config.json`, overridable through the
//! `FINTABLE_CONFIG` environment variable.
//!
//! ```json
//! {
//!   "log_level": "info",
//!   "storage": { "kind": "file", "dir": "/home/me/.local/share/fintable-rs" },
//!   "settings": {
//!     "start_year": 2023,
//!     "start_month": 1,
//!     "start_money": 1000,
//!     "main_category_order": { "Expenses": 0, "Income": 1 }
//!   }
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{FinTableError, Result};
use crate::models::Period;

/// Application name used for the default config and data directories.
pub const APP_NAME: &str = "fintable-rs";
/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "FINTABLE_CONFIG";
/// Config file name inside the config directory.
const CONFIG_FILE: &str = "config.json";
/// Default main category whose cells are consumption.
const DEFAULT_EXPENSES: &str = "Expenses";
/// Default main category whose cells are income.
const DEFAULT_INCOME: &str = "Income";

/// Display order of the main categories: name to zero-based position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MainCategoryOrder(BTreeMap<String, usize>);

impl MainCategoryOrder {
    /// Builds an order from `(name, position)` pairs.
    #[inline]
    #[must_use]
    pub fn new<I, N>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, usize)>,
        N: Into<String>,
    {
        Self(
            entries
                .into_iter()
                .map(|(name, index)| (name.into(), index))
                .collect(),
        )
    }

    /// Position of `main_category`, or `None` if it is not configured.
    #[inline]
    #[must_use]
    pub fn index_of(&self, main_category: &str) -> Option<usize> {
        self.0.get(main_category).copied()
    }

    /// Number of configured main categories.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if no main category is configured.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Main category names sorted by position.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut entries: Vec<(&str, usize)> = self
            .0
            .iter()
            .map(|(name, index)| (name.as_str(), *index))
            .collect();
        entries.sort_by_key(|&(_, index)| index);
        entries.into_iter().map(|(name, _)| name).collect()
    }

    /// Checks that positions are exactly `0..len`.
    fn validate(&self) -> Result<()> {
        if self.0.is_empty() {
            return Err(FinTableError::Config(
                "main category order is empty".to_owned(),
            ));
        }
        let positions: BTreeSet<usize> = self.0.values().copied().collect();
        if positions.len() != self.0.len() || positions.iter().copied().ne(0..self.0.len()) {
            return Err(FinTableError::Config(
                "main category positions must be 0..n without gaps or repeats".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Settings consumed by the caches and the calculation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Year the balance chain starts in.
    pub start_year: i32,
    /// Month the balance chain starts in.
    pub start_month: u32,
    /// Opening balance of the start month.
    pub start_money: i64,
    /// Configured main categories and their display order.
    pub main_category_order: MainCategoryOrder,
    /// Main category whose cells count as consumption.
    #[serde(default = "default_expenses")]
    pub expenses: String,
    /// Main category whose cells count as income.
    #[serde(default = "default_income")]
    pub income: String,
}

/// Serde default for [`Settings::expenses`].
fn default_expenses() -> String {
    DEFAULT_EXPENSES.to_owned()
}

/// Serde default for [`Settings::income`].
fn default_income() -> String {
    DEFAULT_INCOME.to_owned()
}

impl Settings {
    /// Settings with the default `Expenses`/`Income` main categories.
    #[inline]
    #[must_use]
    pub fn new(start_year: i32, start_month: u32, start_money: i64) -> Self {
        Self {
            start_year,
            start_month,
            start_money,
            main_category_order: MainCategoryOrder::new([(DEFAULT_EXPENSES, 0), (DEFAULT_INCOME, 1)]),
            expenses: default_expenses(),
            income: default_income(),
        }
    }

    /// First period of the balance chain.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Validation`] if the start month is invalid.
    #[inline]
    pub fn start_period(&self) -> Result<Period> {
        Period::new(self.start_year, self.start_month)
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Config`] if the start month is out of range,
    /// the main category order is empty or has gaps, or the expenses and
    /// income main categories are missing from the order or identical.
    pub fn validate(&self) -> Result<()> {
        if self.start_period().is_err() {
            return Err(FinTableError::Config(format!(
                "start month must be 1..=12, got {}",
                self.start_month
            )));
        }
        self.main_category_order.validate()?;
        for (role, name) in [("expenses", &self.expenses), ("income", &self.income)] {
            if name.is_empty() {
                return Err(FinTableError::Config(format!(
                    "{role} main category is empty"
                )));
            }
            if self.main_category_order.index_of(name).is_none() {
                return Err(FinTableError::Config(format!(
                    "{role} main category {name:?} is not in the main category order"
                )));
            }
        }
        if self.expenses == self.income {
            return Err(FinTableError::Config(
                "expenses and income main categories must differ".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Persistence backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Flat CSV files in a directory.
    File {
        /// Directory holding the files.
        dir: PathBuf,
    },
    /// A SQLite database file.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// Volatile in-process storage.
    Memory,
}

impl StorageConfig {
    /// Checks that paths are present.
    fn validate(&self) -> Result<()> {
        match *self {
            Self::File { ref dir } if dir.as_os_str().is_empty() => Err(FinTableError::Config(
                "file storage directory is empty".to_owned(),
            )),
            Self::Sqlite { ref path } if path.as_os_str().is_empty() => Err(
                FinTableError::Config("sqlite database path is empty".to_owned()),
            ),
            Self::File { .. } | Self::Sqlite { .. } | Self::Memory => Ok(()),
        }
    }
}

/// Full application configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Default tracing filter directive, e.g. `"info"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Persistence backend.
    pub storage: StorageConfig,
    /// Calculation settings.
    pub settings: Settings,
}

/// Serde default for [`AppConfig::log_level`].
fn default_log_level() -> String {
    "info".to_owned()
}

impl AppConfig {
    /// Reads and validates a config file.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Config`] if the file cannot be read or fails
    /// validation, or [`FinTableError::Serialization`] if it is not valid
    /// JSON for this schema.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|err| {
            FinTableError::Config(format!("unable to read {}: {err}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Writes the config file as pretty JSON, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Config`] on I/O failure.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| {
                FinTableError::Config(format!("unable to create {}: {err}", parent.display()))
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|err| {
            FinTableError::Config(format!("unable to write {}: {err}", path.display()))
        })
    }

    /// Validates settings and storage selection.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Config`] describing the first problem found.
    #[inline]
    pub fn validate(&self) -> Result<()> {
        self.settings.validate()?;
        self.storage.validate()
    }

    /// Config path: `explicit` if given, else `$FINTABLE_CONFIG`, else the
    /// platform config directory.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Config`] if no platform config directory
    /// exists.
    pub fn resolve_path(explicit: Option<PathBuf>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV).filter(|value| !value.is_empty()) {
            return Ok(PathBuf::from(path));
        }
        dirs::config_dir()
            .map(|dir| dir.join(APP_NAME).join(CONFIG_FILE))
            .ok_or_else(|| {
                FinTableError::Config("could not determine platform config directory".to_owned())
            })
    }

    /// Default file storage directory under the platform data directory.
    ///
    /// # Errors
    ///
    /// Returns [`FinTableError::Config`] if no platform data directory
    /// exists.
    pub fn default_data_dir() -> Result<PathBuf> {
        dirs::data_dir()
            .map(|dir| dir.join(APP_NAME))
            .ok_or_else(|| {
                FinTableError::Config("could not determine platform data directory".to_owned())
            })
    }
}

/// Source of the current time, injected so calculations are testable.
pub trait Clock: core::fmt::Debug + Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Current calendar month, the last period of the balance chain.
    fn today(&self) -> Period;
}

/// Wall clock; the current month follows the local time zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    #[inline]
    fn today(&self) -> Period {
        Period::from_date(&Local::now())
    }
}

/// Clock frozen at a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    /// The instant reported by [`Clock::now`].
    now: DateTime<Utc>,
}

impl FixedClock {
    /// Creates a clock frozen at `now`.
    #[inline]
    #[must_use]
    pub const fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }

    /// Clock frozen at midnight UTC on the first day of `period`.
    #[inline]
    #[must_use]
    pub fn at(period: Period) -> Self {
        let now = chrono::NaiveDate::from_ymd_opt(period.year(), period.month(), 1)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map_or(DateTime::<Utc>::UNIX_EPOCH, |naive| naive.and_utc());
        Self { now }
    }
}

impl Clock for FixedClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        self.now
    }

    #[inline]
    fn today(&self) -> Period {
        Period::from_date(&self.now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> AppConfig {
        AppConfig {
            log_level: "debug".to_owned(),
            storage: StorageConfig::File {
                dir: PathBuf::from("/tmp/fintable"),
            },
            settings: Settings::new(2023, 1, 1_000),
        }
    }

    #[test]
    fn default_settings_are_valid() {
        let settings = Settings::new(2023, 1, 1_000);
        assert!(settings.validate().is_ok());
        assert_eq!(settings.start_period().unwrap(), Period::january(2023));
        assert_eq!(settings.main_category_order.names(), vec!["Expenses", "Income"]);
    }

    #[test]
    fn rejects_bad_start_month() {
        let settings = Settings::new(2023, 13, 0);
        assert!(matches!(settings.validate(), Err(FinTableError::Config(_))));
    }

    #[test]
    fn rejects_gaps_in_order() {
        let mut settings = Settings::new(2023, 1, 0);
        settings.main_category_order = MainCategoryOrder::new([("Expenses", 0), ("Income", 2)]);
        assert!(matches!(settings.validate(), Err(FinTableError::Config(_))));
    }

    #[test]
    fn rejects_missing_or_identical_roles() {
        let mut settings = Settings::new(2023, 1, 0);
        settings.income = "Salary".to_owned();
        assert!(settings.validate().is_err());

        let mut settings = Settings::new(2023, 1, 0);
        settings.income = settings.expenses.clone();
        assert!(settings.validate().is_err());

        let mut settings = Settings::new(2023, 1, 0);
        settings.main_category_order = MainCategoryOrder::default();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_empty_storage_path() {
        let mut config = sample_config();
        config.storage = StorageConfig::Sqlite {
            path: PathBuf::new(),
        };
        assert!(matches!(config.validate(), Err(FinTableError::Config(_))));
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        let config = sample_config();
        config.save(&path).unwrap();
        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn load_applies_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        fs::write(
            &path,
            r#"{
                "storage": { "kind": "memory" },
                "settings": {
                    "start_year": 2022,
                    "start_month": 6,
                    "start_money": 50,
                    "main_category_order": { "Expenses": 0, "Income": 1 }
                }
            }"#,
        )
        .unwrap();
        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.log_level, "info");
        assert_eq!(loaded.storage, StorageConfig::Memory);
        assert_eq!(loaded.settings.expenses, "Expenses");
        assert_eq!(loaded.settings.income, "Income");
    }

    #[test]
    fn load_missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = AppConfig::load(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(FinTableError::Config(_))));
    }

    #[test]
    fn explicit_path_wins() {
        let path = PathBuf::from("/etc/fintable.json");
        assert_eq!(AppConfig::resolve_path(Some(path.clone())).unwrap(), path);
    }

    #[test]
    fn fixed_clock_reports_its_month() {
        let clock = FixedClock::at(Period::new(2023, 3).unwrap());
        assert_eq!(clock.today(), Period::new(2023, 3).unwrap());
        assert_eq!(clock.now().timestamp(), 1_677_628_800);
    }
}
