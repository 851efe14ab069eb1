//! Domain types held by the caches.
//!
//! Records are plain owned values: caches hand out clones, never references
//! into their internal state.

mod account;
mod annual;
mod category;
mod cell;
mod ids;
mod keys;
mod period;

pub use account::{Account, AccountSums};
pub use annual::{AnnualResult, COLUMN_BALANCE, COLUMN_CONSUMPTION};
pub use category::Category;
pub use cell::Cell;
pub use ids::{AccountId, CategoryId, CellId};
pub use keys::{CategoryKey, CellKey, composite_category, composite_date, composite_id};
pub use period::{MONTHS_PER_YEAR, Period, PeriodRange};
