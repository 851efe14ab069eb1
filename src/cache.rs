//! In-memory caches holding the whole dataset.
//!
//! Each cache owns its state behind a [`std::sync::Mutex`] and takes the
//! lock for the full duration of every public method, so every operation
//! is atomic with respect to the others on the same cache. No cache calls
//! into another while holding its own lock.

mod accounts;
mod calculation;
mod categories;
mod cells;

pub use accounts::{AccountCache, AccountDraft};
pub use calculation::CalculationCache;
pub use categories::CategoryCache;
pub use cells::CellCache;
