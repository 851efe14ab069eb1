//! Orchestration services over the caches.
//!
//! Each service wraps one cache, validates input before any mutation and
//! pushes the cache contents to a [`crate::storage::Storage`] on save.
//! Services never hold a cache lock across calls; every cache method is
//! already atomic.

mod account;
mod category;
mod table;
mod updating;

pub use account::AccountService;
pub use category::CategoryService;
pub use table::TableService;
pub use updating::UpdatingService;
