//! In-memory ledger engine for a monthly personal finance table.
//!
//! The whole dataset (grid values, categories, accounts) lives in
//! thread-safe caches loaded once from a pluggable [`storage::Storage`]
//! backend. A [`calculation::Calculator`] keeps per-month consumption and
//! a running balance chain up to date, and a [`ledger::Ledger`] ties it
//! all together for front ends.

extern crate alloc;

pub mod cache;
pub mod calculation;
pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod service;
pub mod storage;
#[cfg(feature = "worker")]
pub mod worker;

pub use error::{FinTableError, Result};
