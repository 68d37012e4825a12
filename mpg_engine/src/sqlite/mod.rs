//! SQLite database module for the payment engine.
//!
//! [`SqliteDatabase`] implements every storage trait in [`crate::traits`]. The named-lock lease table lives in the
//! same database, so [`crate::locks::SqliteLockService`] can share the pool.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
