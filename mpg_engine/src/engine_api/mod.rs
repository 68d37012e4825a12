//! # Payment engine public API
//!
//! The `engine_api` module exposes the programmatic API for the payment engine. Each API is a thin struct over a
//! database backend, so callers can pick only the pieces they need.
//!
//! * [`issuance_api`] creates, or returns the existing, payable order for a (user, product, method) tuple.
//! * [`callback_api`] authenticates provider notifications and applies them exactly once.
//! * [`reconciliation_api`] polls providers for orders whose callback never arrived, and purges stale orders.
//! * [`order_query_api`] gives owners read access to their orders and receipts.
//! * [`settlement`] is the single state-transition path that both callbacks and reconciliation go through.
//!
//! # API usage
//!
//! ```rust,ignore
//! use mpg_engine::{NamedLocks, OrderIssuanceApi, ProviderRegistry, SqliteDatabase};
//! let db = SqliteDatabase::new_with_url(...).await?;
//! let api = OrderIssuanceApi::new(db, NamedLocks::in_memory(), registry, FlowConfig::default());
//! let order = api.issue_or_complete_order(user_id, product_id, PaymentMethod::Alipay).await?;
//! ```
pub mod callback_api;
pub mod config;
pub mod errors;
pub mod issuance_api;
pub mod order_objects;
pub mod order_query_api;
pub mod reconciliation_api;
pub mod settlement;
