//! Marketplace Payment Engine
//!
//! The engine owns the lifecycle of payment orders: it issues at most one payable order per (user, product, payment
//! method), applies asynchronous provider callbacks exactly once, and reconciles orders whose callback never arrives
//! by polling the provider. It is provider-agnostic; concrete payment networks plug in through the
//! [`PaymentProvider`] strategy trait and are looked up in a [`ProviderRegistry`].
//!
//! The library is divided into these main sections:
//! 1. Storage ([`traits`] and the SQLite backend). You should never need to access the database directly. Instead,
//!    use the public API. The exception is the data types used in the database, which live in [`db_types`].
//! 2. Named locks ([`locks`]). Every mutation path is serialised by a lock named after a stable business identifier.
//! 3. The public API ([`engine_api`]): issuance, callback application, reconciliation and order queries.
//!
//! The engine also emits events (e.g. [`events::OrderPaidEvent`]) that can be subscribed to through
//! [`events::EventHooks`]. Handlers run out of band and can never fail the transition that triggered them.
pub mod db_types;
pub mod engine_api;
pub mod events;
pub mod helpers;
pub mod locks;
mod provider_registry;
#[cfg(feature = "sqlite")]
mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use engine_api::{
    callback_api::PaymentCallbackApi,
    config::FlowConfig,
    errors::OrderFlowError,
    issuance_api::OrderIssuanceApi,
    order_objects,
    order_query_api::OrderQueryApi,
    reconciliation_api::ReconciliationApi,
    settlement::OrderSettlement,
};
pub use locks::{LockError, LockGuard, NamedLocks};
pub use provider_registry::ProviderRegistry;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    AccountManagement,
    OrderManagement,
    PaymentGatewayDatabase,
    PaymentGatewayError,
    PaymentProvider,
    ProductCatalog,
};
