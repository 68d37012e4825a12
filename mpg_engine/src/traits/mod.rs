//! # Engine backend contracts
//!
//! The engine never talks to a database or a payment network directly. It goes through the traits defined here.
//!
//! * [`PaymentGatewayDatabase`] is the order ledger: conditional status transitions, the atomic apply step and bulk
//!   clean-up. It is the only trait that mutates state.
//! * [`OrderManagement`] provides read access to orders and payment records.
//! * [`AccountManagement`] and [`ProductCatalog`] give read access to the user and catalog collaborators.
//! * [`PaymentProvider`] is the strategy interface for a single payment network (create, query, close, verify
//!   callbacks, acknowledge).
mod account_management;
mod data_objects;
mod order_management;
mod payment_gateway_database;
mod payment_provider;
mod product_catalog;

pub use account_management::AccountManagement;
pub use data_objects::{ApplyPaymentResult, CloseOrderResult};
pub use order_management::OrderManagement;
pub use payment_gateway_database::{PaymentGatewayDatabase, PaymentGatewayError};
pub use payment_provider::{
    CallbackAck,
    CallbackError,
    PaymentProvider,
    ProviderError,
    ProviderOrderRequest,
    ProviderTradeQuery,
    RawNotification,
    TradeStatus,
    VerifiedNotification,
};
pub use product_catalog::ProductCatalog;
