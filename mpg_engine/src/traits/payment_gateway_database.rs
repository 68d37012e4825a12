use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    db_types::{NewOrder, NewPaymentRecord, Order, OrderNo, OrderStatusType},
    traits::{AccountManagement, ApplyPaymentResult, CloseOrderResult, OrderManagement, ProductCatalog},
};

/// This trait defines the highest level of behaviour for backends supporting the payment engine: the order ledger.
///
/// The ledger holds no business rules of its own. Every method here assumes the caller already holds the named lock
/// that serialises access to the affected user or order. Status changes are nevertheless written as conditional
/// updates, so that a caller that ignores the lock can never move an order out of a terminal state.
#[allow(async_fn_in_trait)]
pub trait PaymentGatewayDatabase: Clone + OrderManagement + AccountManagement + ProductCatalog {
    /// The URL of the database
    fn url(&self) -> &str;

    /// Stores a brand-new `NOT_PAID` order and returns it.
    ///
    /// Fails with [`PaymentGatewayError::OrderAlreadyExists`] if the order number is taken, and with
    /// [`PaymentGatewayError::UnpaidOrderExists`] if the (user, product, method) tuple already has a payable order.
    async fn insert_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError>;

    /// Records the redirect URL / QR payload returned by the payment network for a `NOT_PAID` order.
    async fn set_payment_payload(&self, order_no: &OrderNo, payload: &str) -> Result<Order, PaymentGatewayError>;

    /// Moves an order from `NOT_PAID` to `CLOSED`.
    ///
    /// Closing an already closed order is a no-op. Closing a `SUCCESS` order is rejected with
    /// [`PaymentGatewayError::InvalidStatusTransition`].
    async fn close_order(&self, order_no: &OrderNo) -> Result<CloseOrderResult, PaymentGatewayError>;

    /// Applies a verified payment in a single atomic transaction:
    /// * the order moves from `NOT_PAID` to `SUCCESS`,
    /// * the owner's balance is credited by the order's `add_points`,
    /// * the payment record is written,
    /// * a recharge-activity entry is written if the order is for a single-purchase product.
    ///
    /// If the order is already `SUCCESS`, nothing is written and [`ApplyPaymentResult::AlreadyApplied`] is returned.
    /// A `CLOSED` order is rejected with [`PaymentGatewayError::InvalidStatusTransition`].
    async fn apply_payment(
        &self,
        order_no: &OrderNo,
        payment: NewPaymentRecord,
    ) -> Result<ApplyPaymentResult, PaymentGatewayError>;

    /// True if the user has a `NOT_PAID` or `SUCCESS` order for the product, or a recorded recharge-activity entry
    /// for it.
    async fn has_blocking_purchase(&self, user_id: i64, product_id: i64) -> Result<bool, PaymentGatewayError>;

    /// Deletes every `CLOSED` order whose expiration time is at or before `cutoff`. Orders in any other state are
    /// never touched. Returns the number of rows removed.
    async fn delete_closed_orders_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, PaymentGatewayError>;

    /// Closes the underlying connection pool.
    async fn close(&mut self) -> Result<(), PaymentGatewayError>;
}

#[derive(Debug, Clone, Error)]
pub enum PaymentGatewayError {
    #[error("We have an internal database engine (configuration/uptime etc.) : {0}")]
    DatabaseError(String),
    #[error("Cannot insert order, since order number {0} is already taken")]
    OrderAlreadyExists(OrderNo),
    #[error("User {user_id} already has an unpaid order for product {product_id} via {pay_type}")]
    UnpaidOrderExists { user_id: i64, product_id: i64, pay_type: String },
    #[error("The requested order {0} does not exist")]
    OrderNotFound(OrderNo),
    #[error("Order {order_no} cannot move from {from} to {to}")]
    InvalidStatusTransition { order_no: OrderNo, from: OrderStatusType, to: OrderStatusType },
    #[error("Transaction {0} has already been recorded against a different order")]
    PaymentAlreadyRecorded(String),
    #[error("The requested account id {0} does not exist")]
    AccountNotFound(i64),
    #[error("Could not (de)serialize ledger data: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for PaymentGatewayError {
    fn from(e: sqlx::Error) -> Self {
        PaymentGatewayError::DatabaseError(e.to_string())
    }
}

impl From<serde_json::Error> for PaymentGatewayError {
    fn from(e: serde_json::Error) -> Self {
        PaymentGatewayError::SerializationError(e.to_string())
    }
}
