use thiserror::Error;

use crate::{
    db_types::{OrderNo, PaymentMethod},
    locks::LockError,
    traits::{CallbackError, PaymentGatewayError, ProviderError},
};

#[derive(Debug, Clone, Error)]
pub enum OrderFlowError {
    #[error("{0}")]
    Lock(#[from] LockError),
    #[error("Product {0} does not exist")]
    ProductNotFound(i64),
    #[error("Product {0} is not available for purchase")]
    ProductNotAvailable(i64),
    #[error("User {user_id} has already purchased product {product_id}, which is limited to one purchase per user")]
    DuplicatePurchase { user_id: i64, product_id: i64 },
    #[error("Order {0} has expired and is waiting to be reconciled. Try again shortly.")]
    OrderPendingReconciliation(OrderNo),
    #[error("User {0} does not exist")]
    UserNotFound(i64),
    #[error("Order {0} does not exist")]
    OrderNotFound(OrderNo),
    #[error("No payment provider is configured for {0}")]
    UnsupportedPaymentMethod(PaymentMethod),
    #[error("{0}")]
    Provider(#[from] ProviderError),
    #[error("{0}")]
    Callback(#[from] CallbackError),
    #[error("{0}")]
    Database(#[from] PaymentGatewayError),
}

impl OrderFlowError {
    /// True for transient conditions that the caller can resolve by trying again later.
    pub fn is_retryable(&self) -> bool {
        match self {
            OrderFlowError::Lock(LockError::Busy(_)) => true,
            OrderFlowError::Lock(LockError::Backend(_)) => true,
            OrderFlowError::OrderPendingReconciliation(_) => true,
            OrderFlowError::Provider(ProviderError::Timeout(_) | ProviderError::Network(_)) => true,
            OrderFlowError::Database(PaymentGatewayError::DatabaseError(_)) => true,
            _ => false,
        }
    }

    /// True if another operation holds the lock this call needed.
    pub fn is_busy(&self) -> bool {
        matches!(self, OrderFlowError::Lock(LockError::Busy(_)) | OrderFlowError::OrderPendingReconciliation(_))
    }
}
