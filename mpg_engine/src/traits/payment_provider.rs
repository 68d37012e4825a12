use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mpg_common::MinorUnits;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{NewPaymentRecord, Order, OrderNo, PaymentMethod};

/// What the engine hands a payment network when it needs a payable payload for an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderOrderRequest {
    pub order_no: OrderNo,
    pub subject: String,
    pub total: MinorUnits,
    pub expires_at: DateTime<Utc>,
}

impl ProviderOrderRequest {
    pub fn for_order(order: &Order, subject: &str) -> Self {
        Self {
            order_no: order.order_no.clone(),
            subject: subject.to_string(),
            total: order.total,
            expires_at: order.expiration_time,
        }
    }
}

/// The payment network's view of a trade, normalised across providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    /// The provider has no record of the order. The user never reached checkout.
    NotFound,
    NotPaid,
    Closed,
    /// Money moved unconditionally.
    Success,
    /// The provider is still deciding (user paying, refund in progress...). Leave the order alone.
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderTradeQuery {
    pub status: TradeStatus,
    /// The provider's own state string, e.g. `TRADE_SUCCESS` or `NOTPAY`
    pub trade_state: String,
    pub transaction_id: Option<String>,
    pub total: Option<MinorUnits>,
    pub payer: Option<String>,
    pub success_time: Option<DateTime<Utc>>,
    pub raw: String,
}

impl ProviderTradeQuery {
    pub fn not_found(raw: String) -> Self {
        Self {
            status: TradeStatus::NotFound,
            trade_state: "NOT_FOUND".to_string(),
            transaction_id: None,
            total: None,
            payer: None,
            success_time: None,
            raw,
        }
    }
}

/// An inbound asynchronous notification, exactly as received. Header names are lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawNotification {
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl RawNotification {
    pub fn new(body: String) -> Self {
        Self { headers: HashMap::new(), body }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(|s| s.as_str())
    }
}

/// A notification whose signature has been checked. The business fields have not been cross-checked yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedNotification {
    pub order_no: OrderNo,
    pub transaction_id: String,
    pub total: MinorUnits,
    pub merchant_id: String,
    pub trade_status: TradeStatus,
    pub trade_state: String,
    pub payer: Option<String>,
    pub success_time: Option<DateTime<Utc>>,
    pub raw: String,
}

impl VerifiedNotification {
    pub fn payment_record(&self, method: PaymentMethod) -> NewPaymentRecord {
        NewPaymentRecord {
            order_no: self.order_no.clone(),
            transaction_id: self.transaction_id.clone(),
            pay_type: method,
            total: self.total,
            trade_state: self.trade_state.clone(),
            payer: self.payer.clone(),
            success_time: self.success_time,
            raw_notification: self.raw.clone(),
        }
    }
}

/// The provider-specific reply to a callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackAck {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The outcome of the call is unknown. Treat it as "try again next pass".
    #[error("Payment provider call timed out: {0}")]
    Timeout(String),
    #[error("Could not reach the payment provider: {0}")]
    Network(String),
    #[error("Payment provider rejected the request. {code}: {message}")]
    Api { code: String, message: String },
    #[error("Could not understand the payment provider response: {0}")]
    MalformedResponse(String),
    #[error("Payment provider is misconfigured: {0}")]
    Configuration(String),
    #[error("No payment provider is registered for {0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, Error)]
pub enum CallbackError {
    #[error("Notification signature is invalid: {0}")]
    InvalidSignature(String),
    #[error("Notification is malformed: {0}")]
    Malformed(String),
    #[error("Notification is stale or replayed: {0}")]
    Replay(String),
    #[error("Notification refers to unknown order {0}")]
    UnknownOrder(OrderNo),
    #[error("Notified amount {actual} for order {order_no} does not match the order total {expected}")]
    AmountMismatch { order_no: OrderNo, expected: MinorUnits, actual: MinorUnits },
    #[error("Notification is for merchant {actual}, but this deployment is {expected}")]
    MerchantMismatch { expected: String, actual: String },
    #[error("Trade for order {order_no} is not successful ({state})")]
    TradeNotSuccessful { order_no: OrderNo, state: String },
    #[error("Notification for order {order_no} was sent to the {received} endpoint, but the order uses {expected}")]
    MethodMismatch { order_no: OrderNo, expected: PaymentMethod, received: PaymentMethod },
}

/// A payment network strategy. One implementation per [`PaymentMethod`], registered once at start-up.
///
/// Implementations receive their account configuration at construction and hold no other state, so a single
/// instance can serve concurrent requests.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn method(&self) -> PaymentMethod;

    /// The merchant / app identity that notifications for this deployment must carry.
    fn merchant_identity(&self) -> &str;

    /// Obtains the redirect URL or QR payload the client uses to pay.
    async fn create_payment(&self, request: &ProviderOrderRequest) -> Result<String, ProviderError>;

    async fn query_order(&self, order_no: &OrderNo) -> Result<ProviderTradeQuery, ProviderError>;

    /// Best-effort cancellation on the provider side.
    async fn close_order(&self, order_no: &OrderNo) -> Result<(), ProviderError>;

    /// Authenticates an inbound notification and extracts its business fields.
    fn verify_notification(&self, notification: &RawNotification) -> Result<VerifiedNotification, CallbackError>;

    /// The reply the provider expects. Anything other than the success form makes it re-deliver later.
    fn acknowledgement(&self, accepted: bool, reason: Option<&str>) -> CallbackAck;
}
