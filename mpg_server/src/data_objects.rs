use chrono::{DateTime, Utc};
use mpg_common::MinorUnits;
use mpg_engine::{
    db_types::{Order, OrderNo, OrderStatusType, PaymentMethod, PaymentRecord},
    order_objects::OrderWithPayment,
};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/orders`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrderRequest {
    pub product_id: i64,
    pub pay_type: PaymentMethod,
}

/// The client-facing view of an order. The product snapshot and internal ids are not exposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order_no: OrderNo,
    pub product_id: i64,
    pub product_name: Option<String>,
    pub pay_type: PaymentMethod,
    pub total: MinorUnits,
    /// The total in major units, e.g. `"9.99"`
    pub amount: String,
    pub add_points: i64,
    pub status: OrderStatusType,
    /// Redirect URL or QR code content to hand to the payment network.
    pub payment_payload: Option<String>,
    pub expiration_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        let product_name = order.product_snapshot().map(|p| p.name);
        Self {
            order_no: order.order_no,
            product_id: order.product_id,
            product_name,
            pay_type: order.pay_type,
            amount: order.total.to_major_string(),
            total: order.total,
            add_points: order.add_points,
            status: order.status,
            payment_payload: order.payment_payload,
            expiration_time: order.expiration_time,
            created_at: order.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResponse {
    pub order_no: OrderNo,
    pub transaction_id: String,
    pub pay_type: PaymentMethod,
    pub total: MinorUnits,
    pub amount: String,
    pub trade_state: String,
    pub success_time: Option<DateTime<Utc>>,
}

impl From<PaymentRecord> for PaymentResponse {
    fn from(p: PaymentRecord) -> Self {
        Self {
            order_no: p.order_no,
            transaction_id: p.transaction_id,
            pay_type: p.pay_type,
            amount: p.total.to_major_string(),
            total: p.total,
            trade_state: p.trade_state,
            success_time: p.success_time.or(Some(p.created_at)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetailResponse {
    pub order: OrderResponse,
    pub payment: Option<PaymentResponse>,
}

impl From<OrderWithPayment> for OrderDetailResponse {
    fn from(value: OrderWithPayment) -> Self {
        Self { order: value.order.into(), payment: value.payment.map(PaymentResponse::from) }
    }
}

/// Sent to the receipt webhook when an order is paid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub order_no: OrderNo,
    pub user_id: i64,
    pub user_name: String,
    pub email: Option<String>,
    pub product_name: String,
    pub amount: String,
    pub add_points: i64,
    pub transaction_id: String,
}
