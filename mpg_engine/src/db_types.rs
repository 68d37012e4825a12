use std::{fmt::Display, str::FromStr};

use chrono::{DateTime, Utc};
pub use mpg_common::MinorUnits;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("Invalid {kind}: {value}")]
pub struct ConversionError {
    kind: &'static str,
    value: String,
}

impl ConversionError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_string() }
    }
}

//--------------------------------------     OrderNo       ---------------------------------------------------------
/// The externally visible order number. Generated once at issuance and never reused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct OrderNo(pub String);

impl OrderNo {
    pub fn new<S: Into<String>>(s: S) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl Display for OrderNo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrderNo {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for OrderNo {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

//--------------------------------------   OrderStatusType     ---------------------------------------------------------
/// `NOT_PAID → {SUCCESS | CLOSED}`. Both `Success` and `Closed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatusType {
    /// The order has been issued and no payment has been applied yet.
    NotPaid,
    /// The payment was verified and the credit grant has been applied.
    Success,
    /// The order was closed without payment.
    Closed,
}

impl OrderStatusType {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrderStatusType::NotPaid)
    }
}

impl Display for OrderStatusType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatusType::NotPaid => write!(f, "NOT_PAID"),
            OrderStatusType::Success => write!(f, "SUCCESS"),
            OrderStatusType::Closed => write!(f, "CLOSED"),
        }
    }
}

impl FromStr for OrderStatusType {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_PAID" => Ok(Self::NotPaid),
            "SUCCESS" => Ok(Self::Success),
            "CLOSED" => Ok(Self::Closed),
            s => Err(ConversionError::new("order status", s)),
        }
    }
}

//--------------------------------------   PaymentMethod     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Type, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[sqlx(rename = "ALIPAY")]
    #[serde(rename = "ALIPAY")]
    Alipay,
    #[sqlx(rename = "WX")]
    #[serde(rename = "WX")]
    WechatPay,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 2] = [PaymentMethod::Alipay, PaymentMethod::WechatPay];

    pub fn tag(&self) -> &'static str {
        match self {
            PaymentMethod::Alipay => "ALIPAY",
            PaymentMethod::WechatPay => "WX",
        }
    }
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for PaymentMethod {
    type Err = ConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ALIPAY" => Ok(Self::Alipay),
            "WX" | "WECHAT" => Ok(Self::WechatPay),
            _ => Err(ConversionError::new("payment method", s)),
        }
    }
}

//--------------------------------------   ProductType     ---------------------------------------------------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductType {
    Vip,
    Recharge,
    /// Promotional top-up, limited to one purchase per user.
    RechargeActivity,
}

impl ProductType {
    pub fn is_single_purchase(&self) -> bool {
        matches!(self, ProductType::RechargeActivity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Type, Serialize, Deserialize)]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductStatus {
    Online,
    Offline,
}

//--------------------------------------     Product       ---------------------------------------------------------
/// A catalog entry, as supplied by the catalog collaborator at issuance time.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub total: MinorUnits,
    pub add_points: i64,
    pub product_type: ProductType,
    pub status: ProductStatus,
}

impl Product {
    pub fn is_online(&self) -> bool {
        self.status == ProductStatus::Online
    }
}

//--------------------------------------     Order       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub order_no: OrderNo,
    pub user_id: i64,
    pub product_id: i64,
    pub pay_type: PaymentMethod,
    pub total: MinorUnits,
    pub add_points: i64,
    /// JSON snapshot of the product at the time of issuance
    pub product_info: String,
    /// Redirect URL or QR payload from the payment network. `None` until the provider call succeeds.
    pub payment_payload: Option<String>,
    pub status: OrderStatusType,
    pub expiration_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_time <= now
    }

    /// The product as it was when the order was issued.
    pub fn product_snapshot(&self) -> Option<Product> {
        serde_json::from_str(&self.product_info).ok()
    }
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_no: OrderNo,
    pub user_id: i64,
    pub product_id: i64,
    pub pay_type: PaymentMethod,
    pub total: MinorUnits,
    pub add_points: i64,
    pub product_info: String,
    pub expiration_time: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl NewOrder {
    /// Snapshots `product` into a new, unpaid order.
    pub fn for_product(
        order_no: OrderNo,
        user_id: i64,
        product: &Product,
        pay_type: PaymentMethod,
        created_at: DateTime<Utc>,
        expiration_time: DateTime<Utc>,
    ) -> Result<Self, serde_json::Error> {
        let product_info = serde_json::to_string(product)?;
        Ok(Self {
            order_no,
            user_id,
            product_id: product.id,
            pay_type,
            total: product.total,
            add_points: product.add_points,
            product_info,
            expiration_time,
            created_at,
        })
    }
}

//--------------------------------------   PaymentRecord     ---------------------------------------------------------
/// Immutable receipt, written exactly once when an order transitions to `SUCCESS`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: i64,
    pub order_no: OrderNo,
    pub transaction_id: String,
    pub pay_type: PaymentMethod,
    pub total: MinorUnits,
    pub trade_state: String,
    pub payer: Option<String>,
    pub success_time: Option<DateTime<Utc>>,
    pub raw_notification: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaymentRecord {
    pub order_no: OrderNo,
    pub transaction_id: String,
    pub pay_type: PaymentMethod,
    pub total: MinorUnits,
    pub trade_state: String,
    pub payer: Option<String>,
    pub success_time: Option<DateTime<Utc>>,
    pub raw_notification: String,
}

//--------------------------------------  RechargeActivity   ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct RechargeActivity {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub order_no: OrderNo,
    pub created_at: DateTime<Utc>,
}

//--------------------------------------     UserAccount       ---------------------------------------------------------
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: i64,
    pub user_name: String,
    pub email: Option<String>,
    pub balance: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
