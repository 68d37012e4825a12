//! Outbound clients for the payment networks supported by the gateway.
//!
//! Each client implements [`mpg_engine::PaymentProvider`]: it builds the payable payload for a new order, queries and
//! closes trades for the reconciliation poller, and authenticates the asynchronous notifications the network posts
//! back to us.
//!
//! Both networks sign with HMAC-SHA256 over a canonical string (see [`signing`]), keyed by per-account shared
//! secrets held in [`AlipayConfig`] and [`WechatPayConfig`].
mod alipay;
mod config;
mod helpers;
pub mod signing;
mod wechat;

pub use alipay::AlipayProvider;
pub use config::{AlipayConfig, WechatPayConfig, DEFAULT_PROVIDER_TIMEOUT};
pub use wechat::WechatPayProvider;
