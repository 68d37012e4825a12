//! # Marketplace payment gateway server
//!
//! This crate hosts the HTTP front end of the gateway. It is responsible for:
//! * Issuing payment orders to signed-in users, and letting them look at their own orders.
//! * Receiving asynchronous payment notifications from Alipay and WeChat Pay and handing them to the engine.
//! * Running the reconciliation pollers and the stale-order janitor on their schedules.
//! * Sending a receipt notification when an order is paid.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! * `/health`: A health check route that returns a 200 OK response.
//! * `POST /api/orders`: Issue (or resume) an order for a product.
//! * `GET /api/orders/{order_no}`: The caller's order.
//! * `GET /api/orders/{order_no}/payment`: The payment receipt for the caller's order.
//! * `POST /notify/{method}`: Asynchronous notifications from the payment networks.
//!
//! Authentication happens upstream. The gateway forwards the authenticated user id in the `X-User-Id` header.

pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod jobs;
pub mod notifications;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
