//! Request handler definitions
//!
//! Define each route and it handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! Every handler is asynchronous. Database access and payment network calls are futures, so a handler waiting on
//! them never blocks its worker thread.
use std::str::FromStr;

use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use log::*;
use mpg_engine::{
    db_types::{OrderNo, PaymentMethod},
    traits::{OrderManagement, PaymentGatewayDatabase},
    OrderFlowError,
    OrderIssuanceApi,
    OrderQueryApi,
    PaymentCallbackApi,
};

use crate::{
    config::ServerConfig,
    data_objects::{NewOrderRequest, OrderDetailResponse, OrderResponse, PaymentResponse},
    errors::ServerError,
    helpers::{get_remote_ip, raw_notification, UserId},
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Orders  ----------------------------------------------------
route!(issue_order => Post "/orders" impl PaymentGatewayDatabase);
/// Route handler for order issuance.
///
/// Returns the caller's payable order for the product and payment method, creating it if necessary. Calling this
/// again for the same product and method returns the same order, so clients can retry safely.
///
/// * A concurrent request from the same user gets `429 Too Many Requests` and should be retried.
/// * An order that has expired but has not been reconciled yet also gets `429`.
/// * Buying a single-purchase product twice gets `409 Conflict`.
pub async fn issue_order<B: PaymentGatewayDatabase>(
    user: UserId,
    body: web::Json<NewOrderRequest>,
    api: web::Data<OrderIssuanceApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let NewOrderRequest { product_id, pay_type } = body.into_inner();
    debug!("💻️ Order request from user {} for product {product_id} via {pay_type}", user.0);
    let order = api.issue_or_complete_order(user.0, product_id, pay_type).await.map_err(|e| {
        debug!("💻️ Could not issue order for user {}. {e}", user.0);
        ServerError::from(e)
    })?;
    Ok(HttpResponse::Ok().json(OrderResponse::from(order)))
}

route!(my_order => Get "/orders/{order_no}" impl OrderManagement);
pub async fn my_order<B: OrderManagement>(
    user: UserId,
    path: web::Path<String>,
    api: web::Data<OrderQueryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_no = OrderNo::from(path.into_inner());
    trace!("💻️ User {} requested order {order_no}", user.0);
    let detail = api.order_with_payment(user.0, &order_no).await?;
    Ok(HttpResponse::Ok().json(OrderDetailResponse::from(detail)))
}

route!(my_payment => Get "/orders/{order_no}/payment" impl OrderManagement);
pub async fn my_payment<B: OrderManagement>(
    user: UserId,
    path: web::Path<String>,
    api: web::Data<OrderQueryApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_no = OrderNo::from(path.into_inner());
    trace!("💻️ User {} requested the payment for order {order_no}", user.0);
    let payment = api
        .payment_for_user(user.0, &order_no)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Order {order_no} has not been paid")))?;
    Ok(HttpResponse::Ok().json(PaymentResponse::from(payment)))
}

//----------------------------------------------   Notifications  ----------------------------------------------------
route!(payment_notification => Post "/notify/{method}" impl PaymentGatewayDatabase);
/// Route handler for asynchronous payment notifications.
///
/// The body is handed to the payment network's strategy untouched. The reply is whatever that network expects:
/// the success acknowledgement is only sent once the payment has been committed, so any other reply makes the
/// network deliver the notification again later.
pub async fn payment_notification<B: PaymentGatewayDatabase>(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    config: web::Data<ServerConfig>,
    api: web::Data<PaymentCallbackApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let tag = path.into_inner();
    let method = PaymentMethod::from_str(&tag).map_err(|_| {
        warn!("💻️ Notification received for unknown payment method '{tag}'");
        ServerError::NoRecordFound(format!("Unknown payment method {tag}"))
    })?;
    let peer = get_remote_ip(&req, config.use_x_forwarded_for);
    info!("💻️ {method} notification received from {}", peer.map(|ip| ip.to_string()).unwrap_or("unknown".into()));
    let notification = raw_notification(&req, &body);
    let ack = api.handle_notification(method, &notification).await.map_err(|e| match e {
        OrderFlowError::UnsupportedPaymentMethod(m) => {
            warn!("💻️ Notification received for {m}, but no provider is configured for it");
            ServerError::NoRecordFound(format!("Unknown payment method {m}"))
        },
        e => ServerError::from(e),
    })?;
    let status = actix_web::http::StatusCode::from_u16(ack.status)
        .map_err(|e| ServerError::BackendError(format!("Invalid acknowledgement status. {e}")))?;
    Ok(HttpResponse::build(status).content_type(ack.content_type).body(ack.body))
}
