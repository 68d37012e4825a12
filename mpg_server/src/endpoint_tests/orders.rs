use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use chrono::{TimeZone, Utc};
use mpg_common::MinorUnits;
use mpg_engine::{
    db_types::{Order, OrderNo, OrderStatusType, PaymentMethod, PaymentRecord},
    OrderQueryApi,
};

use super::helpers::{get_as, send_request};
use crate::{
    endpoint_tests::mocks::MockOrderManager,
    routes::{MyOrderRoute, MyPaymentRoute},
};

#[actix_web::test]
async fn fetch_order_without_user_header() {
    let _ = env_logger::try_init().ok();
    let req = TestRequest::get().uri("/api/orders/order_0001");
    let (status, body) = send_request(req, configure).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, r#"{"error":"The request is not authenticated. Missing X-User-Id header"}"#);
}

#[actix_web::test]
async fn fetch_my_paid_order() {
    let _ = env_logger::try_init().ok();
    let (status, body) = send_request(get_as(7, "/api/orders/order_0001"), configure).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, PAID_ORDER_JSON);
}

#[actix_web::test]
async fn fetch_someone_elses_order() {
    let _ = env_logger::try_init().ok();
    let (status, body) = send_request(get_as(8, "/api/orders/order_0001"), configure).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"The data was not found. Order order_0001 does not exist"}"#);
}

#[actix_web::test]
async fn fetch_unknown_order() {
    let _ = env_logger::try_init().ok();
    let (status, _) = send_request(get_as(7, "/api/orders/order_9999"), configure).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn fetch_my_payment() {
    let _ = env_logger::try_init().ok();
    let (status, body) = send_request(get_as(7, "/api/orders/order_0001/payment"), configure).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, PAYMENT_JSON);
}

#[actix_web::test]
async fn fetch_payment_for_unpaid_order() {
    let _ = env_logger::try_init().ok();
    let (status, body) = send_request(get_as(7, "/api/orders/order_0002/payment"), configure).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, r#"{"error":"The data was not found. Order order_0002 has not been paid"}"#);
}

fn configure(cfg: &mut ServiceConfig) {
    let mut order_manager = MockOrderManager::new();
    order_manager.expect_fetch_order_by_order_no().returning(|no| {
        let order = match no.as_str() {
            "order_0001" => Some(order(1, "order_0001", OrderStatusType::Success)),
            "order_0002" => Some(order(2, "order_0002", OrderStatusType::NotPaid)),
            _ => None,
        };
        Ok(order)
    });
    order_manager.expect_fetch_payment_for_order().returning(|no| {
        let payment = (no.as_str() == "order_0001").then(payment);
        Ok(payment)
    });
    let api = OrderQueryApi::new(order_manager);
    cfg.service(
        web::scope("/api")
            .service(MyPaymentRoute::<MockOrderManager>::new())
            .service(MyOrderRoute::<MockOrderManager>::new()),
    )
    .app_data(web::Data::new(api));
}

fn order(id: i64, order_no: &str, status: OrderStatusType) -> Order {
    Order {
        id,
        order_no: OrderNo::from(order_no),
        user_id: 7,
        product_id: 3,
        pay_type: PaymentMethod::WechatPay,
        total: MinorUnits::from(999),
        add_points: 50,
        product_info: r#"{"id":3,"name":"Gold pack","description":"","total":999,"add_points":50,"product_type":"RECHARGE","status":"ONLINE"}"#.to_string(),
        payment_payload: Some("weixin://wxpay/bizpayurl?pr=abc".to_string()),
        status,
        expiration_time: Utc.with_ymd_and_hms(2024, 3, 15, 18, 35, 0).unwrap(),
        created_at: Utc.with_ymd_and_hms(2024, 3, 15, 18, 30, 0).unwrap(),
        updated_at: Utc.with_ymd_and_hms(2024, 3, 15, 18, 31, 0).unwrap(),
    }
}

fn payment() -> PaymentRecord {
    PaymentRecord {
        id: 1,
        order_no: OrderNo::from("order_0001"),
        transaction_id: "4200001".to_string(),
        pay_type: PaymentMethod::WechatPay,
        total: MinorUnits::from(999),
        trade_state: "SUCCESS".to_string(),
        payer: Some("o-payer".to_string()),
        success_time: Some(Utc.with_ymd_and_hms(2024, 3, 15, 18, 31, 0).unwrap()),
        raw_notification: "{}".to_string(),
        created_at: Utc.with_ymd_and_hms(2024, 3, 15, 18, 31, 1).unwrap(),
    }
}

const PAID_ORDER_JSON: &str = r#"{"order":{"order_no":"order_0001","product_id":3,"product_name":"Gold pack","pay_type":"WX","total":999,"amount":"9.99","add_points":50,"status":"SUCCESS","payment_payload":"weixin://wxpay/bizpayurl?pr=abc","expiration_time":"2024-03-15T18:35:00Z","created_at":"2024-03-15T18:30:00Z"},"payment":{"order_no":"order_0001","transaction_id":"4200001","pay_type":"WX","total":999,"amount":"9.99","trade_state":"SUCCESS","success_time":"2024-03-15T18:31:00Z"}}"#;

const PAYMENT_JSON: &str = r#"{"order_no":"order_0001","transaction_id":"4200001","pay_type":"WX","total":999,"amount":"9.99","trade_state":"SUCCESS","success_time":"2024-03-15T18:31:00Z"}"#;
