use actix_web::{http::StatusCode, test::TestRequest};
use mpg_engine::{
    db_types::{OrderNo, OrderStatusType, PaymentMethod, ProductType},
    locks::lock_names,
    test_utils::TestHarness,
};
use serde_json::{json, Value};

use super::helpers::{configure_for, get_as, send_request};
use crate::helpers::USER_ID_HEADER;

fn issue_request(user_id: i64, product_id: i64, pay_type: &str) -> TestRequest {
    TestRequest::post()
        .uri("/api/orders")
        .insert_header((USER_ID_HEADER, user_id.to_string()))
        .set_json(json!({ "product_id": product_id, "pay_type": pay_type }))
}

#[actix_web::test]
async fn issue_returns_the_same_order_on_retry() {
    let _ = env_logger::try_init().ok();
    let h = TestHarness::new().await;
    let user = h.user("alice").await;
    let product = h.product(999, 50, ProductType::Recharge).await;

    let (status, body) = send_request(issue_request(user.id, product.id, "WX"), configure_for(&h)).await;
    assert_eq!(status, StatusCode::OK);
    let first: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(first["status"], "NOT_PAID");
    assert_eq!(first["pay_type"], "WX");
    assert_eq!(first["total"], 999);
    assert_eq!(first["amount"], "9.99");
    assert!(first["payment_payload"].as_str().unwrap().starts_with("mock://WX/pay/"));

    let (status, body) = send_request(issue_request(user.id, product.id, "WX"), configure_for(&h)).await;
    assert_eq!(status, StatusCode::OK);
    let second: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(first["order_no"], second["order_no"]);
    assert_eq!(h.wechat.create_calls(), 1);

    let order_no = OrderNo::from(first["order_no"].as_str().unwrap());
    let (status, body) = send_request(get_as(user.id, &format!("/api/orders/{order_no}")), configure_for(&h)).await;
    assert_eq!(status, StatusCode::OK);
    let detail: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(detail["order"]["order_no"], order_no.as_str());
    assert_eq!(detail["payment"], Value::Null);
    h.tear_down().await;
}

#[actix_web::test]
async fn issue_errors_map_to_statuses() {
    let _ = env_logger::try_init().ok();
    let h = TestHarness::new().await;
    let user = h.user("bob").await;
    let promo = h.product(100, 10, ProductType::RechargeActivity).await;

    let (status, _) = send_request(issue_request(user.id, promo.id, "PAYPAL"), configure_for(&h)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send_request(issue_request(user.id, 9999, "ALIPAY"), configure_for(&h)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("Product 9999 does not exist"));

    let req = TestRequest::post().uri("/api/orders").set_json(json!({ "product_id": promo.id, "pay_type": "WX" }));
    let (status, _) = send_request(req, configure_for(&h)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A single-purchase product cannot be bought twice, even through another payment method
    let (status, _) = send_request(issue_request(user.id, promo.id, "ALIPAY"), configure_for(&h)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send_request(issue_request(user.id, promo.id, "WX"), configure_for(&h)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body.contains("limited to one purchase per user"));
    h.tear_down().await;
}

#[actix_web::test]
async fn concurrent_issue_is_told_to_retry() {
    let _ = env_logger::try_init().ok();
    let h = TestHarness::new().await;
    let user = h.user("carol").await;
    let product = h.product(999, 50, ProductType::Recharge).await;
    let guard = h.locks.try_acquire(&lock_names::issue(user.id)).await.unwrap();
    let (status, body) = send_request(issue_request(user.id, product.id, "ALIPAY"), configure_for(&h)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body.contains("try again"));
    guard.release().await;

    let (status, body) = send_request(issue_request(user.id, product.id, "ALIPAY"), configure_for(&h)).await;
    assert_eq!(status, StatusCode::OK);
    let order: Value = serde_json::from_str(&body).unwrap();
    let order_no = OrderNo::from(order["order_no"].as_str().unwrap());
    assert_eq!(h.order(&order_no).await.status, OrderStatusType::NotPaid);
    assert_eq!(h.provider(PaymentMethod::Alipay).create_calls(), 1);
    h.tear_down().await;
}

#[actix_web::test]
async fn provider_outage_is_reported_as_unavailable() {
    let _ = env_logger::try_init().ok();
    let h = TestHarness::new().await;
    let user = h.user("dave").await;
    let product = h.product(999, 50, ProductType::Vip).await;
    h.alipay.fail_create(true);
    let (status, _) = send_request(issue_request(user.id, product.id, "ALIPAY"), configure_for(&h)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    h.alipay.fail_create(false);
    let (status, body) = send_request(issue_request(user.id, product.id, "ALIPAY"), configure_for(&h)).await;
    assert_eq!(status, StatusCode::OK);
    let order: Value = serde_json::from_str(&body).unwrap();
    assert!(order["payment_payload"].is_string());
    h.tear_down().await;
}
