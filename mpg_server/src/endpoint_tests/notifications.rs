use actix_web::{http::StatusCode, test::TestRequest};
use mpg_common::MinorUnits;
use mpg_engine::{
    db_types::{OrderStatusType, PaymentMethod, ProductType},
    test_utils::TestHarness,
    traits::RawNotification,
};

use super::helpers::{configure_for, get_as, send_request};

fn notify_request(path: &str, notification: &RawNotification) -> TestRequest {
    notification
        .headers
        .iter()
        .fold(TestRequest::post().uri(path), |req, (name, value)| req.insert_header((name.as_str(), value.as_str())))
        .set_payload(notification.body.clone())
}

#[actix_web::test]
async fn genuine_notification_is_applied_once() {
    let _ = env_logger::try_init().ok();
    let h = TestHarness::new().await;
    let user = h.user("alice").await;
    let product = h.product(999, 50, ProductType::Recharge).await;
    let order = h.issuance.issue_or_complete_order(user.id, product.id, PaymentMethod::Alipay).await.unwrap();
    let note = h.alipay.notification(&order.order_no, "ali-tx-1", order.total, "SUCCESS");

    for _ in 0..2 {
        let (status, body) = send_request(notify_request("/notify/ALIPAY", &note), configure_for(&h)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "success");
    }
    assert_eq!(h.order(&order.order_no).await.status, OrderStatusType::Success);
    assert_eq!(h.balance(user.id).await, 50);
    assert_eq!(h.db.count_payments_for_order(&order.order_no).await.unwrap(), 1);

    let path = format!("/api/orders/{}/payment", order.order_no);
    let (status, body) = send_request(get_as(user.id, &path), configure_for(&h)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains(r#""transaction_id":"ali-tx-1""#));
    h.tear_down().await;
}

#[actix_web::test]
async fn rejected_notifications_get_the_failure_ack() {
    let _ = env_logger::try_init().ok();
    let h = TestHarness::new().await;
    let user = h.user("bob").await;
    let product = h.product(999, 50, ProductType::Recharge).await;
    let order = h.issuance.issue_or_complete_order(user.id, product.id, PaymentMethod::Alipay).await.unwrap();

    let mut forged = h.alipay.notification(&order.order_no, "ali-tx-2", MinorUnits::from(1), "SUCCESS");
    let (status, body) = send_request(notify_request("/notify/ALIPAY", &forged), configure_for(&h)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "failure");

    forged.body = forged.body.replace("ali-tx-2", "ali-tx-3");
    let (status, body) = send_request(notify_request("/notify/ALIPAY", &forged), configure_for(&h)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, "failure");

    // Delivered to the wrong endpoint
    let note = h.alipay.notification(&order.order_no, "ali-tx-4", order.total, "SUCCESS");
    let (status, _) = send_request(notify_request("/notify/WX", &note), configure_for(&h)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(h.order(&order.order_no).await.status, OrderStatusType::NotPaid);
    assert_eq!(h.balance(user.id).await, 0);
    h.tear_down().await;
}

#[actix_web::test]
async fn unknown_payment_method() {
    let _ = env_logger::try_init().ok();
    let h = TestHarness::new().await;
    let note = RawNotification::new("{}".to_string());
    let (status, body) = send_request(notify_request("/notify/PAYPAL", &note), configure_for(&h)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.contains("Unknown payment method PAYPAL"));
    h.tear_down().await;
}
