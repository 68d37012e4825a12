use futures_util::future::join_all;
use mpg_common::MinorUnits;
use mpg_engine::{
    db_types::{Order, OrderStatusType, PaymentMethod, ProductType},
    test_utils::TestHarness,
    traits::{ApplyPaymentResult, CallbackError, OrderManagement, RawNotification},
    OrderFlowError,
    PaymentGatewayError,
};

async fn issue(h: &TestHarness, user_id: i64, product_type: ProductType, method: PaymentMethod) -> Order {
    let product = h.product(999, 50, product_type).await;
    h.issuance.issue_or_complete_order(user_id, product.id, method).await.unwrap()
}

#[tokio::test]
async fn genuine_callback_is_applied_exactly_once() {
    let h = TestHarness::new().await;
    let user = h.user("alice").await;
    let order = issue(&h, user.id, ProductType::Recharge, PaymentMethod::WechatPay).await;

    // same order, wrong amount
    let forged = h.wechat.notification(&order.order_no, "wx-tx-1", MinorUnits::from(1), "SUCCESS");
    let ack = h.callbacks.handle_notification(PaymentMethod::WechatPay, &forged).await.unwrap();
    assert_eq!(ack.status, 400);
    assert_eq!(h.order(&order.order_no).await.status, OrderStatusType::NotPaid);
    assert_eq!(h.balance(user.id).await, 0);

    let genuine = h.wechat.notification(&order.order_no, "wx-tx-1", order.total, "SUCCESS");
    let ack = h.callbacks.handle_notification(PaymentMethod::WechatPay, &genuine).await.unwrap();
    assert_eq!(ack.status, 200);
    assert_eq!(ack.body, "success");
    let paid = h.order(&order.order_no).await;
    assert_eq!(paid.status, OrderStatusType::Success);
    assert!(paid.updated_at >= order.updated_at);
    assert_eq!(h.balance(user.id).await, 50);

    let receipt = h.db.fetch_payment_for_order(&order.order_no).await.unwrap().unwrap();
    assert_eq!(receipt.transaction_id, "wx-tx-1");
    assert_eq!(receipt.total, order.total);
    assert_eq!(receipt.pay_type, PaymentMethod::WechatPay);

    // replay
    let ack = h.callbacks.handle_notification(PaymentMethod::WechatPay, &genuine).await.unwrap();
    assert_eq!(ack.status, 200);
    let result = h.callbacks.process_notification(PaymentMethod::WechatPay, &genuine).await.unwrap();
    assert!(matches!(result, ApplyPaymentResult::AlreadyApplied(_)));
    assert_eq!(h.balance(user.id).await, 50);
    assert_eq!(h.db.count_payments_for_order(&order.order_no).await.unwrap(), 1);
    // no activity entry for ordinary recharges
    assert!(h.db.fetch_recharge_activities(user.id).await.unwrap().is_empty());
    h.tear_down().await;
}

#[tokio::test]
async fn tampered_notifications_are_rejected() {
    let h = TestHarness::new().await;
    let user = h.user("bob").await;
    let order = issue(&h, user.id, ProductType::Recharge, PaymentMethod::Alipay).await;
    let genuine = h.alipay.notification(&order.order_no, "ali-tx-1", order.total, "SUCCESS");
    let signature = genuine.header("x-mock-signature").unwrap().to_string();
    let tampered_body = genuine.body.replace("ali-tx-1", "ali-tx-2");
    let tampered = RawNotification::new(tampered_body).with_header("x-mock-signature", &signature);

    let err = h.callbacks.process_notification(PaymentMethod::Alipay, &tampered).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Callback(CallbackError::InvalidSignature(_))), "{err}");

    let unsigned = RawNotification::new(genuine.body.clone());
    let ack = h.callbacks.handle_notification(PaymentMethod::Alipay, &unsigned).await.unwrap();
    assert_eq!(ack.status, 400);
    assert_eq!(h.order(&order.order_no).await.status, OrderStatusType::NotPaid);
    assert_eq!(h.balance(user.id).await, 0);
    h.tear_down().await;
}

#[tokio::test]
async fn business_field_mismatches_are_rejected() {
    let h = TestHarness::new().await;
    let user = h.user("carol").await;
    let order = issue(&h, user.id, ProductType::Recharge, PaymentMethod::Alipay).await;

    let unknown = h.alipay.notification(&"order_00000000000000000000".into(), "tx", order.total, "SUCCESS");
    let err = h.callbacks.process_notification(PaymentMethod::Alipay, &unknown).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Callback(CallbackError::UnknownOrder(_))), "{err}");

    let waiting = h.alipay.notification(&order.order_no, "tx", order.total, "WAIT_BUYER_PAY");
    let err = h.callbacks.process_notification(PaymentMethod::Alipay, &waiting).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Callback(CallbackError::TradeNotSuccessful { .. })), "{err}");

    // a wechat notification for an alipay order
    let wrong_method = h.wechat.notification(&order.order_no, "tx", order.total, "SUCCESS");
    let err = h.callbacks.process_notification(PaymentMethod::WechatPay, &wrong_method).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Callback(CallbackError::MethodMismatch { .. })), "{err}");

    assert_eq!(h.order(&order.order_no).await.status, OrderStatusType::NotPaid);
    assert!(h.db.fetch_payment_for_order(&order.order_no).await.unwrap().is_none());
    h.tear_down().await;
}

#[tokio::test]
async fn callbacks_for_closed_orders_are_refused() {
    let h = TestHarness::new().await;
    let user = h.user("dave").await;
    let order = issue(&h, user.id, ProductType::Recharge, PaymentMethod::Alipay).await;
    h.age_order(&order.order_no, 10).await;
    let report = h.reconciliation.reconcile_method(PaymentMethod::Alipay).await.unwrap();
    assert_eq!(report.closed.len(), 1);

    let late = h.alipay.notification(&order.order_no, "tx-late", order.total, "SUCCESS");
    let err = h.callbacks.process_notification(PaymentMethod::Alipay, &late).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Database(PaymentGatewayError::InvalidStatusTransition { .. })), "{err}");
    let ack = h.callbacks.handle_notification(PaymentMethod::Alipay, &late).await.unwrap();
    assert_eq!(ack.status, 400);
    assert_eq!(h.order(&order.order_no).await.status, OrderStatusType::Closed);
    assert_eq!(h.balance(user.id).await, 0);
    h.tear_down().await;
}

#[tokio::test]
async fn single_purchase_payment_records_activity() {
    let h = TestHarness::new().await;
    let user = h.user("erin").await;
    let order = issue(&h, user.id, ProductType::RechargeActivity, PaymentMethod::WechatPay).await;
    let note = h.wechat.notification(&order.order_no, "wx-tx-9", order.total, "SUCCESS");
    let result = h.callbacks.process_notification(PaymentMethod::WechatPay, &note).await.unwrap();
    match result {
        ApplyPaymentResult::Applied { order, account } => {
            assert_eq!(order.status, OrderStatusType::Success);
            assert_eq!(account.balance, 50);
        },
        other => panic!("Expected a new payment, got {other:?}"),
    }
    let activities = h.db.fetch_recharge_activities(user.id).await.unwrap();
    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0].order_no, order.order_no);
    h.tear_down().await;
}

#[tokio::test]
async fn concurrent_duplicate_callbacks_credit_once() {
    let h = TestHarness::new().await;
    let user = h.user("frank").await;
    let order = issue(&h, user.id, ProductType::Vip, PaymentMethod::Alipay).await;
    let note = h.alipay.notification(&order.order_no, "ali-tx-7", order.total, "SUCCESS");
    let acks = join_all((0..4).map(|_| h.callbacks.handle_notification(PaymentMethod::Alipay, &note))).await;
    let accepted = acks.into_iter().map(|a| a.unwrap()).filter(|a| a.status == 200).count();
    assert!(accepted >= 1);
    assert_eq!(h.balance(user.id).await, 50);
    assert_eq!(h.db.count_payments_for_order(&order.order_no).await.unwrap(), 1);

    // a redelivery after the race is acknowledged
    let ack = h.callbacks.handle_notification(PaymentMethod::Alipay, &note).await.unwrap();
    assert_eq!(ack.status, 200);
    h.tear_down().await;
}

#[tokio::test]
async fn callback_is_deferred_while_the_order_is_locked() {
    let h = TestHarness::new().await;
    let user = h.user("grace").await;
    let order = issue(&h, user.id, ProductType::Recharge, PaymentMethod::WechatPay).await;
    let guard = h.locks.try_acquire(&format!("order:{}", order.order_no)).await.unwrap();
    let note = h.wechat.notification(&order.order_no, "wx-tx-3", order.total, "SUCCESS");
    let ack = h.callbacks.handle_notification(PaymentMethod::WechatPay, &note).await.unwrap();
    assert_eq!(ack.status, 400);
    assert_eq!(h.order(&order.order_no).await.status, OrderStatusType::NotPaid);
    guard.release().await;

    let ack = h.callbacks.handle_notification(PaymentMethod::WechatPay, &note).await.unwrap();
    assert_eq!(ack.status, 200);
    assert_eq!(h.balance(user.id).await, 50);
    h.tear_down().await;
}

#[tokio::test]
async fn order_queries_are_scoped_to_the_owner() {
    let h = TestHarness::new().await;
    let owner = h.user("heidi").await;
    let other = h.user("ivan").await;
    let order = issue(&h, owner.id, ProductType::Recharge, PaymentMethod::Alipay).await;

    let seen = h.queries.order_with_payment(owner.id, &order.order_no).await.unwrap();
    assert_eq!(seen.order.order_no, order.order_no);
    assert!(seen.payment.is_none());
    let err = h.queries.order_for_user(other.id, &order.order_no).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::OrderNotFound(_)));

    let note = h.alipay.notification(&order.order_no, "ali-tx-5", order.total, "SUCCESS");
    h.callbacks.process_notification(PaymentMethod::Alipay, &note).await.unwrap();
    let payment = h.queries.payment_for_user(owner.id, &order.order_no).await.unwrap().unwrap();
    assert_eq!(payment.transaction_id, "ali-tx-5");
    h.tear_down().await;
}
