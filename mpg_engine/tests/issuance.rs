use futures_util::future::join_all;
use mpg_common::MinorUnits;
use mpg_engine::{
    db_types::{OrderStatusType, PaymentMethod, ProductStatus, ProductType},
    order_objects::OrderQueryFilter,
    test_utils::TestHarness,
    traits::{OrderManagement, ProviderError},
    OrderFlowError,
};

#[tokio::test]
async fn reissue_returns_the_same_order() {
    let h = TestHarness::new().await;
    let user = h.user("alice").await;
    let product = h.product(999, 50, ProductType::Recharge).await;
    let first = h.issuance.issue_or_complete_order(user.id, product.id, PaymentMethod::Alipay).await.unwrap();
    assert_eq!(first.status, OrderStatusType::NotPaid);
    assert_eq!(first.total, MinorUnits::from(999));
    assert_eq!(first.add_points, 50);
    assert!(first.payment_payload.as_deref().unwrap().starts_with("mock://ALIPAY/pay/order_"));
    assert!(first.expiration_time > first.created_at);

    let second = h.issuance.issue_or_complete_order(user.id, product.id, PaymentMethod::Alipay).await.unwrap();
    assert_eq!(first.order_no, second.order_no);
    assert_eq!(h.alipay.create_calls(), 1);

    // a different method is a different tuple
    let wx = h.issuance.issue_or_complete_order(user.id, product.id, PaymentMethod::WechatPay).await.unwrap();
    assert_ne!(wx.order_no, first.order_no);
    h.tear_down().await;
}

#[tokio::test]
async fn concurrent_issuance_creates_one_order() {
    let h = TestHarness::new().await;
    let user = h.user("bob").await;
    let product = h.product(999, 50, ProductType::Vip).await;
    let calls = (0..8).map(|_| h.issuance.issue_or_complete_order(user.id, product.id, PaymentMethod::WechatPay));
    let results = join_all(calls).await;
    let mut issued = Vec::new();
    for result in results {
        match result {
            Ok(order) => issued.push(order.order_no),
            Err(e) => assert!(e.is_busy(), "unexpected error: {e}"),
        }
    }
    assert!(!issued.is_empty());
    assert!(issued.iter().all(|o| *o == issued[0]));

    let query = OrderQueryFilter::default()
        .with_user_id(user.id)
        .with_product_id(product.id)
        .with_status(OrderStatusType::NotPaid);
    let rows = h.db.search_orders(query).await.unwrap();
    assert_eq!(rows.len(), 1);

    let again = h.issuance.issue_or_complete_order(user.id, product.id, PaymentMethod::WechatPay).await.unwrap();
    assert_eq!(again.order_no, issued[0]);
    h.tear_down().await;
}

#[tokio::test]
async fn single_purchase_products_are_limited() {
    let h = TestHarness::new().await;
    let user = h.user("carol").await;
    let promo = h.product(100, 500, ProductType::RechargeActivity).await;
    let order = h.issuance.issue_or_complete_order(user.id, promo.id, PaymentMethod::Alipay).await.unwrap();

    // a pending order via another method blocks a second purchase
    let err = h.issuance.issue_or_complete_order(user.id, promo.id, PaymentMethod::WechatPay).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::DuplicatePurchase { .. }), "{err}");

    let note = h.alipay.notification(&order.order_no, "tx-carol", order.total, "SUCCESS");
    h.callbacks.process_notification(PaymentMethod::Alipay, &note).await.unwrap();
    let activities = h.db.fetch_recharge_activities(user.id).await.unwrap();
    assert_eq!(activities.len(), 1);
    assert_eq!(activities[0].order_no, order.order_no);

    let err = h.issuance.issue_or_complete_order(user.id, promo.id, PaymentMethod::Alipay).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::DuplicatePurchase { .. }), "{err}");

    // other users are unaffected
    let dave = h.user("dave").await;
    assert!(h.issuance.issue_or_complete_order(dave.id, promo.id, PaymentMethod::Alipay).await.is_ok());
    h.tear_down().await;
}

#[tokio::test]
async fn unavailable_products_and_users() {
    let h = TestHarness::new().await;
    let user = h.user("erin").await;
    let offline = h
        .db
        .insert_product("Retired", MinorUnits::from(500), 10, ProductType::Recharge, ProductStatus::Offline)
        .await
        .unwrap();
    let err = h.issuance.issue_or_complete_order(user.id, offline.id, PaymentMethod::Alipay).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::ProductNotAvailable(id) if id == offline.id));

    let err = h.issuance.issue_or_complete_order(user.id, 9999, PaymentMethod::Alipay).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::ProductNotFound(9999)));

    let product = h.product(500, 10, ProductType::Recharge).await;
    let err = h.issuance.issue_or_complete_order(4242, product.id, PaymentMethod::Alipay).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::UserNotFound(4242)));
    h.tear_down().await;
}

#[tokio::test]
async fn provider_failure_leaves_an_unpaid_order() {
    let h = TestHarness::new().await;
    let user = h.user("frank").await;
    let product = h.product(999, 50, ProductType::Recharge).await;
    h.alipay.fail_create(true);
    let err = h.issuance.issue_or_complete_order(user.id, product.id, PaymentMethod::Alipay).await.unwrap_err();
    assert!(matches!(err, OrderFlowError::Provider(ProviderError::Network(_))));
    assert!(err.is_retryable());

    let orphan = h.db.fetch_unpaid_order(user.id, product.id, PaymentMethod::Alipay).await.unwrap().unwrap();
    assert!(orphan.payment_payload.is_none());

    h.alipay.fail_create(false);
    let order = h.issuance.issue_or_complete_order(user.id, product.id, PaymentMethod::Alipay).await.unwrap();
    assert_eq!(order.order_no, orphan.order_no);
    assert!(order.payment_payload.is_some());
    h.tear_down().await;
}

#[tokio::test]
async fn expired_orders_must_be_reconciled_first() {
    let h = TestHarness::new().await;
    let user = h.user("grace").await;
    let product = h.product(999, 50, ProductType::Recharge).await;
    let order = h.issuance.issue_or_complete_order(user.id, product.id, PaymentMethod::Alipay).await.unwrap();
    h.age_order(&order.order_no, 10).await;

    let err = h.issuance.issue_or_complete_order(user.id, product.id, PaymentMethod::Alipay).await.unwrap_err();
    assert!(matches!(&err, OrderFlowError::OrderPendingReconciliation(o) if *o == order.order_no));
    assert!(err.is_retryable());

    let report = h.reconciliation.reconcile_method(PaymentMethod::Alipay).await.unwrap();
    assert_eq!(report.closed, vec![order.order_no.clone()]);

    let fresh = h.issuance.issue_or_complete_order(user.id, product.id, PaymentMethod::Alipay).await.unwrap();
    assert_ne!(fresh.order_no, order.order_no);
    h.tear_down().await;
}

#[tokio::test]
async fn issuance_is_busy_while_the_user_lock_is_held() {
    let h = TestHarness::new().await;
    let user = h.user("heidi").await;
    let product = h.product(999, 50, ProductType::Recharge).await;
    let guard = h.locks.try_acquire(&format!("issue:{}", user.id)).await.unwrap();
    let err = h.issuance.issue_or_complete_order(user.id, product.id, PaymentMethod::Alipay).await.unwrap_err();
    assert!(err.is_busy());
    guard.release().await;
    assert!(h.issuance.issue_or_complete_order(user.id, product.id, PaymentMethod::Alipay).await.is_ok());
    h.tear_down().await;
}
