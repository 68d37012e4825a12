use chrono::{Duration, Utc};
use mpg_engine::{
    db_types::{OrderStatusType, PaymentMethod, ProductType},
    test_utils::TestHarness,
    traits::OrderManagement,
};

const DAY: i64 = 24 * 60;

#[tokio::test]
async fn only_old_closed_orders_are_purged() {
    let h = TestHarness::new().await;
    let product = h.product(999, 50, ProductType::Recharge).await;
    let mut orders = Vec::new();
    for name in ["old_closed", "recent_closed", "old_paid", "old_unpaid"] {
        let user = h.user(name).await;
        let order = h.issuance.issue_or_complete_order(user.id, product.id, PaymentMethod::Alipay).await.unwrap();
        orders.push(order);
    }
    let [old_closed, recent_closed, old_paid, old_unpaid] = <[_; 4]>::try_from(orders).unwrap();

    for order in [&old_closed, &recent_closed] {
        h.age_order(&order.order_no, 10).await;
        h.reconciliation.reconcile_order(&order.order_no).await.unwrap();
        assert_eq!(h.order(&order.order_no).await.status, OrderStatusType::Closed);
    }
    let note = h.alipay.notification(&old_paid.order_no, "ali-tx-1", old_paid.total, "SUCCESS");
    h.callbacks.process_notification(PaymentMethod::Alipay, &note).await.unwrap();

    h.age_order(&old_closed.order_no, 16 * DAY).await;
    h.age_order(&recent_closed.order_no, 10 * DAY).await;
    h.age_order(&old_paid.order_no, 30 * DAY).await;
    h.age_order(&old_unpaid.order_no, 30 * DAY).await;

    let deleted = h.reconciliation.purge_stale_orders().await.unwrap();
    assert_eq!(deleted, 1);
    assert!(h.db.fetch_order_by_order_no(&old_closed.order_no).await.unwrap().is_none());
    for order in [&recent_closed, &old_paid, &old_unpaid] {
        assert!(h.db.fetch_order_by_order_no(&order.order_no).await.unwrap().is_some());
    }
    // receipts survive with their orders
    assert!(h.db.fetch_payment_for_order(&old_paid.order_no).await.unwrap().is_some());

    assert_eq!(h.reconciliation.purge_stale_orders().await.unwrap(), 0);
    h.tear_down().await;
}

#[tokio::test]
async fn janitor_runs_are_exclusive() {
    let h = TestHarness::new().await;
    let guard = h.locks.try_acquire("janitor").await.unwrap();
    let err = h.reconciliation.purge_stale_orders().await.unwrap_err();
    assert!(err.is_busy());
    guard.release().await;
    assert_eq!(h.reconciliation.purge_stale_orders().await.unwrap(), 0);
    h.tear_down().await;
}

#[tokio::test]
async fn large_backlogs_are_purged_in_one_run() {
    const BACKLOG: i64 = 40_000;
    let h = TestHarness::new().await;
    let expired = Utc::now() - Duration::days(20);
    sqlx::query(
        r#"
        WITH RECURSIVE seq(n) AS (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < ?)
        INSERT INTO orders (order_no, user_id, product_id, pay_type, total, product_info, status, expiration_time,
                            created_at, updated_at)
        SELECT 'backlog_' || n, n, 1, 'WX', 999, '{}', 'CLOSED', ?, ?, ?
        FROM seq
        "#,
    )
    .bind(BACKLOG)
    .bind(expired)
    .bind(expired)
    .bind(expired)
    .execute(h.db.pool())
    .await
    .unwrap();
    let user = h.user("survivor").await;
    let product = h.product(999, 50, ProductType::Recharge).await;
    let live = h.issuance.issue_or_complete_order(user.id, product.id, PaymentMethod::Alipay).await.unwrap();

    let deleted = h.reconciliation.purge_stale_orders().await.unwrap();
    assert_eq!(deleted, BACKLOG as u64);
    assert!(h.db.fetch_order_by_order_no(&live.order_no).await.unwrap().is_some());
    assert_eq!(h.reconciliation.purge_stale_orders().await.unwrap(), 0);
    h.tear_down().await;
}
