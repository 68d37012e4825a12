use log::trace;
use sqlx::SqliteConnection;

use crate::{
    db_types::{OrderNo, RechargeActivity},
    traits::PaymentGatewayError,
};

pub async fn insert_recharge_activity(
    user_id: i64,
    product_id: i64,
    order_no: &OrderNo,
    conn: &mut SqliteConnection,
) -> Result<RechargeActivity, PaymentGatewayError> {
    let activity = sqlx::query_as::<_, RechargeActivity>(
        "INSERT INTO recharge_activities (user_id, product_id, order_no) VALUES (?, ?, ?) RETURNING id, user_id, \
         product_id, order_no, created_at",
    )
    .bind(user_id)
    .bind(product_id)
    .bind(order_no)
    .fetch_one(conn)
    .await?;
    trace!("🗃️ Recharge activity recorded for user #{user_id}, product #{product_id}");
    Ok(activity)
}

pub async fn activity_exists(
    user_id: i64,
    product_id: i64,
    conn: &mut SqliteConnection,
) -> Result<bool, PaymentGatewayError> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM recharge_activities WHERE user_id = ? AND product_id = ?")
            .bind(user_id)
            .bind(product_id)
            .fetch_one(conn)
            .await?;
    Ok(count > 0)
}

pub async fn fetch_activities_for_user(
    user_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<RechargeActivity>, PaymentGatewayError> {
    let activities = sqlx::query_as::<_, RechargeActivity>(
        "SELECT id, user_id, product_id, order_no, created_at FROM recharge_activities WHERE user_id = ? ORDER BY id",
    )
    .bind(user_id)
    .fetch_all(conn)
    .await?;
    Ok(activities)
}
