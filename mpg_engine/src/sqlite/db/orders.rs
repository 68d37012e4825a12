use chrono::{DateTime, Utc};
use log::{debug, trace};
use sqlx::{QueryBuilder, SqliteConnection};

use crate::{
    db_types::{NewOrder, Order, OrderNo, OrderStatusType},
    order_objects::OrderQueryFilter,
    sqlite::db::is_unique_violation_on,
    traits::PaymentGatewayError,
};

const ORDER_COLUMNS: &str = "id, order_no, user_id, product_id, pay_type, total, add_points, product_info, \
                             payment_payload, status, expiration_time, created_at, updated_at";

/// Inserts a new order into the database using the given connection. This is not atomic. You can embed this call
/// inside a transaction if you need to ensure atomicity, and pass `&mut *tx` as the connection argument.
pub async fn insert_order(order: NewOrder, conn: &mut SqliteConnection) -> Result<Order, PaymentGatewayError> {
    let sql = format!(
        "INSERT INTO orders (order_no, user_id, product_id, pay_type, total, add_points, product_info, status, \
         expiration_time, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, 'NOT_PAID', ?, ?, ?) RETURNING \
         {ORDER_COLUMNS}"
    );
    let result = sqlx::query_as::<_, Order>(&sql)
        .bind(&order.order_no)
        .bind(order.user_id)
        .bind(order.product_id)
        .bind(order.pay_type)
        .bind(order.total)
        .bind(order.add_points)
        .bind(&order.product_info)
        .bind(order.expiration_time)
        .bind(order.created_at)
        .bind(order.created_at)
        .fetch_one(conn)
        .await;
    match result {
        Ok(order) => {
            debug!("🗃️ Order {} has been saved in the DB with id {}", order.order_no, order.id);
            Ok(order)
        },
        Err(e) if is_unique_violation_on(&e, "orders.order_no") => {
            Err(PaymentGatewayError::OrderAlreadyExists(order.order_no))
        },
        Err(e) if is_unique_violation_on(&e, "orders.user_id") => Err(PaymentGatewayError::UnpaidOrderExists {
            user_id: order.user_id,
            product_id: order.product_id,
            pay_type: order.pay_type.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_order_by_order_no(
    order_no: &OrderNo,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, PaymentGatewayError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE order_no = ?");
    let order = sqlx::query_as::<_, Order>(&sql).bind(order_no).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, PaymentGatewayError> {
    let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = ?");
    let order = sqlx::query_as::<_, Order>(&sql).bind(id).fetch_optional(conn).await?;
    Ok(order)
}

/// Fetches orders according to criteria specified in the `OrderQueryFilter`
///
/// Resulting orders are ordered by `created_at` in ascending order
pub async fn search_orders(
    query: OrderQueryFilter,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, PaymentGatewayError> {
    let mut builder = QueryBuilder::new(format!("SELECT {ORDER_COLUMNS} FROM orders "));
    if !query.is_empty() {
        builder.push("WHERE ");
    }
    let mut where_clause = builder.separated(" AND ");
    if let Some(order_no) = query.order_no {
        where_clause.push("order_no = ");
        where_clause.push_bind_unseparated(order_no);
    }
    if let Some(user_id) = query.user_id {
        where_clause.push("user_id = ");
        where_clause.push_bind_unseparated(user_id);
    }
    if let Some(product_id) = query.product_id {
        where_clause.push("product_id = ");
        where_clause.push_bind_unseparated(product_id);
    }
    if let Some(pay_type) = query.pay_type {
        where_clause.push("pay_type = ");
        where_clause.push_bind_unseparated(pay_type);
    }
    if !query.statuses.is_empty() {
        let statuses = query.statuses.iter().map(|s| format!("'{s}'")).collect::<Vec<String>>().join(",");
        where_clause.push(format!("status IN ({statuses})"));
    }
    if let Some(cutoff) = query.created_before {
        where_clause.push("julianday(created_at) <= julianday(");
        where_clause.push_bind_unseparated(cutoff);
        where_clause.push_unseparated(")");
    }
    if let Some(cutoff) = query.expired_before {
        where_clause.push("julianday(expiration_time) <= julianday(");
        where_clause.push_bind_unseparated(cutoff);
        where_clause.push_unseparated(")");
    }
    builder.push(" ORDER BY created_at ASC, id ASC");

    trace!("🗃️ Executing query: {}", builder.sql());
    let orders = builder.build_query_as::<Order>().fetch_all(conn).await?;
    trace!("🗃️ Result of search_orders: {:?}", orders.len());
    Ok(orders)
}

/// Sets the payment payload on a `NOT_PAID` order. Returns `None` if no `NOT_PAID` order has that number.
pub async fn set_payment_payload(
    order_no: &OrderNo,
    payload: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, PaymentGatewayError> {
    let sql = format!(
        "UPDATE orders SET payment_payload = ?, updated_at = ? WHERE order_no = ? AND status = 'NOT_PAID' RETURNING \
         {ORDER_COLUMNS}"
    );
    let order =
        sqlx::query_as::<_, Order>(&sql).bind(payload).bind(now).bind(order_no).fetch_optional(conn).await?;
    Ok(order)
}

/// Conditionally moves an order from `from` to `to`. Returns the updated order, or `None` if the order was not in
/// the `from` state (or does not exist).
pub async fn transition_status(
    order_no: &OrderNo,
    from: OrderStatusType,
    to: OrderStatusType,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, PaymentGatewayError> {
    let sql = format!(
        "UPDATE orders SET status = ?, updated_at = ? WHERE order_no = ? AND status = ? RETURNING {ORDER_COLUMNS}"
    );
    let order =
        sqlx::query_as::<_, Order>(&sql).bind(to).bind(now).bind(order_no).bind(from).fetch_optional(conn).await?;
    if let Some(o) = &order {
        trace!("🗃️ Order {} moved from {from} to {to}", o.order_no);
    }
    Ok(order)
}

/// True if the user has an order for the product that is either payable or paid.
pub async fn has_live_order(
    user_id: i64,
    product_id: i64,
    conn: &mut SqliteConnection,
) -> Result<bool, PaymentGatewayError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM orders WHERE user_id = ? AND product_id = ? AND status IN ('NOT_PAID', 'SUCCESS')",
    )
    .bind(user_id)
    .bind(product_id)
    .fetch_one(conn)
    .await?;
    Ok(count > 0)
}

/// Deletes every `CLOSED` order whose expiration time is at or before `cutoff`, in a single statement.
pub async fn delete_closed_orders_expired_before(
    cutoff: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<u64, PaymentGatewayError> {
    let result = sqlx::query(
        "DELETE FROM orders WHERE status = 'CLOSED' AND julianday(expiration_time) <= julianday(?)",
    )
    .bind(cutoff)
    .execute(conn)
    .await?;
    debug!("🗃️ Deleted {} closed orders that expired before {cutoff}", result.rows_affected());
    Ok(result.rows_affected())
}
