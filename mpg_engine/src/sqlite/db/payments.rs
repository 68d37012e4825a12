use log::debug;
use sqlx::SqliteConnection;

use crate::{
    db_types::{NewPaymentRecord, OrderNo, PaymentRecord},
    sqlite::db::is_unique_violation_on,
    traits::PaymentGatewayError,
};

const PAYMENT_COLUMNS: &str =
    "id, order_no, transaction_id, pay_type, total, trade_state, payer, success_time, raw_notification, created_at";

/// Writes the receipt for a successful order. Receipts are immutable, so there is no update counterpart.
pub async fn insert_payment_record(
    payment: NewPaymentRecord,
    conn: &mut SqliteConnection,
) -> Result<PaymentRecord, PaymentGatewayError> {
    let sql = format!(
        "INSERT INTO payment_records (order_no, transaction_id, pay_type, total, trade_state, payer, success_time, \
         raw_notification) VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {PAYMENT_COLUMNS}"
    );
    let result = sqlx::query_as::<_, PaymentRecord>(&sql)
        .bind(&payment.order_no)
        .bind(&payment.transaction_id)
        .bind(payment.pay_type)
        .bind(payment.total)
        .bind(&payment.trade_state)
        .bind(&payment.payer)
        .bind(payment.success_time)
        .bind(&payment.raw_notification)
        .fetch_one(conn)
        .await;
    match result {
        Ok(record) => {
            debug!("🗃️ Payment record {} saved for order {}", record.transaction_id, record.order_no);
            Ok(record)
        },
        Err(e) if is_unique_violation_on(&e, "payment_records.transaction_id") => {
            Err(PaymentGatewayError::PaymentAlreadyRecorded(payment.transaction_id))
        },
        Err(e) => Err(e.into()),
    }
}

pub async fn fetch_payment_for_order(
    order_no: &OrderNo,
    conn: &mut SqliteConnection,
) -> Result<Option<PaymentRecord>, PaymentGatewayError> {
    let sql = format!("SELECT {PAYMENT_COLUMNS} FROM payment_records WHERE order_no = ?");
    let record = sqlx::query_as::<_, PaymentRecord>(&sql).bind(order_no).fetch_optional(conn).await?;
    Ok(record)
}

pub async fn count_payments_for_order(
    order_no: &OrderNo,
    conn: &mut SqliteConnection,
) -> Result<i64, PaymentGatewayError> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM payment_records WHERE order_no = ?")
        .bind(order_no)
        .fetch_one(conn)
        .await?;
    Ok(count)
}
