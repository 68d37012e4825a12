use chrono::{DateTime, Utc};
use log::trace;
use sqlx::SqliteConnection;

use crate::{db_types::UserAccount, traits::PaymentGatewayError};

pub async fn fetch_user_account(
    user_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<UserAccount>, PaymentGatewayError> {
    let account = sqlx::query_as::<_, UserAccount>(
        "SELECT id, user_name, email, balance, created_at, updated_at FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(conn)
    .await?;
    Ok(account)
}

/// Adds `points` to the user's balance and returns the updated account.
pub async fn credit_balance(
    user_id: i64,
    points: i64,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<UserAccount, PaymentGatewayError> {
    let account = sqlx::query_as::<_, UserAccount>(
        "UPDATE users SET balance = balance + ?, updated_at = ? WHERE id = ? RETURNING id, user_name, email, \
         balance, created_at, updated_at",
    )
    .bind(points)
    .bind(now)
    .bind(user_id)
    .fetch_optional(conn)
    .await?
    .ok_or(PaymentGatewayError::AccountNotFound(user_id))?;
    trace!("🗃️ User #{user_id} credited with {points} points. New balance: {}", account.balance);
    Ok(account)
}

pub async fn insert_user(
    user_name: &str,
    email: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<UserAccount, PaymentGatewayError> {
    let account = sqlx::query_as::<_, UserAccount>(
        "INSERT INTO users (user_name, email) VALUES (?, ?) RETURNING id, user_name, email, balance, created_at, \
         updated_at",
    )
    .bind(user_name)
    .bind(email)
    .fetch_one(conn)
    .await?;
    Ok(account)
}
