use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::locks::LockError;

/// Takes the lease on `name` for `owner` if nobody holds it, or if the current lease expired before `now`.
/// Returns `true` if the lease was taken.
pub async fn try_acquire(
    name: &str,
    owner: &str,
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, LockError> {
    let result = sqlx::query(
        r#"
        INSERT INTO named_locks (name, owner, acquired_at, expires_at) VALUES (?, ?, ?, ?)
        ON CONFLICT (name) DO UPDATE SET
            owner = excluded.owner,
            acquired_at = excluded.acquired_at,
            expires_at = excluded.expires_at
        WHERE julianday(named_locks.expires_at) < julianday(excluded.acquired_at)
        "#,
    )
    .bind(name)
    .bind(owner)
    .bind(now)
    .bind(expires_at)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Moves the expiry of the lease on `name` to `expires_at`, but only if `owner` still holds it.
pub async fn renew(
    name: &str,
    owner: &str,
    expires_at: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, LockError> {
    let result = sqlx::query("UPDATE named_locks SET expires_at = ? WHERE name = ? AND owner = ?")
        .bind(expires_at)
        .bind(name)
        .bind(owner)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Drops the lease on `name`, but only if `owner` still holds it.
pub async fn release(name: &str, owner: &str, conn: &mut SqliteConnection) -> Result<bool, LockError> {
    let result = sqlx::query("DELETE FROM named_locks WHERE name = ? AND owner = ?")
        .bind(name)
        .bind(owner)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

pub async fn current_owner(name: &str, conn: &mut SqliteConnection) -> Result<Option<String>, LockError> {
    let owner =
        sqlx::query_scalar("SELECT owner FROM named_locks WHERE name = ?").bind(name).fetch_optional(conn).await?;
    Ok(owner)
}
