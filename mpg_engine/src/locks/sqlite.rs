use async_trait::async_trait;
use chrono::{Duration, Utc};
use log::*;
use sqlx::SqlitePool;

use super::{LockError, NamedLockService};
use crate::sqlite::db::locks;

/// Cluster-wide locks backed by the `named_locks` lease table.
///
/// Guards renew their lease while they are held. A lease that is neither renewed nor released (crashed process, lost
/// connection) becomes available again once `lease` has elapsed.
#[derive(Debug, Clone)]
pub struct SqliteLockService {
    pool: SqlitePool,
    lease: Duration,
}

impl SqliteLockService {
    pub fn new(pool: SqlitePool, lease: Duration) -> Self {
        Self { pool, lease }
    }

    pub async fn current_owner(&self, name: &str) -> Result<Option<String>, LockError> {
        let mut conn = self.pool.acquire().await?;
        locks::current_owner(name, &mut conn).await
    }
}

#[async_trait]
impl NamedLockService for SqliteLockService {
    async fn try_lock(&self, name: &str, token: &str) -> Result<bool, LockError> {
        let mut conn = self.pool.acquire().await?;
        let now = Utc::now();
        locks::try_acquire(name, token, now, now + self.lease, &mut conn).await
    }

    async fn unlock(&self, name: &str, token: &str) -> Result<(), LockError> {
        let mut conn = self.pool.acquire().await?;
        if !locks::release(name, token, &mut conn).await? {
            warn!("🔒️ Lease on '{name}' had already been lost when it was released");
        }
        Ok(())
    }

    fn lease(&self) -> Option<std::time::Duration> {
        self.lease.to_std().ok()
    }

    async fn renew(&self, name: &str, token: &str) -> Result<bool, LockError> {
        let mut conn = self.pool.acquire().await?;
        locks::renew(name, token, Utc::now() + self.lease, &mut conn).await
    }

    fn unlock_detached(&self, name: &str, token: &str) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let pool = self.pool.clone();
                let name = name.to_string();
                let token = token.to_string();
                handle.spawn(async move {
                    let result = match pool.acquire().await {
                        Ok(mut conn) => locks::release(&name, &token, &mut conn).await.map(|_| ()),
                        Err(e) => Err(e.into()),
                    };
                    if let Err(e) = result {
                        warn!("🔒️ Could not release lease on '{name}': {e}. It will expire on its own.");
                    }
                });
            },
            Err(_) => warn!("🔒️ No runtime available to release lease on '{name}'. It will expire on its own."),
        }
    }
}
