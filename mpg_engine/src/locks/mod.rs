//! # Named mutual exclusion
//!
//! Every mutation path in the engine (issuance, callback application, reconciliation, clean-up) is serialised by a
//! named lock built from a stable business identifier. See [`lock_names`] for the naming scheme.
//!
//! Locks are always taken with zero wait: if another operation holds the lock, [`NamedLocks::try_acquire`] fails
//! immediately with [`LockError::Busy`], which callers should treat as "try again", not as a fault.
//!
//! A successful acquisition returns a [`LockGuard`]. Call [`LockGuard::release`] when the critical section ends; if
//! the guard is dropped instead (early return, panic, cancelled future), it still releases the lock in the
//! background. On lease-based backends the guard also renews the lease for as long as it is held, so a long
//! reconciliation sweep keeps its job lock.
//!
//! Two backends are provided:
//! * [`InMemoryLockService`] for single-process deployments and tests,
//! * [`SqliteLockService`], a lease table shared by every process that uses the same database.
mod guard;
mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

use std::{future::Future, sync::Arc};

use async_trait::async_trait;
pub use guard::LockGuard;
use log::*;
pub use memory::InMemoryLockService;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteLockService;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum LockError {
    #[error("Lock '{0}' is held by another operation. Try again shortly.")]
    Busy(String),
    #[error("Lock backend error: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for LockError {
    fn from(e: sqlx::Error) -> Self {
        LockError::Backend(e.to_string())
    }
}

/// A backend that can hold named locks on behalf of owners identified by an opaque token.
#[async_trait]
pub trait NamedLockService: Send + Sync {
    /// Takes `name` for `token` without waiting. Returns `false` if somebody else holds it.
    async fn try_lock(&self, name: &str, token: &str) -> Result<bool, LockError>;

    /// Releases `name` if `token` still holds it.
    async fn unlock(&self, name: &str, token: &str) -> Result<(), LockError>;

    /// Releases `name` from a synchronous context such as `Drop`. Must not block.
    fn unlock_detached(&self, name: &str, token: &str);

    /// How long a lock survives without renewal. `None` for backends whose locks never expire.
    fn lease(&self) -> Option<std::time::Duration> {
        None
    }

    /// Pushes the expiry of `name` forward by one lease if `token` still holds it. Returns `false` if the lock has
    /// been lost.
    async fn renew(&self, _name: &str, _token: &str) -> Result<bool, LockError> {
        Ok(true)
    }
}

/// A cheap, cloneable handle to a [`NamedLockService`].
#[derive(Clone)]
pub struct NamedLocks {
    backend: Arc<dyn NamedLockService>,
}

impl NamedLocks {
    pub fn new<S: NamedLockService + 'static>(service: S) -> Self {
        Self { backend: Arc::new(service) }
    }

    pub fn from_arc(backend: Arc<dyn NamedLockService>) -> Self {
        Self { backend }
    }

    pub fn in_memory() -> Self {
        Self::new(InMemoryLockService::default())
    }

    /// Attempts to take the lock `name` with zero wait.
    pub async fn try_acquire(&self, name: &str) -> Result<LockGuard, LockError> {
        let token = new_token();
        if self.backend.try_lock(name, &token).await? {
            trace!("🔒️ Lock '{name}' acquired");
            Ok(LockGuard::new(Arc::clone(&self.backend), name.to_string(), token))
        } else {
            debug!("🔒️ Lock '{name}' is busy");
            Err(LockError::Busy(name.to_string()))
        }
    }

    /// Runs `f` while holding `name`. The lock is released whether `f` succeeds or fails.
    pub async fn with_lock<F, Fut, T, E>(&self, name: &str, f: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let guard = self.try_acquire(name).await?;
        let result = f().await;
        guard.release().await;
        result
    }
}

impl std::fmt::Debug for NamedLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NamedLocks")
    }
}

fn new_token() -> String {
    format!("{}-{:016x}", std::process::id(), rand::random::<u64>())
}

pub mod lock_names {
    use crate::db_types::{OrderNo, PaymentMethod};

    pub const JANITOR: &str = "janitor";

    pub fn issue(user_id: i64) -> String {
        format!("issue:{user_id}")
    }

    pub fn order(order_no: &OrderNo) -> String {
        format!("order:{order_no}")
    }

    pub fn reconcile(method: PaymentMethod) -> String {
        format!("reconcile:{method}")
    }
}
