use std::{sync::Arc, time::Duration};

use log::*;
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use super::NamedLockService;

const MIN_RENEW_PERIOD: Duration = Duration::from_millis(10);

/// Proof that the named lock is held. Releases the lock when dropped.
pub struct LockGuard {
    backend: Arc<dyn NamedLockService>,
    name: String,
    token: String,
    keep_alive: Option<JoinHandle<()>>,
    released: bool,
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("name", &self.name)
            .field("released", &self.released)
            .finish_non_exhaustive()
    }
}

impl LockGuard {
    pub(super) fn new(backend: Arc<dyn NamedLockService>, name: String, token: String) -> Self {
        let keep_alive = backend.lease().map(|lease| {
            keep_lease_alive(Arc::clone(&backend), name.clone(), token.clone(), lease)
        });
        Self { backend, name, token, keep_alive, released: false }
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Releases the lock and waits for the backend to confirm. Failures are logged; a lease-based backend will
    /// expire the lock on its own.
    pub async fn release(mut self) {
        self.released = true;
        self.stop_renewing();
        match self.backend.unlock(&self.name, &self.token).await {
            Ok(()) => trace!("🔒️ Lock '{}' released", self.name),
            Err(e) => warn!("🔒️ Could not release lock '{}': {e}", self.name),
        }
    }

    fn stop_renewing(&mut self) {
        if let Some(task) = self.keep_alive.take() {
            task.abort();
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.stop_renewing();
        if !self.released {
            trace!("🔒️ Lock '{}' released on drop", self.name);
            self.backend.unlock_detached(&self.name, &self.token);
        }
    }
}

/// Renews the lease three times per lease period until the task is aborted or the lease is lost.
fn keep_lease_alive(
    backend: Arc<dyn NamedLockService>,
    name: String,
    token: String,
    lease: Duration,
) -> JoinHandle<()> {
    let period = (lease / 3).max(MIN_RENEW_PERIOD);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match backend.renew(&name, &token).await {
                Ok(true) => trace!("🔒️ Lease on '{name}' renewed"),
                Ok(false) => {
                    warn!("🔒️ Lease on '{name}' was lost before it could be renewed");
                    break;
                },
                Err(e) => warn!("🔒️ Could not renew lease on '{name}': {e}. Retrying in {period:?}"),
            }
        }
    })
}
