use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};

use super::{LockError, NamedLockService};

/// Process-local lock table.
#[derive(Debug, Default)]
pub struct InMemoryLockService {
    locks: DashMap<String, String>,
}

impl InMemoryLockService {
    pub fn is_locked(&self, name: &str) -> bool {
        self.locks.contains_key(name)
    }

    fn remove(&self, name: &str, token: &str) {
        self.locks.remove_if(name, |_, holder| holder == token);
    }
}

#[async_trait]
impl NamedLockService for InMemoryLockService {
    async fn try_lock(&self, name: &str, token: &str) -> Result<bool, LockError> {
        match self.locks.entry(name.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(token.to_string());
                Ok(true)
            },
        }
    }

    async fn unlock(&self, name: &str, token: &str) -> Result<(), LockError> {
        self.remove(name, token);
        Ok(())
    }

    fn unlock_detached(&self, name: &str, token: &str) {
        self.remove(name, token);
    }
}
