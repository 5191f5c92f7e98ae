use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};
use tokio::sync::Notify;

/// Process-wide mutual exclusion keyed by name
///
/// A name is either free or held by a single caller. There is no ownership tracking and no
/// re-entrancy: locking a name twice from the same task never returns.
#[derive(Default)]
pub struct NamedResourceLock {
    held: Mutex<HashSet<String>>,
    released: Notify,
}

/// Holds a name until dropped
pub struct NamedLockGuard {
    lock: Arc<NamedResourceLock>,
    name: String,
}

impl Drop for NamedLockGuard {
    fn drop(&mut self) {
        self.lock.unlock(&self.name);
    }
}

impl NamedResourceLock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn try_lock(&self, name: &str) -> bool {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.insert(name.to_string())
    }

    pub fn is_locked(&self, name: &str) -> bool {
        let held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        held.contains(name)
    }

    /// Wait until `name` is free, then hold it
    pub async fn lock(self: &Arc<Self>, name: &str) -> NamedLockGuard {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            // registered before the check so a release in between is not missed
            notified.as_mut().enable();
            if self.try_lock(name) {
                return NamedLockGuard {
                    lock: self.clone(),
                    name: name.to_string(),
                };
            }
            notified.await;
        }
    }

    /// Release `name` and wake every waiter
    pub fn unlock(&self, name: &str) {
        let removed = {
            let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
            held.remove(name)
        };
        if removed {
            self.released.notify_waiters();
        }
    }
}
