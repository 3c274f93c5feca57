// libs/appointment-cell/src/services/locks.rs
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

/// One commit lock per provider. Two bookings for the same provider
/// serialize their check-then-write; different providers never wait on
/// each other. Scope is this process only.
#[derive(Clone, Default)]
pub struct ProviderLocks {
    inner: Arc<Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>>,
}

impl ProviderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the provider's lock; it is released when the guard drops.
    ///
    /// Entries nobody holds or waits on are dropped on the way in, so the map
    /// only tracks providers with a commit in flight.
    pub async fn acquire(&self, provider_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(provider_id).or_default().clone()
        };

        debug!("Waiting for commit lock of provider {}", provider_id);
        lock.lock_owned().await
    }

    pub fn tracked_providers(&self) -> usize {
        self.inner.lock().map(|locks| locks.len()).unwrap_or_else(|poisoned| poisoned.into_inner().len())
    }
}
