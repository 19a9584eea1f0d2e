//! Lock recovery: claim a store partition, clearing stale locks on the way

use crate::config::LockConfig;
use crate::lock::backend::{ClaimError, StoreBackend};
use crate::lock::registry::LockRegistry;
use crate::lock::{LockError, LockState};
use crate::storage::FrontierStore;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A claimed store shared between the controller and its workers
pub type SharedStore = Arc<Mutex<Box<dyn FrontierStore>>>;

/// Obtains exclusive store access, recovering from stale locks
///
/// Every acquisition starts by sweeping stale markers left in the store
/// directory by crashed runs. Each attempt then tries to claim the partition.
/// When the partition is locked the manager sweeps again, forces the
/// specific lock if no live holder owns it, waits the fixed backoff and tries
/// again, up to `max_retries` attempts in total.
pub struct LockRecoveryManager {
    backend: Arc<dyn StoreBackend>,
    max_retries: u32,
    backoff: Duration,
    registry: LockRegistry,
}

impl LockRecoveryManager {
    pub fn new(backend: Arc<dyn StoreBackend>, max_retries: u32, backoff: Duration) -> Self {
        let registry = LockRegistry::new(backend.clone());
        Self {
            backend,
            max_retries: max_retries.max(1),
            backoff,
            registry,
        }
    }

    pub fn from_config(backend: Arc<dyn StoreBackend>, config: &LockConfig) -> Self {
        Self::new(backend, config.max_retries, config.retry_backoff())
    }

    pub fn registry(&self) -> &LockRegistry {
        &self.registry
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Releases every lock this manager handed out
    pub fn release_all(&self) -> usize {
        self.registry.release_all()
    }

    /// Claims `partition`, retrying through stale-lock recovery
    ///
    /// # Returns
    ///
    /// * `Ok(StoreLease)` - The store, released when the lease drops
    /// * `Err(LockError::StoreUnavailable)` - Still locked after every attempt
    /// * `Err(LockError::Storage)` - Any non-lock failure, not retried
    pub async fn acquire(&self, partition: &str) -> Result<StoreLease, LockError> {
        let mut state = LockState::new(self.backend.lock_path(partition));
        self.sweep();

        for attempt in 1..=self.max_retries {
            match self.backend.try_claim(partition) {
                Ok(store) => {
                    state.held = true;
                    self.registry.register(&state.path);
                    tracing::debug!(
                        "Claimed store partition {} on attempt {}",
                        partition,
                        attempt
                    );
                    return Ok(StoreLease {
                        partition: partition.to_string(),
                        store: Arc::new(Mutex::new(store)),
                        state,
                        registry: self.registry.clone(),
                    });
                }
                Err(ClaimError::Locked { path }) => {
                    tracing::warn!(
                        "Store {} is locked (attempt {}/{})",
                        path.display(),
                        attempt,
                        self.max_retries
                    );
                }
                Err(ClaimError::Storage(e)) => return Err(LockError::Storage(e)),
            }

            if attempt == self.max_retries {
                break;
            }

            state.retry_count += 1;
            self.recover(&state);
            tokio::time::sleep(self.backoff).await;
        }

        tracing::error!(
            "Giving up on store {} after {} attempts",
            state.path.display(),
            self.max_retries
        );
        Err(LockError::StoreUnavailable {
            path: state.path,
            attempts: self.max_retries,
        })
    }

    /// Ends a lease whose session is over
    ///
    /// The partition's store is retired while the lock is still held, then
    /// the lock is released. Every other handle to the lease's store must be
    /// dropped first so the store is closed before it is retired.
    pub fn finish(&self, mut lease: StoreLease) {
        let partition = std::mem::take(&mut lease.partition);
        let path = lease.state.path.clone();
        let held = std::mem::replace(&mut lease.state.held, false);
        drop(lease);

        if let Err(e) = self.backend.retire(&partition) {
            tracing::warn!("Failed to retire store partition {}: {}", partition, e);
        }
        if held {
            self.registry.release(&path);
        }
    }

    fn sweep(&self) {
        match self.backend.sweep_stale_locks() {
            Ok(0) => {}
            Ok(removed) => tracing::info!("Swept {} stale lock markers", removed),
            Err(e) => tracing::warn!("Stale lock sweep failed: {}", e),
        }
    }

    fn recover(&self, state: &LockState) {
        self.sweep();

        if let Err(e) = self.backend.force_unlock(&state.path) {
            tracing::warn!("Could not force unlock {}: {}", state.path.display(), e);
        }
    }
}

/// Exclusive hold on one store partition
///
/// Dropping the lease releases the lock marker and leaves the store in
/// place; [`LockRecoveryManager::finish`] also retires the store.
pub struct StoreLease {
    partition: String,
    store: SharedStore,
    state: LockState,
    registry: LockRegistry,
}

impl StoreLease {
    pub fn store(&self) -> SharedStore {
        self.store.clone()
    }

    pub fn lock_state(&self) -> &LockState {
        &self.state
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }
}

impl std::fmt::Debug for StoreLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreLease")
            .field("partition", &self.partition)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl Drop for StoreLease {
    fn drop(&mut self) {
        if self.state.held {
            self.registry.release(&self.state.path);
            self.state.held = false;
        }
    }
}
