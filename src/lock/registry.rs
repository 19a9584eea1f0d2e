//! Process-wide record of held lock markers, for release on shutdown

use crate::lock::backend::StoreBackend;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Tracks every lock marker this process currently holds
///
/// Cloning shares the same record. [`LockRegistry::release_all`] is what an
/// interrupt handler calls before exiting.
#[derive(Clone)]
pub struct LockRegistry {
    backend: Arc<dyn StoreBackend>,
    held: Arc<Mutex<HashSet<PathBuf>>>,
}

impl LockRegistry {
    pub fn new(backend: Arc<dyn StoreBackend>) -> Self {
        Self {
            backend,
            held: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn held(&self) -> std::sync::MutexGuard<'_, HashSet<PathBuf>> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn register(&self, path: &Path) {
        self.held().insert(path.to_path_buf());
    }

    pub fn is_held(&self, path: &Path) -> bool {
        self.held().contains(path)
    }

    pub fn held_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.held().iter().cloned().collect();
        paths.sort();
        paths
    }

    /// Releases one held lock, best-effort
    ///
    /// Returns `true` if the lock was registered. A failed removal is logged.
    pub fn release(&self, path: &Path) -> bool {
        if !self.held().remove(path) {
            return false;
        }

        if let Err(e) = self.backend.release(path) {
            tracing::warn!("Failed to release lock {}: {}", path.display(), e);
        } else {
            tracing::debug!("Released lock {}", path.display());
        }
        true
    }

    /// Releases every held lock, best-effort
    ///
    /// Never blocks on a failing marker: each failure is logged and the
    /// remaining locks are still released. Returns the number of locks that
    /// were held.
    pub fn release_all(&self) -> usize {
        let paths: Vec<PathBuf> = self.held().drain().collect();

        for path in &paths {
            match self.backend.release(path) {
                Ok(()) => tracing::info!("Released lock {} on shutdown", path.display()),
                Err(e) => {
                    tracing::warn!("Failed to release lock {} on shutdown: {}", path.display(), e)
                }
            }
        }

        paths.len()
    }
}
