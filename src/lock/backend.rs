//! Store backend capability

use crate::storage::{FrontierStore, StorageError, StorageResult};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Why a claim attempt failed
#[derive(Debug, Error)]
pub enum ClaimError {
    /// Another holder owns the lock marker; recoverable by the manager
    #[error("Store is locked: {}", path.display())]
    Locked { path: PathBuf },

    /// Anything else; never retried
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Trait for lockable persisted-store backends
///
/// Partitions isolate concurrent sessions from each other: each session
/// claims its own partition, so two callers never wait on the same lock.
pub trait StoreBackend: Send + Sync {
    /// Path of the lock marker guarding `partition`
    fn lock_path(&self, partition: &str) -> PathBuf;

    /// Claims `partition` exclusively and opens its store
    fn try_claim(&self, partition: &str) -> Result<Box<dyn FrontierStore>, ClaimError>;

    /// Deletes stale lock markers across the whole store directory
    ///
    /// Returns the number of markers removed.
    fn sweep_stale_locks(&self) -> StorageResult<usize>;

    /// Forcibly removes one lock marker if no live holder owns it
    ///
    /// Returns `true` if a marker was removed.
    fn force_unlock(&self, lock_path: &Path) -> StorageResult<bool>;

    /// Releases a lock this process holds
    fn release(&self, lock_path: &Path) -> StorageResult<()>;

    /// Disposes of a finished partition's store while its lock is still held
    ///
    /// Backends without per-partition files have nothing to do.
    fn retire(&self, _partition: &str) -> StorageResult<()> {
        Ok(())
    }
}
