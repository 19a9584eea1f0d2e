//! Lock module: exclusive access to persisted frontier stores
//!
//! A crawl session must hold its store partition exclusively. The store is
//! guarded by a lock marker that a crashed run may leave behind, so claiming
//! goes through [`LockRecoveryManager`], which sweeps stale markers, forces
//! the specific lock open when it is safe to, and retries with a fixed backoff
//! before giving up.
//!
//! The store location is never baked in: a [`StoreBackend`] capability is
//! injected into the manager. [`FileLockBackend`] is the filesystem + SQLite
//! implementation used by the CLI.

mod backend;
mod file_lock;
mod recovery;
mod registry;

pub use backend::{ClaimError, StoreBackend};
pub use file_lock::FileLockBackend;
pub use recovery::{LockRecoveryManager, SharedStore, StoreLease};
pub use registry::LockRegistry;

use crate::storage::StorageError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced when a store cannot be claimed
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Store unavailable: {} still locked after {attempts} attempts", path.display())]
    StoreUnavailable { path: PathBuf, attempts: u32 },

    #[error("Store could not be opened: {0}")]
    Storage(#[from] StorageError),
}

/// Transient view of one lock claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockState {
    /// Lock marker path
    pub path: PathBuf,

    /// Whether the lock is currently held by this process
    pub held: bool,

    /// Number of retries performed after the first failed claim
    pub retry_count: u32,
}

impl LockState {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            held: false,
            retry_count: 0,
        }
    }
}
