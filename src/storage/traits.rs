//! Storage traits and error types
//!
//! This module defines the trait interface for persisted frontier backends
//! and the associated error types.

use crate::state::SessionState;
use crate::storage::{EntryStatus, SessionRecord};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for persisted frontier implementations
///
/// A store mirrors one session's frontier to durable storage. The in-memory
/// [`Frontier`](crate::frontier::Frontier) stays authoritative; the store is
/// what survives a crash.
pub trait FrontierStore: Send {
    // ===== Session Management =====

    /// Records the start of a session
    fn begin_session(&mut self, session_id: &str, seed_url: &str) -> StorageResult<()>;

    /// Records the terminal state of a session with a finish timestamp
    fn finish_session(&mut self, session_id: &str, state: SessionState) -> StorageResult<()>;

    /// Gets a session by ID
    fn get_session(&self, session_id: &str) -> StorageResult<SessionRecord>;

    // ===== Frontier Entries =====

    /// Records a URL entering the frontier
    ///
    /// Returns `false` if the session already had an entry for this URL.
    fn record_enqueued(&mut self, session_id: &str, url: &str) -> StorageResult<bool>;

    /// Records that a URL was claimed for processing
    fn record_visited(&mut self, session_id: &str, url: &str) -> StorageResult<()>;

    /// Marks every still-queued entry of a session as discarded
    ///
    /// Returns the number of entries discarded.
    fn discard_pending(&mut self, session_id: &str) -> StorageResult<usize>;

    /// Loads queued (not yet visited) URLs in enqueue order
    fn pending_urls(&self, session_id: &str) -> StorageResult<Vec<String>>;

    /// Counts a session's entries in the given status
    fn count_by_status(&self, session_id: &str, status: EntryStatus) -> StorageResult<u64>;
}
