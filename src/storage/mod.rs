//! Storage module for persisting crawl frontiers
//!
//! This module handles the durable mirror of a session's frontier:
//! - SQLite database initialization and schema management
//! - Session run tracking (seed, start/finish time, terminal state)
//! - Frontier entry tracking (queued, visited, discarded)
//!
//! Access to a store file is mediated by the [`lock`](crate::lock) module;
//! nothing here knows about lock markers.

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteFrontierStore;
pub use traits::{FrontierStore, StorageError, StorageResult};

use crate::state::SessionState;

/// Represents a crawl session in the database
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: String,
    pub seed_url: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub state: SessionState,
}

/// Status of a persisted frontier entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Waiting in the frontier
    Queued,
    /// Claimed by a worker
    Visited,
    /// Dropped unprocessed when the session halted
    Discarded,
}

impl EntryStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Visited => "visited",
            Self::Discarded => "discarded",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(Self::Queued),
            "visited" => Some(Self::Visited),
            "discarded" => Some(Self::Discarded),
            _ => None,
        }
    }
}
