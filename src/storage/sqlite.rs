//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the FrontierStore trait.

use crate::state::SessionState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{FrontierStore, StorageError, StorageResult};
use crate::storage::{EntryStatus, SessionRecord};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite frontier store backend
pub struct SqliteFrontierStore {
    conn: Connection,
}

impl SqliteFrontierStore {
    /// Opens (or creates) a store file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteFrontierStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory store (for testing)
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }
}

impl FrontierStore for SqliteFrontierStore {
    // ===== Session Management =====

    fn begin_session(&mut self, session_id: &str, seed_url: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO sessions (session_id, seed_url, started_at, state) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(session_id) DO UPDATE SET state = excluded.state, finished_at = NULL",
            params![
                session_id,
                seed_url,
                now,
                SessionState::Running.to_db_string()
            ],
        )?;
        Ok(())
    }

    fn finish_session(&mut self, session_id: &str, state: SessionState) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE sessions SET state = ?1, finished_at = ?2 WHERE session_id = ?3",
            params![state.to_db_string(), now, session_id],
        )?;

        if updated == 0 {
            return Err(StorageError::SessionNotFound(session_id.to_string()));
        }
        Ok(())
    }

    fn get_session(&self, session_id: &str) -> StorageResult<SessionRecord> {
        let mut stmt = self.conn.prepare(
            "SELECT session_id, seed_url, started_at, finished_at, state
             FROM sessions WHERE session_id = ?1",
        )?;

        let session = stmt
            .query_row(params![session_id], |row| {
                Ok(SessionRecord {
                    session_id: row.get(0)?,
                    seed_url: row.get(1)?,
                    started_at: row.get(2)?,
                    finished_at: row.get(3)?,
                    state: SessionState::from_db_string(&row.get::<_, String>(4)?)
                        .unwrap_or(SessionState::Failed),
                })
            })
            .optional()?;

        session.ok_or_else(|| StorageError::SessionNotFound(session_id.to_string()))
    }

    // ===== Frontier Entries =====

    fn record_enqueued(&mut self, session_id: &str, url: &str) -> StorageResult<bool> {
        let now = Utc::now().to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO frontier (session_id, url, status, enqueued_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![session_id, url, EntryStatus::Queued.to_db_string(), now],
        )?;
        Ok(inserted > 0)
    }

    fn record_visited(&mut self, session_id: &str, url: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO frontier (session_id, url, status, enqueued_at, visited_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(session_id, url) DO UPDATE SET status = excluded.status,
             visited_at = excluded.visited_at",
            params![session_id, url, EntryStatus::Visited.to_db_string(), now],
        )?;
        Ok(())
    }

    fn discard_pending(&mut self, session_id: &str) -> StorageResult<usize> {
        let discarded = self.conn.execute(
            "UPDATE frontier SET status = ?1 WHERE session_id = ?2 AND status = ?3",
            params![
                EntryStatus::Discarded.to_db_string(),
                session_id,
                EntryStatus::Queued.to_db_string()
            ],
        )?;
        Ok(discarded)
    }

    fn pending_urls(&self, session_id: &str) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT url FROM frontier WHERE session_id = ?1 AND status = ?2 ORDER BY id ASC",
        )?;

        let urls = stmt
            .query_map(
                params![session_id, EntryStatus::Queued.to_db_string()],
                |row| row.get(0),
            )?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(urls)
    }

    fn count_by_status(&self, session_id: &str, status: EntryStatus) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM frontier WHERE session_id = ?1 AND status = ?2",
            params![session_id, status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
