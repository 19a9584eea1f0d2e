//! Filesystem lock markers guarding SQLite store partitions
//!
//! Layout inside the store directory:
//! - `<partition>.lock`   lock marker (`pid=<pid>` and `acquired_at=<RFC 3339>`)
//! - `<partition>.sqlite` the partition's frontier store (plus SQLite's
//!   `-wal` and `-shm` companions while it is open)
//!
//! A finished partition's store is deleted on retire unless the backend
//! keeps sessions.

use crate::lock::backend::{ClaimError, StoreBackend};
use crate::storage::{FrontierStore, SqliteFrontierStore, StorageResult};
use chrono::{DateTime, Utc};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

const LOCK_EXTENSION: &str = "lock";
const STORE_EXTENSION: &str = "sqlite";
const STORE_COMPANIONS: [&str; 2] = ["-wal", "-shm"];

/// How long an unparsable marker may exist before it counts as stale; a
/// marker is empty between its creation and the write of its contents.
const UNPARSABLE_GRACE: Duration = Duration::from_secs(2);

/// Contents of a lock marker
#[derive(Debug, Clone, PartialEq, Eq)]
struct LockMarker {
    pid: u32,
    acquired_at: DateTime<Utc>,
}

impl LockMarker {
    fn current() -> Self {
        Self {
            pid: std::process::id(),
            acquired_at: Utc::now(),
        }
    }

    fn render(&self) -> String {
        format!(
            "pid={}\nacquired_at={}\n",
            self.pid,
            self.acquired_at.to_rfc3339()
        )
    }

    fn parse(content: &str) -> Option<Self> {
        let mut pid = None;
        let mut acquired_at = None;

        for line in content.lines() {
            match line.trim().split_once('=') {
                Some(("pid", value)) => pid = value.trim().parse().ok(),
                Some(("acquired_at", value)) => {
                    acquired_at = DateTime::parse_from_rfc3339(value.trim())
                        .ok()
                        .map(|t| t.with_timezone(&Utc))
                }
                _ => {}
            }
        }

        Some(Self {
            pid: pid?,
            acquired_at: acquired_at?,
        })
    }

    /// Age of the marker; markers from the future count as brand new
    fn age(&self) -> Duration {
        (Utc::now() - self.acquired_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    fn is_own(&self) -> bool {
        self.pid == std::process::id()
    }
}

/// Store backend keeping one SQLite file and one lock marker per partition
#[derive(Debug, Clone)]
pub struct FileLockBackend {
    directory: PathBuf,
    stale_after: Duration,
    keep_sessions: bool,
}

impl FileLockBackend {
    /// Creates a backend rooted at `directory`
    ///
    /// Markers older than `stale_after` are treated as abandoned regardless
    /// of who wrote them.
    pub fn new(directory: impl Into<PathBuf>, stale_after: Duration) -> Self {
        Self {
            directory: directory.into(),
            stale_after,
            keep_sessions: false,
        }
    }

    /// Keeps finished partitions' SQLite files instead of deleting them
    pub fn keep_sessions(mut self, keep: bool) -> Self {
        self.keep_sessions = keep;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the SQLite file backing `partition`
    pub fn store_path(&self, partition: &str) -> PathBuf {
        self.directory
            .join(format!("{}.{}", partition, STORE_EXTENSION))
    }

    fn write_marker(lock_path: &Path) -> Result<(), ClaimError> {
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(ClaimError::Locked {
                    path: lock_path.to_path_buf(),
                })
            }
            Err(e) => return Err(ClaimError::Storage(e.into())),
        };

        if let Err(e) = file.write_all(LockMarker::current().render().as_bytes()) {
            let _ = fs::remove_file(lock_path);
            return Err(ClaimError::Storage(e.into()));
        }

        Ok(())
    }

    fn remove_if_present(path: &Path) -> std::io::Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn file_age(path: &Path) -> Option<Duration> {
        let modified = fs::metadata(path).and_then(|m| m.modified()).ok()?;
        Some(modified.elapsed().unwrap_or(Duration::ZERO))
    }

    fn read_marker(lock_path: &Path) -> std::io::Result<Option<LockMarker>> {
        let content = fs::read_to_string(lock_path)?;
        Ok(LockMarker::parse(&content))
    }
}

impl StoreBackend for FileLockBackend {
    fn lock_path(&self, partition: &str) -> PathBuf {
        self.directory
            .join(format!("{}.{}", partition, LOCK_EXTENSION))
    }

    fn try_claim(&self, partition: &str) -> Result<Box<dyn FrontierStore>, ClaimError> {
        fs::create_dir_all(&self.directory).map_err(|e| ClaimError::Storage(e.into()))?;

        let lock_path = self.lock_path(partition);
        Self::write_marker(&lock_path)?;

        match SqliteFrontierStore::open(&self.store_path(partition)) {
            Ok(store) => Ok(Box::new(store)),
            Err(e) => {
                let _ = fs::remove_file(&lock_path);
                Err(ClaimError::Storage(e))
            }
        }
    }

    fn sweep_stale_locks(&self) -> StorageResult<usize> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(LOCK_EXTENSION) {
                continue;
            }

            let stale = match Self::read_marker(&path) {
                Ok(Some(marker)) => marker.age() > self.stale_after,
                Ok(None) => Self::file_age(&path).map_or(false, |age| age > UNPARSABLE_GRACE),
                // Released between read_dir and read
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    tracing::warn!("Could not read lock marker {}: {}", path.display(), e);
                    continue;
                }
            };

            if !stale {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => {
                    tracing::info!("Removed stale lock marker {}", path.display());
                    removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!("Failed to remove stale lock {}: {}", path.display(), e)
                }
            }
        }

        Ok(removed)
    }

    fn force_unlock(&self, lock_path: &Path) -> StorageResult<bool> {
        let marker = match Self::read_marker(lock_path) {
            Ok(marker) => marker,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        if let Some(marker) = &marker {
            // A fresh marker written by this process belongs to a live session
            if marker.is_own() && marker.age() <= self.stale_after {
                tracing::debug!(
                    "Lock {} is held by this process, not forcing",
                    lock_path.display()
                );
                return Ok(false);
            }
        }

        match fs::remove_file(lock_path) {
            Ok(()) => {
                tracing::info!("Forced unlock of {}", lock_path.display());
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn release(&self, lock_path: &Path) -> StorageResult<()> {
        Self::remove_if_present(lock_path)?;
        Ok(())
    }

    fn retire(&self, partition: &str) -> StorageResult<()> {
        if self.keep_sessions {
            return Ok(());
        }

        let store_path = self.store_path(partition);
        let mut files = vec![store_path.clone()];
        for suffix in STORE_COMPANIONS {
            let mut companion = store_path.clone().into_os_string();
            companion.push(suffix);
            files.push(PathBuf::from(companion));
        }

        for file in &files {
            if Self::remove_if_present(file)? {
                tracing::debug!("Removed {}", file.display());
            }
        }
        Ok(())
    }
}
