//! Crawl controller - session orchestration
//!
//! This module drives one crawl session from seed to terminal state:
//! - Checking the seed before touching any resource
//! - Claiming the session's store partition through the lock manager
//! - Launching the extractor and seeding the frontier
//! - Running the bounded worker pool until exhaustion, page limit or failure
//! - Persisting the final state and publishing the terminal event

use crate::config::Config;
use crate::crawler::session::CrawlSession;
use crate::events::{CrawlEvent, ProgressPublisher};
use crate::extractor::{ContentExtractor, HttpExtractor, PageFailure, PageResult};
use crate::lock::{FileLockBackend, LockRecoveryManager};
use crate::state::SessionState;
use crate::storage::EntryStatus;
use crate::url::check_seed;
use crate::PagewalkError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use uuid::Uuid;

/// A request to crawl one site
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlRequest {
    /// Seed URL; a missing field deserializes as empty and is rejected
    #[serde(default)]
    pub url: String,
}

impl CrawlRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Result of a session that finished with usable results
#[derive(Debug, Clone, Serialize)]
pub struct CrawlOutcome {
    pub session_id: String,
    pub state: SessionState,
    /// Extracted pages, in completion order
    pub pages: Vec<PageResult>,
    pub failures: Vec<PageFailure>,
    /// Every claimed URL, sorted
    pub visited: Vec<String>,
}

/// Tracks the session state machine, rejecting illegal moves
#[derive(Debug)]
struct Lifecycle {
    session_id: String,
    state: SessionState,
}

impl Lifecycle {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            state: SessionState::Idle,
        }
    }

    fn transition(&mut self, next: SessionState) -> Result<(), PagewalkError> {
        if !self.state.can_transition_to(next) {
            return Err(PagewalkError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!("Session {}: {} -> {}", self.session_id, self.state, next);
        self.state = next;
        Ok(())
    }
}

/// Runs crawl sessions
///
/// A controller holds only configuration and injected collaborators; every
/// session's mutable state is created inside [`CrawlController::run`] and
/// dropped when it returns, so one controller can serve concurrent callers.
pub struct CrawlController {
    config: Arc<Config>,
    extractor: Arc<dyn ContentExtractor>,
    locks: Arc<LockRecoveryManager>,
}

impl CrawlController {
    pub fn new(
        config: Config,
        extractor: Arc<dyn ContentExtractor>,
        locks: Arc<LockRecoveryManager>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            extractor,
            locks,
        }
    }

    /// Creates a controller with the default HTTP extractor and file-backed store
    pub fn from_config(config: Config) -> Self {
        let backend = Arc::new(
            FileLockBackend::new(config.store.directory.clone(), config.lock.stale_after())
                .keep_sessions(config.store.keep_sessions),
        );
        let locks = Arc::new(LockRecoveryManager::from_config(backend, &config.lock));
        let extractor = Arc::new(HttpExtractor::new(config.user_agent.clone()));
        Self::new(config, extractor, locks)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Lock manager shared by all sessions; the CLI releases through it on interrupt
    pub fn lock_manager(&self) -> Arc<LockRecoveryManager> {
        self.locks.clone()
    }

    /// Runs one crawl session to completion
    ///
    /// # Arguments
    ///
    /// * `request` - The crawl request
    /// * `publisher` - Where progress events go; use
    ///   [`ProgressPublisher::disabled`] for batch callers
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlOutcome)` - Session ended `Completed` or `PageLimitReached`
    /// * `Err(PagewalkError::Input)` - The seed was rejected; nothing was published
    /// * `Err(PagewalkError::SessionFailed)` - Session-level failure, after a
    ///   `session_failed` event
    pub async fn run(
        &self,
        request: CrawlRequest,
        publisher: ProgressPublisher,
    ) -> Result<CrawlOutcome, PagewalkError> {
        let seed = check_seed(&request.url, &self.config.scope.blocked_hosts)?;
        let publisher = Arc::new(publisher);

        let session_id = Uuid::new_v4().to_string();
        let partition = format!("session-{}", session_id);
        let mut lifecycle = Lifecycle::new(&session_id);
        tracing::info!("Starting crawl session {} at {}", session_id, seed);

        let lease = match self.locks.acquire(&partition).await {
            Ok(lease) => lease,
            Err(e) => {
                return Err(fail_session(&mut lifecycle, &publisher, e.to_string()));
            }
        };

        let store = lease.store();
        {
            let mut guard = store.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = guard.begin_session(&session_id, seed.as_str()) {
                tracing::warn!("Failed to record session {} start: {}", session_id, e);
            }
        }

        let session = Arc::new(CrawlSession::new(
            session_id.clone(),
            seed.clone(),
            &self.config.crawler,
            store,
            publisher.clone(),
            self.extractor.clone(),
        ));

        if let Err(e) = self.extractor.launch().await {
            let reason = format!("Content extractor failed to start: {}", e);
            finish_store(&session, SessionState::Failed);
            drop(session);
            self.locks.finish(lease);
            return Err(fail_session(&mut lifecycle, &publisher, reason));
        }

        lifecycle.transition(SessionState::Running)?;
        session.enqueue(seed);

        let started = Instant::now();
        self.run_workers(&session).await;

        let final_state = if session.fatal_reason().is_some() {
            SessionState::Failed
        } else if session.limit_reached() {
            SessionState::PageLimitReached
        } else {
            SessionState::Completed
        };

        discard_pending(&session);
        finish_store(&session, final_state);
        log_stored_session(&session);

        let result = if let Some(reason) = session.fatal_reason() {
            Err(fail_session(&mut lifecycle, &publisher, reason))
        } else {
            lifecycle.transition(final_state)?;
            let (pages, failures) = session.take_results();
            tracing::info!(
                "Crawl session {} finished as {}: {} pages, {} failures in {:?}",
                session_id,
                final_state,
                pages.len(),
                failures.len(),
                started.elapsed()
            );
            publisher.publish(CrawlEvent::SessionDone {
                state: final_state,
                pages: pages.clone(),
                failures: failures.clone(),
            });

            Ok(CrawlOutcome {
                session_id: session_id.clone(),
                state: final_state,
                pages,
                failures,
                visited: session.frontier.visited_urls(),
            })
        };

        // Workers are joined, so this is the last handle to the store
        drop(session);
        tracing::debug!("Releasing store partition {}", lease.partition());
        self.locks.finish(lease);
        result
    }

    async fn run_workers(&self, session: &Arc<CrawlSession>) {
        let workers = self.config.crawler.max_concurrency.max(1);
        let mut pool = JoinSet::new();

        for _ in 0..workers {
            let session = session.clone();
            pool.spawn(async move {
                while let Some(url) = session.frontier.next().await {
                    session.process(url).await;
                    session.frontier.task_done();
                }
            });
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                // The in-flight guard already reported the page; make sure the
                // session halts even if the panic struck between pages.
                tracing::error!("Crawl worker for session {} died: {}", session.session_id, e);
                session.mark_fatal(format!("crawl worker died: {}", e));
            }
        }
    }
}

/// Marks entries still queued after a halt as discarded in the store
fn discard_pending(session: &CrawlSession) {
    let id = &session.session_id;
    let pending = session
        .with_store("pending", |store| store.pending_urls(id))
        .unwrap_or_default();
    if pending.is_empty() {
        return;
    }

    for url in &pending {
        tracing::trace!("Discarding unprocessed {}", url);
    }
    if let Some(discarded) = session.with_store("discard", |store| store.discard_pending(id)) {
        tracing::debug!(
            "Marked {} stored entries of session {} discarded",
            discarded,
            id
        );
    }
}

fn finish_store(session: &CrawlSession, state: SessionState) {
    session.with_store("finish", |store| store.finish_session(&session.session_id, state));
}

/// Reads the persisted session back and checks it against the frontier
fn log_stored_session(session: &CrawlSession) {
    let id = &session.session_id;
    let stored = session.with_store("summary", |store| {
        let record = store.get_session(id)?;
        let visited = store.count_by_status(id, EntryStatus::Visited)?;
        let discarded = store.count_by_status(id, EntryStatus::Discarded)?;
        Ok((record, visited, discarded))
    });
    let Some((record, visited, discarded)) = stored else {
        return;
    };

    tracing::debug!(
        "Stored session {} as {}: {} visited, {} discarded",
        record.session_id,
        record.state,
        visited,
        discarded
    );
    let claimed = session.frontier.visited_count() as u64;
    if visited != claimed {
        tracing::warn!(
            "Store for session {} records {} visits but {} pages were claimed",
            id,
            visited,
            claimed
        );
    }
}

fn fail_session(
    lifecycle: &mut Lifecycle,
    publisher: &ProgressPublisher,
    reason: String,
) -> PagewalkError {
    if let Err(e) = lifecycle.transition(SessionState::Failed) {
        tracing::error!("{}", e);
    }
    publisher.publish(CrawlEvent::SessionFailed {
        reason: reason.clone(),
    });
    PagewalkError::SessionFailed { reason }
}
