//! Per-session state shared by the worker pool
//!
//! A `CrawlSession` lives exactly as long as one `CrawlController::run` call.
//! Workers get it through an `Arc`; nothing in it outlives the session.

use crate::config::CrawlerConfig;
use crate::events::{CrawlEvent, ProgressPublisher};
use crate::extractor::{ContentExtractor, PageFailure, PageRequest, PageResult};
use crate::frontier::{Claim, Frontier};
use crate::lock::SharedStore;
use crate::storage::{FrontierStore, StorageResult};
use crate::url::ScopeFilter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use url::Url;

pub(crate) struct CrawlSession {
    pub(crate) session_id: String,
    pub(crate) filter: ScopeFilter,
    pub(crate) frontier: Frontier,
    store: SharedStore,
    publisher: Arc<ProgressPublisher>,
    extractor: Arc<dyn ContentExtractor>,
    navigation_timeout: Duration,
    handler_timeout: Duration,
    results: Mutex<Vec<PageResult>>,
    failures: Mutex<Vec<PageFailure>>,
    fatal: Mutex<Option<String>>,
    limit_reached: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl CrawlSession {
    pub(crate) fn new(
        session_id: String,
        seed: Url,
        config: &CrawlerConfig,
        store: SharedStore,
        publisher: Arc<ProgressPublisher>,
        extractor: Arc<dyn ContentExtractor>,
    ) -> Self {
        Self {
            session_id,
            filter: ScopeFilter::new(seed),
            frontier: Frontier::new(config.max_pages),
            store,
            publisher,
            extractor,
            navigation_timeout: config.navigation_timeout(),
            handler_timeout: config.handler_timeout(),
            results: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            fatal: Mutex::new(None),
            limit_reached: AtomicBool::new(false),
        }
    }

    pub(crate) fn publish(&self, event: CrawlEvent) {
        self.publisher.publish(event);
    }

    /// Runs `op` against the persisted store
    ///
    /// The in-memory frontier is authoritative, so a failed store operation
    /// is logged and the crawl carries on.
    pub(crate) fn with_store<T, F>(&self, what: &str, op: F) -> Option<T>
    where
        F: FnOnce(&mut dyn FrontierStore) -> StorageResult<T>,
    {
        let mut store = lock(&self.store);
        match op(store.as_mut()) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Store operation failed ({}) for session {}: {}", what, self.session_id, e);
                None
            }
        }
    }

    /// Queues a URL and mirrors it to the store if it was new
    pub(crate) fn enqueue(&self, url: Url) -> bool {
        let key = url.to_string();
        if !self.frontier.enqueue(url) {
            match self.rejection() {
                Rejection::Halted => tracing::debug!(
                    "Discarding {}: session {} has halted",
                    key,
                    self.session_id
                ),
                Rejection::Seen => tracing::trace!("Skipping {}: already seen", key),
            }
            return false;
        }
        self.with_store("enqueue", |store| store.record_enqueued(&self.session_id, &key));
        true
    }

    /// Why the frontier just refused a URL
    fn rejection(&self) -> Rejection {
        if self.frontier.is_closed() {
            Rejection::Halted
        } else {
            Rejection::Seen
        }
    }

    /// Records the first session-fatal error and halts the frontier
    pub(crate) fn mark_fatal(&self, reason: String) {
        {
            let mut fatal = lock(&self.fatal);
            if fatal.is_none() {
                tracing::error!("Session {} failed: {}", self.session_id, reason);
                *fatal = Some(reason);
            }
        }
        self.halt("session failure");
    }

    fn halt(&self, why: &str) {
        let drained = self.frontier.close();
        if drained > 0 {
            tracing::info!(
                "Discarded {} queued URLs after {} in session {}",
                drained,
                why,
                self.session_id
            );
        }
    }

    pub(crate) fn fatal_reason(&self) -> Option<String> {
        lock(&self.fatal).clone()
    }

    pub(crate) fn limit_reached(&self) -> bool {
        self.limit_reached.load(Ordering::SeqCst)
    }

    pub(crate) fn record_failure(&self, url: &Url, reason: String) {
        lock(&self.failures).push(PageFailure {
            url: url.to_string(),
            reason: reason.clone(),
        });
        self.publish(CrawlEvent::PageFailed {
            url: url.to_string(),
            reason,
        });
    }

    fn record_page(&self, page: PageResult) {
        self.publish(CrawlEvent::PageDone {
            url: page.url.clone(),
            sections: page.sections.clone(),
        });
        lock(&self.results).push(page);
    }

    pub(crate) fn take_results(&self) -> (Vec<PageResult>, Vec<PageFailure>) {
        (
            std::mem::take(&mut *lock(&self.results)),
            std::mem::take(&mut *lock(&self.failures)),
        )
    }

    /// Vets the URL a page ended up at after redirects
    ///
    /// Returns the failure reason when the page must not be extracted: the
    /// target is outside the session's origin, or it is a page this session
    /// already visited. An accepted same-origin target is recorded so it is
    /// never visited again in its own right.
    fn check_redirect(&self, requested: &Url, final_url: Option<&Url>) -> Option<String> {
        let landed = final_url?;
        let Some(target) = self.filter.resolve(landed.as_str()) else {
            return Some(format!("Redirected out of scope to {}", landed));
        };
        if &target == requested {
            return None;
        }

        if self.frontier.mark_redirected(&target) {
            tracing::debug!("{} redirected to {}", requested, target);
            None
        } else {
            Some(format!("Redirected to already visited {}", target))
        }
    }

    /// Claims and processes one URL popped from the frontier
    pub(crate) async fn process(&self, url: Url) {
        match self.frontier.claim(&url) {
            Claim::Claimed => {}
            Claim::AlreadyVisited => {
                tracing::trace!("Skipping {}: already visited", url);
                return;
            }
            Claim::LimitReached => {
                if !self.limit_reached.swap(true, Ordering::SeqCst) {
                    tracing::info!(
                        "Page limit of {} reached in session {}",
                        self.frontier.max_pages(),
                        self.session_id
                    );
                }
                self.halt("page limit");
                return;
            }
        }

        let mut guard = InFlightPage {
            session: self,
            url: &url,
            finished: false,
        };

        self.with_store("visit", |store| store.record_visited(&self.session_id, url.as_str()));
        self.publish(CrawlEvent::Visiting {
            url: url.to_string(),
        });
        tracing::debug!("Visiting {}", url);

        let request = PageRequest {
            url: url.clone(),
            navigation_timeout: self.navigation_timeout,
        };
        let outcome = tokio::time::timeout(self.handler_timeout, self.extractor.extract(request)).await;

        match outcome {
            Ok(Ok(page)) => {
                if let Some(reason) = self.check_redirect(&url, page.final_url.as_ref()) {
                    guard.finished = true;
                    tracing::warn!("Not extracting {}: {}", url, reason);
                    self.record_failure(&url, reason);
                    return;
                }

                let mut discovered = 0;
                for link in &page.links {
                    match self.filter.resolve(link) {
                        Some(next) => {
                            if self.enqueue(next) {
                                discovered += 1;
                            }
                        }
                        None => tracing::trace!("Skipping {}: out of scope", link),
                    }
                }
                tracing::debug!(
                    "Extracted {}: {} sections, {} new links",
                    url,
                    page.sections.len(),
                    discovered
                );

                guard.finished = true;
                self.record_page(PageResult {
                    url: url.to_string(),
                    sections: page.sections,
                });
            }
            Ok(Err(e)) if e.is_session_fatal() => {
                guard.finished = true;
                self.record_failure(&url, e.to_string());
                self.mark_fatal(e.to_string());
            }
            Ok(Err(e)) => {
                guard.finished = true;
                tracing::warn!("Failed to extract {}: {}", url, e);
                self.record_failure(&url, e.to_string());
            }
            Err(_) => {
                let reason = format!(
                    "Handler timed out after {}s",
                    self.handler_timeout.as_secs_f64()
                );
                guard.finished = true;
                tracing::warn!("Failed to extract {}: {}", url, reason);
                self.record_failure(&url, reason);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Rejection {
    Seen,
    Halted,
}

/// Guarantees a terminal event for a claimed URL if its worker panics
struct InFlightPage<'a> {
    session: &'a CrawlSession,
    url: &'a Url,
    finished: bool,
}

impl Drop for InFlightPage<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        let reason = if std::thread::panicking() {
            "worker panicked while extracting page".to_string()
        } else {
            "worker cancelled while extracting page".to_string()
        };
        self.session.record_failure(self.url, reason.clone());
        self.session.mark_fatal(reason);
    }
}
