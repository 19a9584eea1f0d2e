//! Session frontier: FIFO to-visit queue plus the visited set
//!
//! Workers share one `Frontier` per session through an `Arc`. The visited set
//! and the queue are guarded by separate mutexes; whenever both are needed
//! the visited set is locked first.
//!
//! Redirect targets reached from a claimed page are kept beside the visited
//! set: they are never queued or claimed again, but they do not count
//! against the page limit and have no progress events of their own.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use url::Url;

/// Result of trying to claim a URL for processing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// URL newly marked visited; the caller owns processing it
    Claimed,

    /// Another worker already visited this URL
    AlreadyVisited,

    /// Visited set is full; the URL was not marked
    LimitReached,
}

#[derive(Debug, Default)]
struct Seen {
    visited: HashSet<String>,
    redirected: HashSet<String>,
}

impl Seen {
    fn contains(&self, key: &str) -> bool {
        self.visited.contains(key) || self.redirected.contains(key)
    }
}

#[derive(Debug, Default)]
struct QueueState {
    queue: VecDeque<Url>,
    queued: HashSet<String>,
    in_flight: usize,
    closed: bool,
}

/// Frontier and dedup store for one crawl session
#[derive(Debug)]
pub struct Frontier {
    max_pages: usize,
    seen: Mutex<Seen>,
    state: Mutex<QueueState>,
    notify: Notify,
}

impl Frontier {
    /// Creates an empty frontier that allows at most `max_pages` visits
    pub fn new(max_pages: usize) -> Self {
        Self {
            max_pages,
            seen: Mutex::new(Seen::default()),
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
        }
    }

    // Worker panics are caught at the JoinSet boundary, so a poisoned guard
    // still holds consistent data.
    fn seen(&self) -> MutexGuard<'_, Seen> {
        self.seen.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Adds a URL to the back of the queue
    ///
    /// Returns `false` without queueing if the URL is already visited (or
    /// reached by redirect), already queued, or the frontier has been closed.
    pub fn enqueue(&self, url: Url) -> bool {
        let seen = self.seen();
        let key = url.as_str();
        if seen.contains(key) {
            return false;
        }

        let mut state = self.state();
        if state.closed || state.queued.contains(key) {
            return false;
        }

        state.queued.insert(key.to_string());
        state.queue.push_back(url);
        drop(state);
        drop(seen);

        self.notify.notify_one();
        true
    }

    /// Pops the next URL without waiting or counting it in flight
    pub fn dequeue(&self) -> Option<Url> {
        let mut state = self.state();
        let url = state.queue.pop_front()?;
        state.queued.remove(url.as_str());
        Some(url)
    }

    /// Atomically marks a URL visited
    ///
    /// Returns `true` if the URL was newly marked, `false` if it was already
    /// visited. Does not consult the page limit; see [`Frontier::claim`].
    pub fn mark_visited(&self, url: &Url) -> bool {
        let mut seen = self.seen();
        if seen.contains(url.as_str()) {
            return false;
        }
        seen.visited.insert(url.as_str().to_string())
    }

    /// Atomically marks a URL visited, respecting the page limit
    pub fn claim(&self, url: &Url) -> Claim {
        let mut seen = self.seen();
        if seen.contains(url.as_str()) {
            Claim::AlreadyVisited
        } else if seen.visited.len() >= self.max_pages {
            Claim::LimitReached
        } else {
            seen.visited.insert(url.as_str().to_string());
            Claim::Claimed
        }
    }

    /// Records the redirect target of a claimed page
    ///
    /// Returns `false` if the target was already visited or reached by
    /// another redirect, in which case its content has already been (or is
    /// being) extracted elsewhere. A queued copy of the target is dropped.
    pub fn mark_redirected(&self, target: &Url) -> bool {
        let mut seen = self.seen();
        let key = target.as_str();
        if seen.contains(key) {
            return false;
        }
        seen.redirected.insert(key.to_string());

        let mut state = self.state();
        if state.queued.remove(key) {
            state.queue.retain(|queued| queued.as_str() != key);
        }
        true
    }

    /// Waits for the next URL to process
    ///
    /// The returned URL counts as in flight until [`Frontier::task_done`] is
    /// called. Returns `None` once the queue is empty and nothing is in flight
    /// (the crawl is exhausted), or once the frontier is closed.
    pub async fn next(&self) -> Option<Url> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state();
                if state.closed {
                    return None;
                }

                if let Some(url) = state.queue.pop_front() {
                    state.queued.remove(url.as_str());
                    state.in_flight += 1;
                    return Some(url);
                }

                if state.in_flight == 0 {
                    state.closed = true;
                    drop(state);
                    self.notify.notify_waiters();
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Marks one in-flight task finished and wakes idle workers
    pub fn task_done(&self) {
        let mut state = self.state();
        state.in_flight = state.in_flight.saturating_sub(1);
        drop(state);
        self.notify.notify_waiters();
    }

    /// Halts the frontier and drains the queue without processing it
    ///
    /// Returns the number of queued URLs that were discarded.
    pub fn close(&self) -> usize {
        let mut state = self.state();
        state.closed = true;
        let drained = state.queue.len();
        state.queue.clear();
        state.queued.clear();
        drop(state);

        self.notify.notify_waiters();
        drained
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    pub fn visited_count(&self) -> usize {
        self.seen().visited.len()
    }

    pub fn queued_len(&self) -> usize {
        self.state().queue.len()
    }

    pub fn in_flight(&self) -> usize {
        self.state().in_flight
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// Returns a sorted snapshot of the visited URLs
    pub fn visited_urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.seen().visited.iter().cloned().collect();
        urls.sort();
        urls
    }
}
