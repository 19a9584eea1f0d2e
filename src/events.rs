//! Progress events streamed to the caller while a session runs

use crate::extractor::{PageFailure, PageResult, Section};
use crate::state::SessionState;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// One progress event
///
/// Serialized as JSON internally tagged by `"type"`, e.g.
/// `{"type":"page_failed","url":"https://a.com/x","reason":"HTTP status 404"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CrawlEvent {
    /// A worker claimed the URL and is about to extract it
    Visiting { url: String },

    /// The page was extracted
    PageDone { url: String, sections: Vec<Section> },

    /// The page could not be extracted; the session continues
    PageFailed { url: String, reason: String },

    /// The session finished with `Completed` or `PageLimitReached`
    ///
    /// Carries every result of the session, the same set a batch caller
    /// gets in its report.
    SessionDone {
        state: SessionState,
        pages: Vec<PageResult>,
        failures: Vec<PageFailure>,
    },

    /// The session failed as a whole
    SessionFailed { reason: String },
}

impl CrawlEvent {
    /// Returns true for the per-page terminal events
    pub fn is_page_terminal(&self) -> bool {
        matches!(self, Self::PageDone { .. } | Self::PageFailed { .. })
    }

    /// Returns true for the session terminal events
    pub fn is_session_terminal(&self) -> bool {
        matches!(self, Self::SessionDone { .. } | Self::SessionFailed { .. })
    }
}

/// Sends progress events to at most one subscriber
///
/// Publishing never blocks and never fails the crawl. Events published after
/// the subscriber went away are dropped.
#[derive(Debug)]
pub struct ProgressPublisher {
    sender: Option<UnboundedSender<CrawlEvent>>,
    disconnected: AtomicBool,
}

impl ProgressPublisher {
    /// Creates a publisher together with its subscriber end
    pub fn channel() -> (Self, UnboundedReceiver<CrawlEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender: Some(sender),
                disconnected: AtomicBool::new(false),
            },
            receiver,
        )
    }

    /// Creates a publisher that discards every event
    pub fn disabled() -> Self {
        Self {
            sender: None,
            disconnected: AtomicBool::new(false),
        }
    }

    pub fn publish(&self, event: CrawlEvent) {
        let Some(sender) = &self.sender else {
            return;
        };

        if sender.send(event).is_err() && !self.disconnected.swap(true, Ordering::Relaxed) {
            tracing::debug!("Progress subscriber disconnected; dropping further events");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sender.is_some()
    }
}
