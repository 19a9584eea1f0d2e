//! Crawl session lifecycle
//!
//! This module defines the states a crawl session moves through and which
//! transitions between them are legal.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the current state of a crawl session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Session created; no resources acquired yet
    Idle,

    /// Store lock held, workers are processing the frontier
    Running,

    // ===== Terminal States =====
    /// Frontier exhausted with nothing left in flight
    Completed,

    /// Visited count hit the page limit; results gathered so far are kept
    PageLimitReached,

    /// Session-level fault (lock exhaustion, extractor unavailable, worker crash)
    Failed,
}

impl SessionState {
    /// Returns true if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::PageLimitReached | Self::Failed
        )
    }

    /// Returns true if the session finished with usable results
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::PageLimitReached)
    }

    /// Returns true if moving from `self` to `next` is allowed
    ///
    /// `Idle -> Failed` covers faults raised while starting the session
    /// (store lock exhaustion, extractor launch failure).
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Idle, Self::Failed)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::PageLimitReached)
                | (Self::Running, Self::Failed)
        )
    }

    /// Converts the session state to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::PageLimitReached => "page_limit_reached",
            Self::Failed => "failed",
        }
    }

    /// Parses a session state from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "page_limit_reached" => Some(Self::PageLimitReached),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all possible session states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Idle,
            Self::Running,
            Self::Completed,
            Self::PageLimitReached,
            Self::Failed,
        ]
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
