//! pagewalk: a same-origin crawl engine
//!
//! This crate crawls a website from a seed URL without leaving the seed's
//! origin, extracts headings, paragraphs, list items and code blocks from every
//! visited page, and streams progress events to the caller as pages complete.

pub mod config;
pub mod crawler;
pub mod events;
pub mod extractor;
pub mod frontier;
pub mod lock;
pub mod output;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for pagewalk operations
#[derive(Debug, Error)]
pub enum PagewalkError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Invalid crawl request: {0}")]
    Input(#[from] UrlError),

    #[error("Lock error: {0}")]
    Lock(#[from] lock::LockError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Extractor error: {0}")]
    Extract(#[from] extractor::ExtractError),

    #[error("Crawl session failed: {reason}")]
    SessionFailed { reason: String },

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::SessionState,
        to: state::SessionState,
    },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PagewalkError {
    /// Returns true if the error was caused by the caller's input
    pub fn is_input_error(&self) -> bool {
        matches!(self, Self::Input(_))
    }

    /// HTTP status a transport layer should answer with for this error
    ///
    /// Input errors are the caller's fault (`400`); everything else is a
    /// session-level failure (`500`).
    pub fn http_status(&self) -> u16 {
        if self.is_input_error() {
            400
        } else {
            500
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("URL is required")]
    MissingUrl,

    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Crawling {host} is not allowed")]
    BlockedHost { host: String },
}

/// Result type alias for pagewalk operations
pub type Result<T> = std::result::Result<T, PagewalkError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlController, CrawlOutcome, CrawlRequest};
pub use events::{CrawlEvent, ProgressPublisher};
pub use state::SessionState;
pub use url::{check_seed, in_scope, normalize_url, ScopeFilter};
