use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for pagewalk
///
/// Every section is optional in the TOML file; missing sections fall back to
/// the defaults below.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub lock: LockConfig,
    pub store: StoreConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub scope: ScopeConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum number of pages visited per crawl session
    #[serde(rename = "max-pages")]
    pub max_pages: usize,

    /// Maximum number of concurrent page tasks
    #[serde(rename = "max-concurrency")]
    pub max_concurrency: usize,

    /// Per-page navigation timeout (seconds)
    #[serde(rename = "navigation-timeout-secs")]
    pub navigation_timeout_secs: u64,

    /// Overall timeout for handling one page (seconds)
    #[serde(rename = "handler-timeout-secs")]
    pub handler_timeout_secs: u64,
}

impl CrawlerConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_secs(self.navigation_timeout_secs)
    }

    pub fn handler_timeout(&self) -> Duration {
        Duration::from_secs(self.handler_timeout_secs)
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: 100,
            max_concurrency: 10,
            navigation_timeout_secs: 60,
            handler_timeout_secs: 300,
        }
    }
}

/// Persisted-store lock recovery configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Total attempts at claiming the store before giving up
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Fixed delay between claim attempts (milliseconds)
    #[serde(rename = "retry-backoff-ms")]
    pub retry_backoff_ms: u64,

    /// Age after which a lock marker is considered stale (seconds)
    #[serde(rename = "stale-after-secs")]
    pub stale_after_secs: u64,
}

impl LockConfig {
    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_backoff_ms: 1000,
            stale_after_secs: 600,
        }
    }
}

/// Persisted frontier store location
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding one SQLite file and lock marker per session
    pub directory: PathBuf,

    /// Keep a session's SQLite file after the session ends
    #[serde(rename = "keep-sessions")]
    pub keep_sessions: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./pagewalk-store"),
            keep_sessions: false,
        }
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header value (`name/version`)
    pub fn header_value(&self) -> String {
        format!("{}/{}", self.crawler_name, self.crawler_version)
    }
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            crawler_name: "pagewalk".to_string(),
            crawler_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Seed scoping configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Host patterns (e.g., "example.com" or "*.example.com") that may never be crawled
    #[serde(rename = "blocked-hosts")]
    pub blocked_hosts: Vec<String>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            blocked_hosts: vec!["*.github.com".to_string()],
        }
    }
}

/// Command-line overrides layered on top of the file configuration
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub max_pages: Option<usize>,
    pub max_concurrency: Option<usize>,
    pub store_directory: Option<PathBuf>,
}
