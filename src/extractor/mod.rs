//! Content extraction for visited pages
//!
//! The crawl engine only consumes the [`ContentExtractor`] contract: given a
//! URL it gets back the page's sections and its outbound links. The default
//! implementation, [`HttpExtractor`], fetches pages with `reqwest` and queries
//! the DOM with `scraper`.

mod html;
mod http;

pub use html::{extract_links, extract_sections, parse_page, ParsedPage};
pub use http::{build_http_client, HttpExtractor};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Kind of a content element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ElementTag {
    Paragraph,
    ListItem,
    Pre,
    Code,
}

impl ElementTag {
    /// Maps an HTML tag name to its element kind
    pub fn from_html(name: &str) -> Option<Self> {
        match name {
            "p" => Some(Self::Paragraph),
            "li" => Some(Self::ListItem),
            "pre" => Some(Self::Pre),
            "code" => Some(Self::Code),
            _ => None,
        }
    }
}

/// One piece of extracted content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Element {
    pub tag: ElementTag,
    pub text: String,
}

/// A heading and the content that follows it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    /// Heading text; the page title (or empty) for content before the first heading
    pub title: String,
    pub content: Vec<Element>,
}

/// Extracted content of one visited page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult {
    pub url: String,
    pub sections: Vec<Section>,
}

/// A page that could not be extracted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageFailure {
    pub url: String,
    pub reason: String,
}

/// Request handed to an extractor
#[derive(Debug, Clone)]
pub struct PageRequest {
    pub url: Url,
    pub navigation_timeout: Duration,
}

/// What an extractor returns for a loaded page
#[derive(Debug, Clone, Default)]
pub struct ExtractedPage {
    /// URL after redirects, if the extractor knows it
    pub final_url: Option<Url>,
    pub sections: Vec<Section>,
    /// Absolute outbound links, not yet scope-filtered
    pub links: Vec<String>,
}

/// Extraction errors
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Navigation timed out")]
    NavigationTimeout,

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("HTTP status {0}")]
    HttpStatus(u16),

    #[error("Redirected out of scope to {0}")]
    OffOriginRedirect(String),

    #[error("Not an HTML page: {0}")]
    ContentMismatch(String),

    #[error("Failed to parse page: {0}")]
    Parse(String),

    /// The extractor itself is gone; no further page can succeed
    #[error("Extractor unavailable: {0}")]
    Unavailable(String),
}

impl ExtractError {
    /// Returns true if this error should end the whole session
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Contract between the crawl engine and a page extractor
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    /// Prepares the extractor for a session
    ///
    /// Failing here fails the session before any page is visited.
    async fn launch(&self) -> Result<(), ExtractError>;

    /// Loads one page and extracts its sections and links
    async fn extract(&self, request: PageRequest) -> Result<ExtractedPage, ExtractError>;
}
