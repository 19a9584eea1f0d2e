//! Output module for rendering crawl results
//!
//! This module handles:
//! - The batch report: one JSON document with every extracted page
//! - The progress stream: one JSON line per event
//! - The error body returned instead of a report

mod report;
mod stream;

pub use report::{write_error, write_report, CrawlReport, ErrorBody};
pub use stream::{stream_events, NdjsonWriter};

use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;
