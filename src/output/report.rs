//! Batch report and error body

use crate::crawler::{CrawlOutcome, CrawlRequest};
use crate::extractor::{PageFailure, PageResult};
use crate::output::OutputResult;
use crate::state::SessionState;
use crate::PagewalkError;
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Final result of one crawl in batch mode
///
/// `pages` holds every visited page that was extracted, each as a
/// `{url, sections}` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlReport {
    pub url: String,
    pub session_id: String,
    pub state: SessionState,
    pub pages: Vec<PageResult>,
    pub failures: Vec<PageFailure>,
}

impl CrawlReport {
    pub fn from_outcome(request: &CrawlRequest, outcome: CrawlOutcome) -> Self {
        Self {
            url: request.url.clone(),
            session_id: outcome.session_id,
            state: outcome.state,
            pages: outcome.pages,
            failures: outcome.failures,
        }
    }
}

/// Body returned for a failed request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub status: u16,
}

impl From<&PagewalkError> for ErrorBody {
    fn from(error: &PagewalkError) -> Self {
        // Input errors carry their own message; the wrapper adds nothing a
        // caller needs.
        let message = match error {
            PagewalkError::Input(inner) => inner.to_string(),
            other => other.to_string(),
        };
        Self {
            error: message,
            status: error.http_status(),
        }
    }
}

/// Writes the report as pretty-printed JSON followed by a newline
pub fn write_report<W: Write>(writer: &mut W, report: &CrawlReport) -> OutputResult<()> {
    serde_json::to_writer_pretty(&mut *writer, report)?;
    writeln!(writer)?;
    Ok(())
}

/// Writes an error body as one line of JSON
pub fn write_error<W: Write>(writer: &mut W, error: &PagewalkError) -> OutputResult<()> {
    serde_json::to_writer(&mut *writer, &ErrorBody::from(error))?;
    writeln!(writer)?;
    Ok(())
}
