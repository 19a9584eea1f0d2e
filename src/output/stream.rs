//! Newline-delimited JSON progress stream

use crate::events::CrawlEvent;
use crate::output::OutputResult;
use std::io::Write;
use tokio::sync::mpsc::UnboundedReceiver;

/// Writes each event as one JSON line, flushing after every line
pub struct NdjsonWriter<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> NdjsonWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, written: 0 }
    }

    pub fn write_event(&mut self, event: &CrawlEvent) -> OutputResult<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.written += 1;
        Ok(())
    }

    /// Number of events written so far
    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Drains a subscriber into `writer` until the publisher is dropped
///
/// Returns the number of events written.
pub async fn stream_events<W: Write>(
    mut events: UnboundedReceiver<CrawlEvent>,
    writer: &mut NdjsonWriter<W>,
) -> OutputResult<usize> {
    while let Some(event) = events.recv().await {
        writer.write_event(&event)?;
    }
    Ok(writer.written())
}
