//! Crawler module: session orchestration and the worker pool
//!
//! This module contains the core crawling logic, including:
//! - The session state machine driven by [`CrawlController`]
//! - A bounded pool of workers pulling from the session frontier
//! - Scope filtering and dedup of discovered links
//! - Per-page failure isolation and session-fatal error handling

mod controller;
mod session;

pub use controller::{CrawlController, CrawlOutcome, CrawlRequest};
