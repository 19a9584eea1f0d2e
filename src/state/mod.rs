//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `SessionState`: the lifecycle of one crawl session
//!   (`Idle -> Running -> {Completed, PageLimitReached, Failed}`)

mod session_state;

// Re-export main types
pub use session_state::SessionState;
