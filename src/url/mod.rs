//! URL handling module for pagewalk
//!
//! This module provides URL normalization (the crawl dedup key), the
//! same-origin scope filter applied to every discovered link, and the static
//! seed check that rejects blocked hosts before a crawl starts.

mod normalize;
mod scope;

// Re-export main functions
pub use normalize::{normalize_parsed, normalize_url};
pub use scope::{check_seed, in_scope, matches_host_pattern, ScopeFilter};
