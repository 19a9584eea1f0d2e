//! Frontier module: the to-visit queue and the visited set of a session
//!
//! Only two guarantees hold under concurrent workers: no URL is processed
//! twice, and the visited count never exceeds the page limit. Breadth-first
//! order is the intent of the FIFO queue, not a guarantee.

mod queue;

pub use queue::{Claim, Frontier};
