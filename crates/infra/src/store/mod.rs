//! Single-owner source store
//!
//! All registry mutations go through one tokio task, so a command always sees
//! the result of the previous one.

pub mod actor;

pub use actor::*;
