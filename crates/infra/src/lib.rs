//! Runtime plumbing for SoundMaster
//!
//! - [`store`]: the actor owning the routing resolver
//! - [`detection`]: adaptive polling of a [`SourceDetector`](soundmaster_core::domain::SourceDetector)

pub mod detection;
pub mod store;
