//! SoundMaster core domain
//!
//! Audio source records, the source registry and the output routing resolver
//! that arbitrates which source may play through which output.

pub mod domain;
