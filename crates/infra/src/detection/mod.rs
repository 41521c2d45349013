//! Periodic audio source detection

pub mod demo;
pub mod poller;

pub use demo::*;
pub use poller::*;
