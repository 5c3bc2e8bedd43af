//! Event system for sitesmith
//!
//! Task progress is published on a broadcast bus so the HTTP layer can
//! stream it and tests can observe the agent loop from the outside.

mod bus;
mod types;

pub use bus::EventBus;
pub use types::*;
