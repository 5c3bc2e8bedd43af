//! Domain types for the sitesmith service.
//!
//! Tasks, their agent phases and the intake payload live here so that the
//! database, orchestrator and HTTP layers share one vocabulary.

pub mod domain;
pub mod error;

pub use domain::*;
pub use error::*;
