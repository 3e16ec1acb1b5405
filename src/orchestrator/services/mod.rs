//! Orchestrator service.

pub mod orchestrator;

pub use orchestrator::{Orchestrator, ShutdownReport, cache_key};
