//! Fault-tolerance primitives: circuit breakers, adaptive retry and
//! fallback chains.
//!
//! The communication layer composes them per worker as
//! `breaker.execute(|| retry.execute_with(handler, ..))`; the orchestrator
//! runs the fallback chain once that composition gives up.

pub mod circuit_breaker;
pub mod fallback;
pub mod retry;

#[cfg(test)]
mod tests;
